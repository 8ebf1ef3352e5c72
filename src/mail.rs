//! Send verification and password reset emails.
//!
//! Messages are published as CloudEvents on a RabbitMQ queue; a separate
//! worker renders and delivers them.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use crate::config::Mail;

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";
const DEFAULT_FROM: &str = "no-reply@localhost";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error(transparent)]
    Amqp(#[from] lapin::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("unsupported AMQP scheme")]
    InvalidScheme,
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Mail templates list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Confirm ownership of an email address.
    VerifyEmail,
    /// Change a forgotten password.
    ResetPassword,
}

impl Template {
    pub fn subject(&self) -> &'static str {
        match self {
            Template::VerifyEmail => "Verify your email",
            Template::ResetPassword => "Reset your password",
        }
    }

    /// Plain HTML body, for workers without template support.
    fn html(&self, code: &str, link: &str) -> String {
        let (what, action) = match self {
            Template::VerifyEmail => ("verification", "verify"),
            Template::ResetPassword => ("reset", "reset via link"),
        };
        format!(
            "<p>Your {what} code is <b>{code}</b> (valid 15 minutes).</p>\
             <p>Or {action}: <a href=\"{link}\">{link}</a></p>"
        )
    }
}

/// One email to send.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub to: String,
    pub template: Template,
    pub code: String,
    pub link: String,
}

/// Port for sending emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), MailError>;
}

/// Best-effort delivery. Failures are logged and never reach the caller.
pub async fn deliver(mailer: &dyn Mailer, message: Message) {
    let template = message.template;
    let outcome = match mailer.send(&message).await {
        Ok(()) => "sent",
        Err(err) => {
            tracing::warn!(error = %err, ?template, "failed to send email");
            "failed"
        },
    };

    metrics::counter!(
        "emails_sent_total",
        "template" => template.subject(),
        "outcome" => outcome
    )
    .increment(1);
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'static str,
    template: Template,
    html: String,
    data: TemplateData<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateData<'a> {
    code: &'a str,
    link: &'a str,
}

/// RabbitMQ publisher. Without a broker address every message is dropped.
///
/// A broken connection is replaced on the next send.
#[derive(Clone, Default)]
pub struct MailManager {
    queue: String,
    from: String,
    uri: Option<AMQPUri>,
    conn: Arc<Mutex<Option<Connection>>>,
}

/// Broker location and credentials from the `mail` section.
fn amqp_uri(config: &Mail) -> Result<AMQPUri, MailError> {
    let addr = Url::parse(&config.address)?;

    Ok(AMQPUri {
        scheme: AMQPScheme::from_str(addr.scheme())
            .map_err(|_| MailError::InvalidScheme)?,
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
            port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
        },
        vhost: config
            .vhost
            .clone()
            .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
        query: AMQPQueryString {
            channel_max: config.pool,
            ..Default::default()
        },
    })
}

impl MailManager {
    /// Create a new [`MailManager`] and open its first connection.
    pub async fn new(config: &Mail) -> Result<Self, MailError> {
        let uri = amqp_uri(config)?;
        let conn = Self::connect(uri.clone()).await?;

        tracing::info!(
            host = %uri.authority.host,
            queue = %config.queue,
            "rabbitmq connected"
        );

        Ok(Self {
            queue: config.queue.clone(),
            from: config
                .from
                .clone()
                .unwrap_or_else(|| DEFAULT_FROM.to_owned()),
            uri: Some(uri),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    async fn connect(uri: AMQPUri) -> Result<Connection, MailError> {
        let properties = ConnectionProperties::default()
            .with_connection_name("taskline_mail_client".into());
        Ok(Connection::connect_uri(uri, properties).await?)
    }

    /// Channel on a live connection, reconnecting first when needed.
    /// `None` when delivery is disabled.
    async fn channel(&self) -> Result<Option<Channel>, MailError> {
        let Some(uri) = &self.uri else {
            return Ok(None);
        };

        let mut guard = self.conn.lock().await;
        let conn = match guard.take() {
            Some(conn) if conn.status().connected() => guard.insert(conn),
            _ => {
                tracing::warn!(queue = %self.queue, "rabbitmq connection lost, reconnecting");
                guard.insert(Self::connect(uri.clone()).await?)
            },
        };

        Ok(Some(Self::create_channel(conn, &self.queue).await?))
    }

    async fn create_channel(
        conn: &Connection,
        queue: &str,
    ) -> Result<Channel, MailError> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.taskline.email",
            source: "com.taskline.api",
            id: crate::crypto::one_time_token(),
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }
}

#[async_trait]
impl Mailer for MailManager {
    async fn send(&self, message: &Message) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Ok(());
        }

        let Some(channel) = self.channel().await? else {
            tracing::debug!(template = ?message.template, "mail delivery disabled, message dropped");
            return Ok(());
        };

        let content = Content {
            to: &message.to,
            from: &self.from,
            subject: message.template.subject(),
            template: message.template,
            html: message.template.html(&message.code, &message.link),
            data: TemplateData {
                code: &message.code,
                link: &message.link,
            },
        };
        let payload = serde_json::to_string(&Self::create_event(content))?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        tracing::trace!(template = ?message.template, "event sent");
        Ok(())
    }
}

/// Keeps every message in memory. Can be told to fail.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingMailer {
    pub sent: tokio::sync::Mutex<Vec<Message>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingMailer {
    pub async fn last(&self) -> Option<Message> {
        self.sent.lock().await.last().cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &Message) -> Result<(), MailError> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(MailError::InvalidScheme);
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            to: "ada@example.com".into(),
            template: Template::VerifyEmail,
            code: "123456".into(),
            link: "http://localhost:5000/api/verify-email-link?login=ada&token=t".into(),
        }
    }

    #[test]
    fn test_amqp_uri() {
        let config = Mail {
            address: "amqp://rabbit:5673".into(),
            username: "guest".into(),
            password: "secret".into(),
            queue: "email".into(),
            ..Default::default()
        };
        let uri = amqp_uri(&config).unwrap();

        assert_eq!(uri.authority.host, "rabbit");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "guest");
        assert_eq!(uri.vhost, DEFAULT_AMPQ_VHOST);

        let config = Mail {
            address: "http://rabbit".into(),
            ..Default::default()
        };
        assert!(matches!(amqp_uri(&config), Err(MailError::InvalidScheme)));
    }

    #[tokio::test]
    async fn test_disabled_manager_drops_messages() {
        let manager = MailManager::default();
        assert!(manager.send(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_deliver_swallows_failures() {
        let mailer = RecordingMailer::default();
        mailer
            .fail
            .store(true, std::sync::atomic::Ordering::Relaxed);

        deliver(&mailer, message()).await;
        assert!(mailer.last().await.is_none());

        mailer
            .fail
            .store(false, std::sync::atomic::Ordering::Relaxed);
        deliver(&mailer, message()).await;
        assert_eq!(mailer.last().await, Some(message()));
    }

    #[test]
    fn test_event_shape() {
        let msg = message();
        let content = Content {
            to: &msg.to,
            from: DEFAULT_FROM,
            subject: msg.template.subject(),
            template: msg.template,
            html: msg.template.html(&msg.code, &msg.link),
            data: TemplateData {
                code: &msg.code,
                link: &msg.link,
            },
        };
        let event = serde_json::to_value(MailManager::create_event(content)).unwrap();

        assert_eq!(event["specversion"], "1.0");
        assert_eq!(event["data"]["template"], "verify_email");
        assert_eq!(event["data"]["subject"], "Verify your email");
        assert_eq!(event["data"]["data"]["code"], "123456");
        assert!(event["data"]["html"].as_str().unwrap().contains("123456"));
    }
}
