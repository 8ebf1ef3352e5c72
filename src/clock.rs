//! Time source shared by handlers.

use chrono::{DateTime, Utc};

/// Port for getting the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock using the OS time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant. Tests move it forward by hand.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock {
    instant: std::sync::RwLock<DateTime<Utc>>,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: std::sync::RwLock::new(instant),
        }
    }

    pub fn advance(&self, delta: chrono::TimeDelta) {
        let mut instant = self.instant.write().unwrap();
        *instant += delta;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.read().unwrap()
    }
}
