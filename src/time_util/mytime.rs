#[cfg(test)]
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
#[cfg(test)]
use chrono::Duration;

/// Source of "now" for anything that ages values, so that tests can move the clock.
pub trait TimeProvider: Send + Sync {
    fn get_utc_time(&self) -> DateTime<Utc>;
}

#[derive(Default)]
pub struct RealTimeProvider {}

impl TimeProvider for RealTimeProvider {
    fn get_utc_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[derive(Debug)]
pub struct DummyTimeProvider {
    utc_time: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl DummyTimeProvider {
    pub fn new(utc_time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Mutex::new(utc_time),
        }
    }

    /// Change the time returned by this dummy time provider.
    pub fn set(&self, utc_time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap_or_else(PoisonError::into_inner) = utc_time;
    }

    /// Move the time returned by this dummy time provider forward by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.utc_time.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }
}

#[cfg(test)]
impl TimeProvider for DummyTimeProvider {
    fn get_utc_time(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
