use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use strum_macros::EnumString;

pub mod ariston;
pub mod cache;
pub mod dummy;
pub mod registry;

/// IEC 61851 style status letters, as understood by the charging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, EnumString)]
pub enum ChargeStatus {
    #[strum(serialize = "")]
    None,
    /// Connected but idle, not drawing power.
    A,
    B,
    /// Actively drawing power.
    C,
    D,
    E,
    F,
}

impl ChargeStatus {
    pub fn is_charging(&self) -> bool {
        matches!(self, ChargeStatus::C | ChargeStatus::D)
    }
}

#[derive(Debug)]
pub enum ChargerError {
    /// A required configuration value is missing or invalid.
    Configuration(String),
    /// Logging in to the vendor failed, wraps the underlying cause.
    Authentication(Box<ChargerError>),
    Transport(reqwest::Error),
    /// The response body was not what we expected.
    Protocol(serde_json::Error),
    /// The vendor understood the request but refused it.
    OperationFailed(String),
    NotSupported,
}

impl Display for ChargerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self {
            ChargerError::Configuration(msg) => write!(f, "Configuration Error: {}", msg),
            ChargerError::Authentication(e) => write!(f, "Authentication failed: {}", e),
            ChargerError::Transport(e) => write!(f, "Network Error: {}", e),
            ChargerError::Protocol(e) => write!(f, "Deserialization Error: {}", e),
            ChargerError::OperationFailed(msg) => write!(f, "Operation failed: {}", msg),
            ChargerError::NotSupported => write!(f, "Not available"),
        }
    }
}

impl std::error::Error for ChargerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            ChargerError::Authentication(e) => Some(e.as_ref()),
            ChargerError::Transport(e) => Some(e),
            ChargerError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChargerError {
    fn from(e: reqwest::Error) -> Self {
        ChargerError::Transport(e)
    }
}

impl From<serde_json::Error> for ChargerError {
    fn from(e: serde_json::Error) -> Self {
        ChargerError::Protocol(e)
    }
}

/// A device the platform can switch on and off like an EV charger.
#[async_trait]
pub trait Charger: Send + Sync {
    async fn status(&self) -> Result<ChargeStatus, ChargerError>;

    async fn enabled(&self) -> Result<bool, ChargerError>;

    async fn enable(&self, enable: bool) -> Result<(), ChargerError>;

    async fn max_current(&self, current: i64) -> Result<(), ChargerError>;
}
