use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use serde_with::DurationSeconds;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

use crate::charger::ChargerError;

pub const DEFAULT_USER_AGENT: &str = "evcc/1.0";

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// How often the configured chargers are polled when running without a command.
    #[serde_as(as = "DurationSeconds")]
    #[serde(default = "Config::default_poll_interval")]
    poll_interval_secs: Duration,
    #[serde(default)]
    chargers: Vec<ChargerEntry>,
}

impl Config {
    fn default_poll_interval() -> Duration {
        Duration::from_secs(30)
    }

    pub fn get_poll_interval(&self) -> &Duration {
        &self.poll_interval_secs
    }

    pub fn get_chargers(&self) -> &[ChargerEntry] {
        &self.chargers
    }
}

/// One configured device. Everything apart from the name and type is handed
/// untouched to the factory registered for that type.
#[derive(Deserialize, Clone)]
pub struct ChargerEntry {
    name: String,
    #[serde(rename = "type")]
    charger_type: String,
    #[serde(flatten)]
    other: toml::value::Table,
}

impl ChargerEntry {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_type(&self) -> &str {
        &self.charger_type
    }

    pub fn get_other(&self) -> toml::Value {
        toml::Value::Table(self.other.clone())
    }
}

// The device tables carry credentials, so only the keys are shown.
impl Debug for ChargerEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargerEntry")
            .field("name", &self.name)
            .field("type", &self.charger_type)
            .field("keys", &self.other.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct AristonConfig {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    device_id: String,
    #[serde(default = "AristonConfig::default_user_agent")]
    user_agent: String,
    /// How long (in seconds) a polled boost state is reused before asking the api again.
    #[serde_as(as = "DurationSeconds")]
    #[serde(default = "AristonConfig::default_cache")]
    cache_secs: Duration,
    #[serde_as(as = "DurationSeconds")]
    #[serde(default = "AristonConfig::default_timeout")]
    timeout_secs: Duration,
    /// Setpoints pushed to the heater once it has been set up.
    temperatures: Option<Temperatures>,
}

impl AristonConfig {
    #[cfg(test)]
    pub fn new(uri: &str, user: &str, password: &str, device_id: &str) -> Self {
        Self {
            uri: uri.to_owned(),
            user: user.to_owned(),
            password: password.to_owned(),
            device_id: device_id.to_owned(),
            user_agent: Self::default_user_agent(),
            cache_secs: Self::default_cache(),
            timeout_secs: Self::default_timeout(),
            temperatures: None,
        }
    }

    #[cfg(test)]
    pub fn with_cache(mut self, cache: Duration) -> Self {
        self.cache_secs = cache;
        self
    }

    fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_owned()
    }

    fn default_cache() -> Duration {
        Duration::from_secs(1)
    }

    fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// Checks the required fields, in the order they are documented.
    pub fn validate(&self) -> Result<(), ChargerError> {
        let required = [
            ("uri", &self.uri),
            ("user", &self.user),
            ("password", &self.password),
            ("device_id", &self.device_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ChargerError::Configuration(format!("missing {}", name)));
            }
        }
        if let Some(temperatures) = &self.temperatures {
            temperatures.validate()?;
        }
        Ok(())
    }

    pub fn get_uri(&self) -> &str {
        &self.uri
    }

    pub fn get_user(&self) -> &str {
        &self.user
    }

    pub fn get_password(&self) -> &str {
        &self.password
    }

    pub fn get_device_id(&self) -> &str {
        &self.device_id
    }

    pub fn get_user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn get_cache(&self) -> &Duration {
        &self.cache_secs
    }

    pub fn get_timeout(&self) -> &Duration {
        &self.timeout_secs
    }

    pub fn get_temperatures(&self) -> Option<&Temperatures> {
        self.temperatures.as_ref()
    }
}

impl Debug for AristonConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AristonConfig")
            .field("uri", &self.uri)
            .field("user", &"***")
            .field("password", &"***")
            .field("device_id", &self.device_id)
            .field("user_agent", &self.user_agent)
            .field("cache_secs", &self.cache_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperatures", &self.temperatures)
            .finish()
    }
}

/// Water setpoints in degrees celsius.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Temperatures {
    comfort: f32,
    reduced: f32,
}

impl Temperatures {
    #[cfg(test)]
    pub fn new(comfort: f32, reduced: f32) -> Self {
        Self { comfort, reduced }
    }

    pub fn validate(&self) -> Result<(), ChargerError> {
        if self.reduced > self.comfort {
            return Err(ChargerError::Configuration(format!(
                "reduced temperature {} is above comfort temperature {}",
                self.reduced, self.comfort
            )));
        }
        Ok(())
    }
}
