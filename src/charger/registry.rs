use std::collections::HashMap;

use futures::future::BoxFuture;
use itertools::Itertools;
use log::warn;
use serde::de::DeserializeOwned;

use crate::charger::ariston::AristonCharger;
use crate::charger::dummy::{DummyCharger, DummyConfig, DummyIO};
use crate::charger::{Charger, ChargerError};
use crate::config::AristonConfig;

/// Builds a charger from the raw table of its configuration entry.
pub type ChargerFactory = fn(toml::Value) -> BoxFuture<'static, Result<Box<dyn Charger>, ChargerError>>;

/// Charger factories keyed by the `type` used in configuration files.
pub struct Registry {
    factories: HashMap<&'static str, ChargerFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// All the charger types this crate knows about.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add("ariston", new_ariston_from_config);
        registry.add("dummy", new_dummy_from_config);
        registry
    }

    /// Registers a factory, replacing any previous one with the same name.
    pub fn add(&mut self, name: &'static str, factory: ChargerFactory) {
        if self.factories.insert(name, factory).is_some() {
            warn!("Replaced existing charger factory '{}'", name);
        }
    }

    pub fn names(&self) -> String {
        self.factories.keys().sorted().join(", ")
    }

    pub async fn create(&self, charger_type: &str, other: toml::Value) -> Result<Box<dyn Charger>, ChargerError> {
        let factory = self.factories.get(charger_type)
            .ok_or_else(|| ChargerError::Configuration(format!(
                "unknown charger type: {} (known types: {})", charger_type, self.names()
            )))?;
        factory(other).await
    }
}

fn decode_other<T: DeserializeOwned>(other: toml::Value) -> Result<T, ChargerError> {
    other.try_into()
        .map_err(|e| ChargerError::Configuration(format!("invalid charger config: {}", e)))
}

fn new_ariston_from_config(other: toml::Value) -> BoxFuture<'static, Result<Box<dyn Charger>, ChargerError>> {
    Box::pin(async move {
        let config: AristonConfig = decode_other(other)?;
        let charger = AristonCharger::from_config(&config).await?;

        if let Some(temperatures) = config.get_temperatures() {
            if let Err(e) = charger.set_temperatures(temperatures).await {
                warn!("Failed to apply configured temperatures {:?}: {}", temperatures, e);
            }
        }

        Ok(Box::new(charger) as Box<dyn Charger>)
    })
}

fn new_dummy_from_config(other: toml::Value) -> BoxFuture<'static, Result<Box<dyn Charger>, ChargerError>> {
    Box::pin(async move {
        let config: DummyConfig = decode_other(other)?;
        let (charger, _handle) = DummyCharger::create(&config);
        Ok(Box::new(charger) as Box<dyn Charger>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charger::ChargeStatus;

    fn table(toml_str: &str) -> toml::Value {
        toml::from_str(toml_str).expect("Test table should parse")
    }

    #[tokio::test]
    async fn unknown_type_is_a_configuration_error() {
        let registry = Registry::with_defaults();
        match registry.create("wallbox", table("")).await {
            Err(ChargerError::Configuration(msg)) => {
                assert!(msg.contains("wallbox"), "{}", msg);
                assert!(msg.contains("ariston, dummy"), "{}", msg);
            }
            Err(e) => panic!("Expected a configuration error, got {}", e),
            Ok(_) => panic!("wallbox should not be a known type"),
        }
    }

    #[tokio::test]
    async fn creates_dummy() {
        let registry = Registry::with_defaults();
        let charger = registry.create("dummy", table("boost = true")).await.unwrap();
        assert_eq!(charger.status().await.unwrap(), ChargeStatus::C);
    }

    #[tokio::test]
    async fn ariston_validates_before_logging_in() {
        let registry = Registry::with_defaults();
        let other = table("uri = \"http://127.0.0.1:9\"\nuser = \"me\"\npassword = \"pw\"");
        match registry.create("ariston", other).await {
            Err(ChargerError::Configuration(msg)) => assert_eq!(msg, "missing device_id"),
            Err(e) => panic!("Expected a configuration error, got {}", e),
            Ok(_) => panic!("Should not have been created without a device id"),
        }
    }

    #[tokio::test]
    async fn malformed_table_is_a_configuration_error() {
        let registry = Registry::with_defaults();
        let result = registry.create("ariston", table("cache_secs = \"soon\"")).await;
        assert!(matches!(result, Err(ChargerError::Configuration(_))));
    }

    #[test_log::test(tokio::test)]
    async fn ariston_applies_configured_temperatures() {
        let mut server = mockito::Server::new_async().await;
        let _login = server.mock("POST", "/accounts/login")
            .with_body("{\"token\": \"T\"}")
            .create_async().await;
        let temperatures = server.mock("POST", "/velis/slpPlantData/PLANT1/temperatures")
            .match_header("ar.authtoken", "T")
            .with_body("{\"success\": false}")
            .expect(1)
            .create_async().await;

        let mut other = toml::value::Table::new();
        other.insert("uri".to_owned(), server.url().into());
        other.insert("user".to_owned(), "me".into());
        other.insert("password".to_owned(), "pw".into());
        other.insert("device_id".to_owned(), "PLANT1".into());
        other.insert("temperatures".to_owned(), table("comfort = 55.0\nreduced = 40.0"));

        let registry = Registry::with_defaults();
        let charger = registry.create("ariston", toml::Value::Table(other)).await;
        assert!(charger.is_ok(), "A refused setpoint must not fail construction");
        temperatures.assert_async().await;
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = Registry::new();
        registry.add("heater", new_dummy_from_config);
        registry.add("heater", new_ariston_from_config);
        assert_eq!(registry.names(), "heater");
        assert_eq!(registry.factories.len(), 1);
    }
}
