use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::USER_AGENT;
use reqwest::{Client, Method, Request, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::charger::cache::ResettableCache;
use crate::charger::{ChargeStatus, Charger, ChargerError};
use crate::config::{AristonConfig, Temperatures};
use crate::time_util::mytime::{RealTimeProvider, TimeProvider};

const AUTH_TOKEN_HEADER: &str = "ar.authToken";

/// An Ariston water heater, driven through its boost mode as if it were a charger.
/// Talks to the Ariston NET api, in production `https://www.ariston-net.remotethermo.com/api/v2`.
///
/// The boost flag doubles as both the charging status and the enabled state.
/// The login token is never refreshed: if the vendor expires it, requests fail
/// until [AristonCharger::authenticate] is called again.
pub struct AristonCharger {
    client: Client,
    uri: String,
    user: String,
    password: String,
    device_id: String,
    user_agent: String,
    token: RwLock<String>,
    boost: ResettableCache<bool>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    usr: &'a str,
    pwd: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct PlantFeatures {
    boost: bool,
}

#[derive(Deserialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
struct TemperaturesRequest {
    new: Temperatures,
}

impl AristonCharger {
    pub async fn from_config(config: &AristonConfig) -> Result<Self, ChargerError> {
        Self::new(config, Arc::new(RealTimeProvider::default())).await
    }

    /// Validates the config and logs in. Nothing is returned until a token has been obtained.
    pub async fn new(config: &AristonConfig, time_provider: Arc<dyn TimeProvider>) -> Result<Self, ChargerError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(*config.get_timeout())
            .build()?;

        let charger = Self {
            client,
            uri: default_scheme(config.get_uri(), "http"),
            user: config.get_user().to_owned(),
            password: config.get_password().to_owned(),
            device_id: config.get_device_id().to_owned(),
            user_agent: config.get_user_agent().to_owned(),
            token: RwLock::new(String::new()),
            boost: ResettableCache::new(*config.get_cache(), time_provider),
        };

        charger.authenticate().await
            .map_err(|e| ChargerError::Authentication(Box::new(e)))?;

        Ok(charger)
    }

    /// Logs in and replaces the stored token. On failure the previous token is kept.
    pub async fn authenticate(&self) -> Result<(), ChargerError> {
        let login = LoginRequest {
            usr: &self.user,
            pwd: &self.password,
        };
        let request = self.new_request(Method::POST, "accounts/login")
            .json(&login)
            .build()?;

        let response: LoginResponse = self.execute_json(request).await?;

        *self.token.write().unwrap_or_else(PoisonError::into_inner) = response.token;
        info!("Logged in to Ariston NET for plant {}", self.device_id);
        Ok(())
    }

    /// The boost flag, served from the cache while it is fresh.
    pub async fn get_status(&self) -> Result<bool, ChargerError> {
        self.boost.get(|| self.fetch_boost()).await
    }

    async fn fetch_boost(&self) -> Result<bool, ChargerError> {
        let request = self.new_authorized_request(Method::GET, &format!("remote/plants/{}/features", self.device_id))
            .build()?;

        let features: PlantFeatures = self.execute_json(request).await?;
        debug!("Plant {} boost: {}", self.device_id, features.boost);
        Ok(features.boost)
    }

    pub async fn set_temperatures(&self, temperatures: &Temperatures) -> Result<(), ChargerError> {
        temperatures.validate()?;

        let request = self.new_authorized_request(Method::POST, &format!("velis/slpPlantData/{}/temperatures", self.device_id))
            .json(&TemperaturesRequest { new: *temperatures })
            .build()?;

        let response: SuccessResponse = self.execute_json(request).await?;
        if !response.success {
            return Err(ChargerError::OperationFailed("failed to set temperatures".to_owned()));
        }
        Ok(())
    }

    fn token(&self) -> String {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn new_request(&self, method: Method, location: &str) -> RequestBuilder {
        self.client.request(method, format!("{}/{}", self.uri, location))
            .header(USER_AGENT, &self.user_agent)
    }

    fn new_authorized_request(&self, method: Method, location: &str) -> RequestBuilder {
        self.new_request(method, location)
            .header(AUTH_TOKEN_HEADER, self.token())
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T, ChargerError> {
        debug!("{} {}", request.method(), request.url().path());

        let body = self.client.execute(request).await?
            .error_for_status()?
            .text().await?;

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Charger for AristonCharger {
    async fn status(&self) -> Result<ChargeStatus, ChargerError> {
        let boost = self.get_status().await?;
        Ok(if boost { ChargeStatus::C } else { ChargeStatus::A })
    }

    async fn enabled(&self) -> Result<bool, ChargerError> {
        self.get_status().await
    }

    async fn enable(&self, enable: bool) -> Result<(), ChargerError> {
        let _reset = self.boost.invalidate_on_drop();

        let request = self.new_authorized_request(Method::POST, &format!("velis/slpPlantData/{}/boost", self.device_id))
            .json(&enable)
            .build()?;

        let response: SuccessResponse = self.execute_json(request).await?;
        if !response.success {
            return Err(ChargerError::OperationFailed("failed to set boost mode".to_owned()));
        }
        Ok(())
    }

    async fn max_current(&self, _current: i64) -> Result<(), ChargerError> {
        // Water heaters have no current control, only on/off.
        Err(ChargerError::NotSupported)
    }
}

fn default_scheme(uri: &str, scheme: &str) -> String {
    let uri = uri.trim().trim_end_matches('/');
    if uri.contains("://") {
        uri.to_owned()
    } else {
        format!("{}://{}", scheme, uri)
    }
}
