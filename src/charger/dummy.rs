use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::charger::{ChargeStatus, Charger, ChargerError};

pub trait DummyIO {
    type MessageType;
    type Config;

    fn create(config: &Self::Config) -> (Self, Sender<Self::MessageType>) where Self: Sized {
        let (sender, receiver) = mpsc::channel();
        let dummy_obj = Self::new(receiver, config);
        (dummy_obj, sender)
    }

    fn new(receiver: Receiver<Self::MessageType>, config: &Self::Config) -> Self;
}

/// Applies every message currently queued. A dropped sender simply means no more changes.
pub fn read_all<T, F>(receiver: &Receiver<T>, mut on_value: F)
    where F: FnMut(T) {
    loop {
        match receiver.try_recv() {
            Ok(x) => on_value(x),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct DummyConfig {
    #[serde(default)]
    boost: bool,
}

pub enum ModifyState {
    /// Change the boost flag as if someone pressed the button on the heater.
    SetBoost(bool),
    /// The next request of any kind fails as if the vendor refused it.
    FailNextRequest,
}

struct DummyState {
    boost: bool,
    fail_next: bool,
}

/// A water heater that only exists in memory, for dry runs.
pub struct DummyCharger {
    receiver: Mutex<Receiver<ModifyState>>,
    state: Mutex<DummyState>,
}

impl DummyIO for DummyCharger {
    type MessageType = ModifyState;
    type Config = DummyConfig;

    fn new(receiver: Receiver<Self::MessageType>, config: &Self::Config) -> Self {
        Self {
            receiver: Mutex::new(receiver),
            state: Mutex::new(DummyState {
                boost: config.boost,
                fail_next: false,
            }),
        }
    }
}

fn to_on_off(on: bool) -> &'static str {
    match on {
        true => "On",
        false => "Off",
    }
}

impl DummyCharger {
    /// Applies pending messages, then fails if a failure was queued.
    fn update_state(&self) -> Result<(), ChargerError> {
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        read_all(&*receiver, |msg| match msg {
            ModifyState::SetBoost(boost) => state.boost = boost,
            ModifyState::FailNextRequest => state.fail_next = true,
        });
        if std::mem::take(&mut state.fail_next) {
            return Err(ChargerError::OperationFailed("dummy request failed".to_owned()));
        }
        Ok(())
    }

    fn boost(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).boost
    }
}

#[async_trait]
impl Charger for DummyCharger {
    async fn status(&self) -> Result<ChargeStatus, ChargerError> {
        self.update_state()?;
        Ok(if self.boost() { ChargeStatus::C } else { ChargeStatus::A })
    }

    async fn enabled(&self) -> Result<bool, ChargerError> {
        self.update_state()?;
        Ok(self.boost())
    }

    async fn enable(&self, enable: bool) -> Result<(), ChargerError> {
        self.update_state()?;
        debug!("Set dummy boost to {}", to_on_off(enable));
        self.state.lock().unwrap_or_else(PoisonError::into_inner).boost = enable;
        Ok(())
    }

    async fn max_current(&self, _current: i64) -> Result<(), ChargerError> {
        Err(ChargerError::NotSupported)
    }
}
