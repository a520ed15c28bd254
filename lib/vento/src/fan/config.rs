use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;

use crate::discover::{BROADCAST_HOST, DEFAULT_PASSWORD, DEFAULT_PORT, PLACEHOLDER_ID};

/// Configuration surface consumed from the outer platform. The host may be
/// the broadcast sentinel and the device id a placeholder; both are then
/// resolved by discovery during [`Fan::init`](crate::Fan::init).
#[derive(Debug, Clone, Deserialize)]
pub struct FanConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_name")]
    pub name: String,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            device_id: default_device_id(),
            password: default_password(),
            name: default_name(),
        }
    }
}

fn default_host() -> String {
    BROADCAST_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_device_id() -> String {
    PLACEHOLDER_ID.to_string()
}

fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}

fn default_name() -> String {
    "Vento Expert Fan".to_string()
}

/// Device ids owned by live sessions in this process. Handed explicitly to
/// every [`Fan::init`](crate::Fan::init) so two sessions can never adopt
/// the same unit.
#[derive(Debug, Clone, Default)]
pub struct ClaimedIds(Arc<Mutex<HashSet<String>>>);

impl ClaimedIds {
    pub fn claim(&self, id: &str) -> bool {
        self.lock().insert(id.to_string())
    }

    pub fn release(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
