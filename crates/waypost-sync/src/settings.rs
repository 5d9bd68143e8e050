//! Durable key-value settings behind a small async seam.
//!
//! The core treats settings as an opaque durable map; tests substitute
//! [`MemorySettings`], the service wires [`StoreSettings`] over the store's
//! settings table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use waypost_store::Store;

use crate::error::Result;

/// Settings key holding the persisted device identifier.
pub const KEY_DEVICE_ID: &str = "device_id";

/// Settings key holding the tracking-enabled flag.
pub const KEY_TRACKING_ENABLED: &str = "tracking_enabled";

/// Opaque durable key-value map.
#[async_trait]
pub trait Settings: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read the tracking flag. Unset means enabled.
pub async fn tracking_enabled(settings: &dyn Settings) -> Result<bool> {
    Ok(settings
        .get(KEY_TRACKING_ENABLED)
        .await?
        .is_none_or(|v| v == "true"))
}

/// Persist the tracking flag.
pub async fn set_tracking_enabled(settings: &dyn Settings, enabled: bool) -> Result<()> {
    settings
        .put(KEY_TRACKING_ENABLED, if enabled { "true" } else { "false" })
        .await
}

/// In-memory settings for tests and embedders without durable storage.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    /// Create an empty settings map.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Settings for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Settings persisted in the store's settings table.
pub struct StoreSettings {
    store: Arc<Mutex<Store>>,
}

impl StoreSettings {
    /// Wrap a shared store handle.
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Settings for StoreSettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.lock().await.get_setting(key)?)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        Ok(self.store.lock().await.put_setting(key, value)?)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        Ok(self.store.lock().await.delete_setting(key)?)
    }
}
