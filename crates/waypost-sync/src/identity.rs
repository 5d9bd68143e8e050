//! Stable device identity.
//!
//! The identifier is chosen once per install: a valid platform-provided id
//! when one exists, otherwise a random v4 UUID. Whichever value wins is
//! persisted before it is ever handed out, so it survives restarts and is
//! never regenerated behind the caller's back.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::settings::{KEY_DEVICE_ID, Settings};

/// Defective identifier some platforms hand out as a shared default.
/// Treated as "no platform id available".
pub const INVALID_HARDWARE_ID: &str = "9774d56d682e549c";

/// Source of a platform-provided hardware or installation identifier.
pub trait HardwareId: Send + Sync {
    /// Best-effort read of the platform identifier; `None` when unavailable.
    fn hardware_id(&self) -> Option<String>;
}

/// Reads the machine id assigned by the OS at install time.
#[derive(Debug, Default)]
pub struct MachineId;

impl HardwareId for MachineId {
    fn hardware_id(&self) -> Option<String> {
        std::fs::read_to_string("/etc/machine-id")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Lazily-initialized, persisted device identifier.
pub struct DeviceIdentity {
    settings: Arc<dyn Settings>,
    hardware: Box<dyn HardwareId>,
    // Serializes the read-check-generate-write critical section so two
    // concurrent first accesses observe the same final value.
    init_lock: Mutex<()>,
}

impl DeviceIdentity {
    /// Create an identity backed by the default hardware id source.
    pub fn new(settings: Arc<dyn Settings>) -> Self {
        Self::with_hardware(settings, Box::new(MachineId))
    }

    /// Create an identity with a custom hardware id source.
    pub fn with_hardware(settings: Arc<dyn Settings>, hardware: Box<dyn HardwareId>) -> Self {
        Self {
            settings,
            hardware,
            init_lock: Mutex::new(()),
        }
    }

    /// Return the persisted device id, creating and persisting one on
    /// first use.
    pub async fn get_or_create(&self) -> Result<String> {
        let _guard = self.init_lock.lock().await;

        if let Some(id) = self.settings.get(KEY_DEVICE_ID).await?
            && !id.is_empty()
        {
            return Ok(id);
        }

        let id = match self.hardware.hardware_id() {
            Some(hw) if !hw.is_empty() && hw != INVALID_HARDWARE_ID => {
                debug!("Using platform hardware id");
                hw
            }
            _ => {
                debug!("No usable platform id, generating one");
                Uuid::new_v4().to_string()
            }
        };

        // Persist before returning so every later caller sees this value
        self.settings.put(KEY_DEVICE_ID, &id).await?;
        info!("Registered device id {}", id);
        Ok(id)
    }

    /// Discard the current id and persist a fresh one.
    ///
    /// Only for explicit user-triggered resets; nothing calls this
    /// automatically.
    pub async fn regenerate(&self) -> Result<String> {
        let _guard = self.init_lock.lock().await;

        let id = Uuid::new_v4().to_string();
        self.settings.put(KEY_DEVICE_ID, &id).await?;
        info!("Regenerated device id");
        Ok(id)
    }
}
