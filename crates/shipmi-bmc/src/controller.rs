//! Callback interface for the management protocol server
//!
//! A protocol server owns the network session and decodes requests; for
//! each chassis request it calls the matching method of a [`BmcHandler`].
//! Domain rejections come back as [`Response::Status`]. Errors are hard
//! failures the server answers with [`crate::BmcError::completion_code`].

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BootDevice, PowerState, Response};

/// Operations a virtual BMC answers
#[async_trait]
pub trait BmcHandler: Send + Sync {
    /// Current boot device
    async fn get_boot_device(&self) -> Result<Response<BootDevice>>;

    /// Set next boot device from its protocol name
    async fn set_boot_device(&self, device: &str) -> Result<Response<()>>;

    /// Current power state
    async fn get_power_state(&self) -> Result<Response<PowerState>>;

    /// Power on the machine
    async fn power_on(&self) -> Result<()>;

    /// Power off the machine (hard)
    async fn power_off(&self) -> Result<()>;

    /// Hard reset
    async fn power_reset(&self) -> Result<()>;

    /// Soft shutdown (ACPI)
    async fn power_shutdown(&self) -> Result<()>;

    /// Diagnostic interrupt
    async fn pulse_diag(&self) -> Result<()>;
}
