//! Virtual BMC endpoint
//!
//! [`VirtualBmc`] answers management requests for one virtual machine by
//! running its provider's commands. Boot devices are checked before a
//! `set` is dispatched and after a `get` returns, since provider scripts
//! are external and may print anything.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::command::{CommandDispatcher, CommandRunner, Substitutions};
use crate::config::Settings;
use crate::controller::BmcHandler;
use crate::error::Result;
use crate::provider::{Operation, ProviderConfig, BOOT_DEVICE_KEY, NAME_KEY};
use crate::registry::ProviderRegistry;
use crate::types::{BmcEndpointConfig, BootDevice, PowerState, Response};

/// One virtual BMC endpoint bound to a provider
#[derive(Debug, Clone)]
pub struct VirtualBmc {
    config: BmcEndpointConfig,
    dispatcher: CommandDispatcher,
}

impl VirtualBmc {
    /// Create an endpoint for an already resolved provider
    pub fn new(config: BmcEndpointConfig, provider: Arc<ProviderConfig>, settings: &Settings) -> Self {
        Self {
            config,
            dispatcher: CommandDispatcher::new(provider, settings),
        }
    }

    /// Create an endpoint, resolving `config.provider` through the registry
    ///
    /// Configuration errors abort construction.
    pub fn from_registry(
        config: BmcEndpointConfig,
        registry: &ProviderRegistry,
        settings: &Settings,
    ) -> Result<Self> {
        let provider = registry.resolve(&config.provider)?;
        debug!(
            "Endpoint {} uses provider {}",
            config.name,
            provider.name()
        );
        Ok(Self::new(config, provider, settings))
    }

    /// Replace the command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.dispatcher = self.dispatcher.with_runner(runner);
        self
    }

    /// Virtual machine name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Endpoint configuration
    pub fn config(&self) -> &BmcEndpointConfig {
        &self.config
    }

    /// Provider in use
    pub fn provider(&self) -> &ProviderConfig {
        self.dispatcher.provider()
    }

    fn substitutions(&self) -> Substitutions {
        Substitutions::from([(NAME_KEY, self.config.name.clone())])
    }

    async fn run(&self, op: Operation) -> Result<String> {
        self.dispatcher.run(op, &self.substitutions()).await
    }
}

#[async_trait]
impl BmcHandler for VirtualBmc {
    async fn get_boot_device(&self) -> Result<Response<BootDevice>> {
        debug!("Get boot device called for {}", self.name());
        let output = self.run(Operation::BootGet).await?;
        debug!("Got boot device: {}", output);

        match output.parse::<BootDevice>() {
            Ok(device) => Ok(Response::Data(device)),
            Err(()) => {
                warn!(
                    "Provider {} reported invalid boot device '{}' for {}",
                    self.provider().name(),
                    output,
                    self.name()
                );
                Ok(Response::invalid_data())
            }
        }
    }

    async fn set_boot_device(&self, device: &str) -> Result<Response<()>> {
        debug!(
            "Set boot device called for {} with boot device \"{}\"",
            self.name(),
            device
        );
        let Ok(device) = device.parse::<BootDevice>() else {
            return Ok(Response::invalid_data());
        };

        let mut substitutions = self.substitutions();
        substitutions.insert(BOOT_DEVICE_KEY, device.to_string());
        self.dispatcher
            .run(Operation::BootSet, &substitutions)
            .await?;
        Ok(Response::Data(()))
    }

    async fn get_power_state(&self) -> Result<Response<PowerState>> {
        debug!("Get power state called for {}", self.name());
        let output = self.run(Operation::PowerStatus).await?;

        match PowerState::from_output(&output) {
            Some(state) => Ok(Response::Data(state)),
            None => {
                warn!(
                    "Provider {} reported invalid power state '{}' for {}",
                    self.provider().name(),
                    output,
                    self.name()
                );
                Ok(Response::invalid_data())
            }
        }
    }

    async fn power_on(&self) -> Result<()> {
        debug!("Power on called for {}", self.name());
        self.run(Operation::PowerOn).await?;
        Ok(())
    }

    async fn power_off(&self) -> Result<()> {
        debug!("Power off called for {}", self.name());
        self.run(Operation::PowerOff).await?;
        Ok(())
    }

    async fn power_reset(&self) -> Result<()> {
        debug!("Power reset called for {}", self.name());
        self.run(Operation::PowerReset).await?;
        Ok(())
    }

    async fn power_shutdown(&self) -> Result<()> {
        debug!("Soft power off called for {}", self.name());
        self.run(Operation::PowerShutdown).await?;
        Ok(())
    }

    async fn pulse_diag(&self) -> Result<()> {
        debug!("Power diag called for {}", self.name());
        self.run(Operation::PowerDiag).await?;
        Ok(())
    }
}
