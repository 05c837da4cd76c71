//! Boot device and power commands
//!
//! Each invocation builds one endpoint and answers one request, the same
//! way a protocol server would call into it.

use std::net::IpAddr;

use clap::{Args, Subcommand};
use color_eyre::eyre::{eyre, Result};

use shipmi_bmc::{
    BmcEndpointConfig, BmcHandler, ProviderRegistry, Response, Settings, VirtualBmc,
};

/// Endpoint identity shared by the boot and power commands
#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Virtual machine name, substituted as %(name)s
    #[arg(long, env = "SHIPMI_NAME")]
    pub name: String,

    /// Provider name or path to a .conf file
    #[arg(long, env = "SHIPMI_PROVIDER")]
    pub provider: String,

    /// Address the endpoint would listen on
    #[arg(long, default_value = "::")]
    pub address: IpAddr,

    /// Port the endpoint would listen on
    #[arg(long, default_value_t = 623)]
    pub port: u16,

    /// BMC username
    #[arg(long, default_value = "admin")]
    pub username: String,

    /// BMC password
    #[arg(long, env = "SHIPMI_PASSWORD", default_value = "password", hide_env_values = true)]
    pub password: String,
}

impl EndpointArgs {
    fn to_config(&self) -> BmcEndpointConfig {
        BmcEndpointConfig::new(&self.name, &self.provider)
            .with_address(self.address)
            .with_port(self.port)
            .with_credentials(&self.username, &self.password)
    }

    fn connect(&self, registry: &ProviderRegistry, settings: &Settings) -> Result<VirtualBmc> {
        Ok(VirtualBmc::from_registry(self.to_config(), registry, settings)?)
    }
}

#[derive(Args, Debug)]
pub struct BootArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    #[command(subcommand)]
    pub action: BootAction,
}

#[derive(Subcommand, Debug)]
pub enum BootAction {
    /// Prints the current boot device.
    Get,
    /// Sets the boot device (network, hd or optical).
    Set {
        /// Boot device
        device: String,
    },
}

#[derive(Args, Debug)]
pub struct PowerArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    #[command(subcommand)]
    pub action: PowerAction,
}

#[derive(Subcommand, Debug)]
pub enum PowerAction {
    /// Prints the power state (on or off).
    Status,
    /// Powers the machine on.
    On,
    /// Powers the machine off (hard).
    Off,
    /// Resets the machine.
    Reset,
    /// Requests a soft shutdown.
    Shutdown,
    /// Sends a diagnostic interrupt.
    Diag,
}

/// Turn a protocol status into an error for the shell
fn into_data<T>(response: Response<T>) -> Result<T> {
    match response {
        Response::Data(value) => Ok(value),
        Response::Status(code) => Err(eyre!("{}", code)),
    }
}

pub async fn run_boot(args: BootArgs, registry: &ProviderRegistry, settings: &Settings) -> Result<()> {
    let bmc = args.endpoint.connect(registry, settings)?;

    match args.action {
        BootAction::Get => {
            let device = into_data(bmc.get_boot_device().await?)?;
            println!("{}", device);
        }
        BootAction::Set { device } => {
            into_data(bmc.set_boot_device(&device).await?)?;
        }
    }
    Ok(())
}

pub async fn run_power(args: PowerArgs, registry: &ProviderRegistry, settings: &Settings) -> Result<()> {
    let bmc = args.endpoint.connect(registry, settings)?;

    match args.action {
        PowerAction::Status => {
            let state = into_data(bmc.get_power_state().await?)?;
            println!("{}", state);
        }
        PowerAction::On => bmc.power_on().await?,
        PowerAction::Off => bmc.power_off().await?,
        PowerAction::Reset => bmc.power_reset().await?,
        PowerAction::Shutdown => bmc.power_shutdown().await?,
        PowerAction::Diag => bmc.pulse_diag().await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipmi_bmc::{BootDevice, CompletionCode};

    #[test]
    fn test_into_data() {
        assert_eq!(into_data(Response::Data(BootDevice::Hd)).unwrap(), BootDevice::Hd);

        let err = into_data::<BootDevice>(Response::Status(CompletionCode::InvalidData)).unwrap_err();
        assert_eq!(err.to_string(), "invalid data (0xcc)");
    }

    #[test]
    fn test_endpoint_config() {
        let args = EndpointArgs {
            name: "vm1".to_string(),
            provider: "libvirt".to_string(),
            address: "127.0.0.1".parse().unwrap(),
            port: 6230,
            username: "root".to_string(),
            password: "secret".to_string(),
        };

        let config = args.to_config();
        assert_eq!(config.name, "vm1");
        assert_eq!(config.provider, "libvirt");
        assert_eq!(config.port, 6230);
        assert_eq!(config.username, "root");
    }
}
