//! Shipmi virtual BMC
//!
//! This crate lets a virtual machine be managed like physical hardware
//! with a BMC. Each management request (power, boot device, diagnostic
//! interrupt) is answered by running a shell command taken from a
//! *provider*: an INI file that maps every operation to a command
//! template for one virtualization backend.
//!
//! # Provider files
//!
//! ```ini
//! [BOOT]
//! get = my-vm-tool boot-device %(name)s
//! set = my-vm-tool boot-device %(name)s %(boot_device)s
//!
//! [POWER]
//! status = my-vm-tool is-running %(name)s && echo on || echo off
//! on = my-vm-tool start %(name)s
//! off = my-vm-tool destroy %(name)s
//! diag = my-vm-tool inject-nmi %(name)s
//! reset = my-vm-tool reset %(name)s
//! shutdown = my-vm-tool shutdown %(name)s
//! ```
//!
//! Providers are discovered in `$SHIPMI_PROVIDERS`, `~/.shipmi/providers`
//! and `/etc/shipmi/providers`, or loaded directly from a `.conf` path.
//!
//! # Example
//!
//! ```no_run
//! use shipmi_bmc::{BmcEndpointConfig, BmcHandler, ProviderRegistry, Settings, VirtualBmc};
//!
//! # async fn example() -> shipmi_bmc::Result<()> {
//! let settings = Settings::from_env()?;
//! let registry = ProviderRegistry::from_settings(&settings);
//!
//! let bmc = VirtualBmc::from_registry(
//!     BmcEndpointConfig::new("vm1", "libvirt"),
//!     &registry,
//!     &settings,
//! )?;
//!
//! bmc.set_boot_device("network").await?;
//! bmc.power_reset().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The management wire protocol is not implemented here. A protocol
//! server drives a [`BmcHandler`] and translates its replies.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod ini;
pub mod provider;
pub mod registry;
pub mod types;
pub mod vbmc;

pub use command::{CommandDispatcher, CommandOutput, CommandRunner, ShellRunner, Substitutions};
pub use config::Settings;
pub use controller::BmcHandler;
pub use error::{BmcError, Result};
pub use provider::{Operation, ProviderConfig};
pub use registry::{is_provider_file, ProviderRegistry};
pub use types::{BmcEndpointConfig, BootDevice, CompletionCode, PowerState, Response};
pub use vbmc::VirtualBmc;
