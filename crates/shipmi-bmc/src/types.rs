//! Common types for virtual BMC operations

use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

/// Power state of a virtual machine, encoded as the protocol expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Machine is powered off
    Off = 0,
    /// Machine is powered on
    On = 1,
}

impl PowerState {
    /// Parse provider output: `0`/`off` or `1`/`on`
    pub fn from_output(output: &str) -> Option<Self> {
        match output {
            "0" | "off" => Some(PowerState::Off),
            "1" | "on" => Some(PowerState::On),
            _ => None,
        }
    }

    /// Protocol encoding
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// Boot device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDevice {
    /// Boot from network (PXE)
    Network,
    /// Boot from local disk
    Hd,
    /// Boot from CD/DVD
    Optical,
}

impl BootDevice {
    /// All devices a provider may be asked to set or report
    pub const ALL: [BootDevice; 3] = [BootDevice::Network, BootDevice::Hd, BootDevice::Optical];

    /// Name used in provider commands and output
    pub fn as_str(&self) -> &'static str {
        match self {
            BootDevice::Network => "network",
            BootDevice::Hd => "hd",
            BootDevice::Optical => "optical",
        }
    }
}

impl std::fmt::Display for BootDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BootDevice {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BootDevice::ALL
            .into_iter()
            .find(|device| device.as_str() == s)
            .ok_or(())
    }
}

/// IPMI completion codes surfaced to the protocol layer
///
/// From the IPMI v2.0 specification, table 5-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    /// Command completed normally
    Success = 0x00,
    /// Command could not be processed, may be retried
    NodeBusy = 0xC0,
    /// Invalid data field in request
    InvalidData = 0xCC,
    /// Unspecified error
    Unspecified = 0xFF,
}

impl CompletionCode {
    /// Raw wire value
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CompletionCode::Success => "success",
            CompletionCode::NodeBusy => "node busy",
            CompletionCode::InvalidData => "invalid data",
            CompletionCode::Unspecified => "unspecified error",
        };
        write!(f, "{} (0x{:02x})", label, self.code())
    }
}

/// Reply to a request: either data or a protocol status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<T> {
    /// Request succeeded with a value
    Data(T),
    /// Request was rejected with a completion code
    Status(CompletionCode),
}

impl<T> Response<T> {
    /// Shorthand for the invalid-data rejection
    pub fn invalid_data() -> Self {
        Response::Status(CompletionCode::InvalidData)
    }

    /// The value, if the request succeeded
    pub fn data(self) -> Option<T> {
        match self {
            Response::Data(value) => Some(value),
            Response::Status(_) => None,
        }
    }

    /// The rejection code, if any
    pub fn status(&self) -> Option<CompletionCode> {
        match self {
            Response::Data(_) => None,
            Response::Status(code) => Some(*code),
        }
    }
}

/// Identity and network binding of one virtual BMC endpoint
///
/// Address, port and credentials are consumed by the protocol server;
/// the endpoint itself only needs `name` and `provider`.
#[derive(Debug, Clone)]
pub struct BmcEndpointConfig {
    /// Virtual machine name, substituted as `%(name)s`
    pub name: String,
    /// Provider name or path to a `.conf` file
    pub provider: String,
    /// Listen address
    pub address: IpAddr,
    /// Listen port (default 623)
    pub port: u16,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl BmcEndpointConfig {
    /// Create new endpoint config with default binding and credentials
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            address: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: 623,
            username: "admin".to_string(),
            password: "password".to_string(),
        }
    }

    /// Set listen address
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Set custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}
