//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Device drivers module.
//!

pub mod astelco;
pub mod camera_remote;
pub mod dome;
pub mod focuser;
pub mod loopback;
pub mod pdu;
pub mod transport;
mod utils;

use crate::config::Configuration;
use crate::properties::{DriverToMainThreadMsg, GroupSnapshot, PropertyState};
use crate::requests::PropertyRequest;
use camera_remote::WatecRemote;
use crossbeam::channel::Sender;
use dome::AstelcoDome;
use enum_dispatch::enum_dispatch;
use focuser::AstelcoFocuser;
use pdu::Netio;
use strum_macros as sm;
use transport::Connection;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("not connected")]
    NotConnected,

    #[error("no response to command {0}")]
    ResponseTimeout(u32),

    #[error("request not supported by {0}")]
    Unsupported(String)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, sm::Display, sm::EnumString, sm::EnumIter)]
pub enum DriverKind {
    #[strum(serialize = "focuser")]
    AstelcoFocuser,
    #[strum(serialize = "dome")]
    AstelcoDome,
    #[strum(serialize = "netio")]
    Netio,
    #[strum(serialize = "watec")]
    WatecRemote
}

impl DriverKind {
    pub fn default_tcp_port(&self) -> u16 {
        match self {
            DriverKind::AstelcoFocuser | DriverKind::AstelcoDome => 65432,
            DriverKind::Netio | DriverKind::WatecRemote => 23
        }
    }

    pub fn default_baud_rate(&self) -> u32 {
        match self {
            DriverKind::WatecRemote => 57600,
            _ => transport::DEFAULT_BAUD_RATE
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String
}

impl Default for Credentials {
    fn default() -> Credentials {
        Credentials{ username: "admin".into(), password: "admin".into() }
    }
}

pub struct DeviceConnection {
    pub kind: DriverKind,
    pub connection: Connection,
    pub read_timeout: std::time::Duration
}

#[enum_dispatch]
pub trait Driver {
    #[must_use]
    fn info(&self) -> String;

    fn handle_request(&mut self, request: &PropertyRequest) -> Result<PropertyState, DeviceError>;

    /// Called on every polling timer tick.
    fn timer_hit(&mut self) -> Result<(), DeviceError>;

    /// Current values of all property groups of the driver.
    fn summary(&self) -> Vec<GroupSnapshot>;

    /// Writes driver settings which persist across sessions.
    fn store_config(&self, config: &mut Configuration);

    fn disconnect(&mut self) -> Result<(), DeviceError>;
}

#[enum_dispatch(Driver)]
pub enum AnyDriver {
    AstelcoFocuser,
    AstelcoDome,
    Netio,
    WatecRemote
}

pub fn connect_to_device(
    device: DeviceConnection,
    config: &Configuration,
    sender: Sender<DriverToMainThreadMsg>
) -> Result<AnyDriver, DeviceError> {
    log::info!("connecting to {} via {}", device.kind, device.connection);

    match device.kind {
        DriverKind::AstelcoFocuser => Ok(AstelcoFocuser::new(device, config, sender)?.into()),
        DriverKind::AstelcoDome => Ok(AstelcoDome::new(device, config, sender)?.into()),
        DriverKind::Netio => Ok(Netio::new(device, config, sender)?.into()),
        DriverKind::WatecRemote => Ok(WatecRemote::new(device, config, sender)?.into())
    }
}
