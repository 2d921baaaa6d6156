//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Watec camera remote: mirror flip, exposure and gain via `#`-terminated commands.
//!
//! Every command is answered with a `#`-terminated reply; a missing reply fails the command.
//!

use crate::config::Configuration;
use crate::devices::{
    camera_remote::{ExposurePreset, GainPreset, GainStep, DEFAULT_EXPOSURE, DEFAULT_GAIN, MAX_GAIN},
    transport::Transport,
    utils::{self, InvalidResponseTreatment, LineReader, ResponseType},
    DeviceConnection,
    DeviceError,
    Driver
};
use crate::properties::{DriverToMainThreadMsg, GroupSnapshot, PropertyGroup, PropertyState, TextField, TextProperties};
use crate::requests::PropertyRequest;
use crossbeam::channel::Sender;

pub const DEFAULT_NAME: &str = "Watec Remote";

const TERMINATOR: u8 = b'#';

/// Time given to the mirror to complete a flip.
pub const DEFAULT_MIRROR_SETTLE_TIME: std::time::Duration = std::time::Duration::from_millis(1100);

mod cmd {
    pub const START: &str = "START";
    pub const STOP: &str = "STOP";
    pub const MIRROR_ON: &str = "MON";
    pub const MIRROR_OFF: &str = "MOF";
}

pub struct WatecRemote {
    connection_str: String,
    writer: Transport,
    reader: LineReader<Transport>,
    mirror_settle_time: std::time::Duration,
    gain: u32,
    texts: TextProperties,
    sender: Sender<DriverToMainThreadMsg>,
    connected: bool
}

impl WatecRemote {
    pub fn new(
        device: DeviceConnection,
        config: &Configuration,
        sender: Sender<DriverToMainThreadMsg>
    ) -> Result<WatecRemote, DeviceError> {
        let connection_str = device.connection.to_string();
        let writer = Transport::open(&device.connection, device.read_timeout)?;
        let reader = LineReader::with_delimiter(writer.try_clone()?, TERMINATOR);

        let mut remote = WatecRemote{
            connection_str,
            writer,
            reader,
            mirror_settle_time: config.mirror_settle_time().unwrap_or(DEFAULT_MIRROR_SETTLE_TIME),
            gain: 0,
            texts: TextProperties::default(),
            sender,
            connected: true
        };

        remote.send(cmd::START)?;
        remote.set_exposure(DEFAULT_EXPOSURE)?;
        remote.set_gain(DEFAULT_GAIN.value())?;
        remote.flip_mirror(true)?;
        log::info!("{} is online", DEFAULT_NAME);

        Ok(remote)
    }

    fn send(&mut self, command: &str) -> Result<(), DeviceError> {
        if !self.connected { return Err(DeviceError::NotConnected); }

        log::debug!("sending: {}", command);
        let reply = utils::send_cmd_and_get_reply(
            &mut self.writer,
            &mut self.reader,
            &format!("{}{}", command, TERMINATOR as char),
            ResponseType::Line,
            InvalidResponseTreatment::Fail
        )?;
        log::debug!("received: {}", reply);

        Ok(())
    }

    pub fn gain(&self) -> u32 { self.gain }

    fn publish(&self) {
        let _ = self.sender.send(DriverToMainThreadMsg::Refresh(self.summary()));
    }

    pub fn flip_mirror(&mut self, on: bool) -> Result<(), DeviceError> {
        self.send(if on { cmd::MIRROR_ON } else { cmd::MIRROR_OFF })?;
        std::thread::sleep(self.mirror_settle_time);

        self.texts.set(TextField::Mirror, if on { "ACTIVATED" } else { "DEACTIVATED" }.into());
        log::info!("mirror {}", if on { "on" } else { "off" });
        self.publish();
        Ok(())
    }

    pub fn set_exposure(&mut self, exposure: ExposurePreset) -> Result<(), DeviceError> {
        self.send(&format!("E1{}", exposure.code()))?;

        self.texts.set(TextField::Exposure, exposure.label().into());
        log::info!("exposure time set to {} (code {})", exposure.label(), exposure.code());
        self.publish();
        Ok(())
    }

    /// Preset values are sent with two digits ("G05"), as the camera's preset table expects.
    fn set_gain(&mut self, value: u32) -> Result<(), DeviceError> {
        self.send(&format!("G{:02}", value))?;
        self.update_gain(value);
        Ok(())
    }

    /// Changes the gain by `step`, limited to [0, `MAX_GAIN`].
    pub fn add_gain(&mut self, step: GainStep) -> Result<(), DeviceError> {
        let value = (self.gain as i64 + step.delta() as i64).max(0).min(MAX_GAIN as i64) as u32;
        self.send(&format!("G{}", value))?;
        self.update_gain(value);
        Ok(())
    }

    fn update_gain(&mut self, value: u32) {
        self.gain = value;
        self.texts.set(TextField::Gain, format!("{} %", value));
        log::info!("gain set to {}", value);
        self.publish();
    }
}

impl Driver for WatecRemote {
    fn info(&self) -> String {
        format!("{} on {}", DEFAULT_NAME, self.connection_str)
    }

    fn handle_request(&mut self, request: &PropertyRequest) -> Result<PropertyState, DeviceError> {
        match request {
            PropertyRequest::Mirror(on) => self.flip_mirror(*on)?,
            PropertyRequest::Exposure(exposure) => self.set_exposure(*exposure)?,
            PropertyRequest::Gain(preset) => {
                log::info!("applying gain preset {} %", preset.percent());
                self.set_gain(preset.value())?
            },
            PropertyRequest::GainIncrement(step) => self.add_gain(*step)?,
            _ => return Err(DeviceError::Unsupported(self.info()))
        }

        Ok(PropertyState::Ok)
    }

    /// The camera reports no state.
    fn timer_hit(&mut self) -> Result<(), DeviceError> { Ok(()) }

    fn summary(&self) -> Vec<GroupSnapshot> {
        vec![self.texts.snapshot(PropertyGroup::CameraSettings)]
    }

    fn store_config(&self, _config: &mut Configuration) {}

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        if !self.connected { return Ok(()); }

        let result = self.send(cmd::STOP);
        self.connected = false;
        log::info!("{} is offline", DEFAULT_NAME);

        result
    }
}

impl Drop for WatecRemote {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::warn!("error while disconnecting from {}: {}", DEFAULT_NAME, e);
        }
    }
}
