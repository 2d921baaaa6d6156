//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Astelco OpenTSI dome driver.
//!

use crate::config::Configuration;
use crate::devices::{
    astelco::{self, protocol::StatusField, Controller, Settings},
    dome::{ParkState, DEFAULT_PARK_AZIMUTH},
    Credentials,
    DeviceConnection,
    DeviceError,
    Driver
};
use crate::properties::{DriverToMainThreadMsg, GroupSnapshot, PropertyState};
use crate::requests::{PowerSwitch, PropertyRequest};
use crossbeam::channel::Sender;

pub struct AstelcoDome {
    connection_str: String,
    controller: Controller,
    credentials: Credentials,
    /// Degrees.
    park_azimuth: f64,
    park_state: ParkState
}

impl AstelcoDome {
    pub fn new(
        device: DeviceConnection,
        config: &Configuration,
        sender: Sender<DriverToMainThreadMsg>
    ) -> Result<AstelcoDome, DeviceError> {
        let connection_str = device.connection.to_string();
        let park_azimuth = config.dome_park_position().unwrap_or(DEFAULT_PARK_AZIMUTH);
        let settings = Settings::new(device, config);
        let controller = Controller::connect(astelco::DOME, &settings, sender)?;

        Ok(AstelcoDome{
            connection_str,
            controller,
            credentials: settings.credentials,
            park_azimuth,
            park_state: ParkState::Unparked
        })
    }

    pub fn park_azimuth(&self) -> f64 { self.park_azimuth }

    fn ensure_unparked(&self) -> Result<(), DeviceError> {
        match self.park_state {
            ParkState::Parked => Err(DeviceError::InvalidCommand("dome is parked".into())),
            ParkState::Unparked => Ok(())
        }
    }

    fn park(&mut self) -> Result<(), DeviceError> {
        self.controller.set_target(self.park_azimuth)?;
        self.park_state = ParkState::Parked;
        log::info!("parking dome at {:.2}°", self.park_azimuth);
        Ok(())
    }

    fn set_current_park(&mut self) -> Result<(), DeviceError> {
        let azimuth = self.controller.fetch(StatusField::RealPosition)?;
        self.park_azimuth = azimuth;
        log::info!("dome park azimuth set to {:.2}°", azimuth);
        Ok(())
    }
}

impl Driver for AstelcoDome {
    fn info(&self) -> String {
        format!("{} on {}", astelco::DOME.default_name, self.connection_str)
    }

    fn handle_request(&mut self, request: &PropertyRequest) -> Result<PropertyState, DeviceError> {
        match request {
            PropertyRequest::GotoTarget(azimuth) => {
                self.ensure_unparked()?;
                self.controller.set_target(*azimuth)?;
            },

            PropertyRequest::MoveRelative(delta) => {
                self.ensure_unparked()?;
                self.controller.move_rel(*delta)?;
            },

            PropertyRequest::SetOffset(offset) => { self.controller.set_offset(*offset)?; },
            PropertyRequest::MoveOffsetRelative(delta) => { self.controller.offset_rel(*delta)?; },
            PropertyRequest::Power(PowerSwitch::On) => { self.controller.power(true)?; },
            PropertyRequest::Power(PowerSwitch::Off) => { self.controller.power(false)?; },
            PropertyRequest::Power(PowerSwitch::GetState) => { self.controller.get_ready_state()?; },

            PropertyRequest::Login{ username, password } => {
                self.credentials = Credentials{ username: username.clone(), password: password.clone() };
                log::info!("credentials of \"{}\" will be used on next connection", username);
            },

            PropertyRequest::Park => {
                self.park()?;
                return Ok(PropertyState::Busy);
            },

            PropertyRequest::Unpark => self.park_state = ParkState::Unparked,
            PropertyRequest::SetCurrentPark => self.set_current_park()?,
            PropertyRequest::SetDefaultPark => self.park_azimuth = DEFAULT_PARK_AZIMUTH,

            _ => return Err(DeviceError::Unsupported(self.info()))
        }

        Ok(PropertyState::Ok)
    }

    fn timer_hit(&mut self) -> Result<(), DeviceError> {
        self.controller.timer_hit()
    }

    fn summary(&self) -> Vec<GroupSnapshot> {
        self.controller.snapshots()
    }

    fn store_config(&self, config: &mut Configuration) {
        config.set_astelco_credentials(&self.credentials);
        config.set_dome_park_position(self.park_azimuth);
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.controller.disconnect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::astelco::{protocol::DeviceAxis, simulator::Simulator};
    use crate::devices::DriverKind;

    fn connect(config: &Configuration) -> AstelcoDome {
        let (connection, _) = Simulator::new(DeviceAxis::Dome).spawn();
        let device = DeviceConnection{
            kind: DriverKind::AstelcoDome,
            connection,
            read_timeout: std::time::Duration::from_millis(100)
        };
        let (sender, _) = crossbeam::channel::unbounded();
        AstelcoDome::new(device, config, sender).unwrap()
    }

    fn config(dir: &tempfile::TempDir) -> Configuration {
        Configuration::from_file(&dir.path().join("tsilink.toml"))
    }

    #[test]
    fn given_parked_dome_refuse_moves_until_unparked() {
        let dir = tempfile::tempdir().unwrap();
        let mut dome = connect(&config(&dir));

        assert_eq!(PropertyState::Busy, dome.handle_request(&PropertyRequest::Park).unwrap());
        assert_eq!(ParkState::Parked, dome.park_state);
        assert!(dome.handle_request(&PropertyRequest::GotoTarget(90.0)).is_err());

        dome.handle_request(&PropertyRequest::Unpark).unwrap();
        assert_eq!(PropertyState::Ok, dome.handle_request(&PropertyRequest::GotoTarget(90.0)).unwrap());
    }

    #[test]
    fn given_set_current_park_use_real_azimuth_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut dome = connect(&config(&dir));

        dome.handle_request(&PropertyRequest::MoveRelative(35.0)).unwrap();
        dome.handle_request(&PropertyRequest::SetCurrentPark).unwrap();
        assert!((dome.park_azimuth() - 45.0).abs() < 1.0e-9);

        let mut stored = config(&dir);
        dome.store_config(&mut stored);
        stored.store().unwrap();
        assert_eq!(Some(45.0), config(&dir).dome_park_position());
    }

    #[test]
    fn given_default_park_reset_azimuth() {
        let dir = tempfile::tempdir().unwrap();
        let mut initial = config(&dir);
        initial.set_dome_park_position(180.0);
        let mut dome = connect(&initial);
        assert_eq!(180.0, dome.park_azimuth());

        dome.handle_request(&PropertyRequest::SetDefaultPark).unwrap();
        assert_eq!(DEFAULT_PARK_AZIMUTH, dome.park_azimuth());
    }
}
