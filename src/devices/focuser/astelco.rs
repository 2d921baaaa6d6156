//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Astelco OpenTSI focuser driver.
//!

use crate::config::Configuration;
use crate::devices::{
    astelco::{self, protocol::PositionKind, Controller, Settings},
    focuser::{Position, PositionRange},
    Credentials,
    DeviceConnection,
    DeviceError,
    Driver
};
use crate::properties::{DriverToMainThreadMsg, GroupSnapshot, PropertyState};
use crate::requests::{PowerSwitch, PropertyRequest};
use crossbeam::channel::Sender;

pub struct AstelcoFocuser {
    connection_str: String,
    controller: Controller,
    credentials: Credentials
}

impl AstelcoFocuser {
    pub fn new(
        device: DeviceConnection,
        config: &Configuration,
        sender: Sender<DriverToMainThreadMsg>
    ) -> Result<AstelcoFocuser, DeviceError> {
        let connection_str = device.connection.to_string();
        let settings = Settings::new(device, config);
        let controller = Controller::connect(astelco::FOCUSER, &settings, sender)?;

        Ok(AstelcoFocuser{ connection_str, controller, credentials: settings.credentials })
    }

    /// Known only after the controller has answered the limit queries.
    pub fn pos_range(&self) -> Option<PositionRange> {
        Some(PositionRange{
            min: Position(self.controller.axis_value(PositionKind::Min)?),
            max: Position(self.controller.axis_value(PositionKind::Max)?)
        })
    }

    pub fn begin_move(&mut self, target: Position) -> Result<(), DeviceError> {
        if let Some(range) = self.pos_range() {
            if !range.contains(target) {
                log::warn!("focuser target {:.3} mm outside of range [{:.3}, {:.3}]", target.0, range.min.0, range.max.0);
            }
        }
        self.controller.set_target(target.0).map(|_| ())
    }
}

impl Driver for AstelcoFocuser {
    fn info(&self) -> String {
        format!("{} on {}", astelco::FOCUSER.default_name, self.connection_str)
    }

    fn handle_request(&mut self, request: &PropertyRequest) -> Result<PropertyState, DeviceError> {
        match request {
            PropertyRequest::GotoTarget(target) => self.begin_move(Position(*target))?,
            PropertyRequest::SetOffset(offset) => { self.controller.set_offset(*offset)?; },
            PropertyRequest::Nudge(step) => { self.controller.move_rel(step.delta())?; },
            PropertyRequest::NudgeOffset(step) => { self.controller.offset_rel(step.delta())?; },
            PropertyRequest::MoveRelative(delta) => { self.controller.move_rel(*delta)?; },
            PropertyRequest::MoveOffsetRelative(delta) => { self.controller.offset_rel(*delta)?; },
            PropertyRequest::Power(PowerSwitch::On) => { self.controller.power(true)?; },
            PropertyRequest::Power(PowerSwitch::Off) => { self.controller.power(false)?; },
            PropertyRequest::Power(PowerSwitch::GetState) => { self.controller.get_ready_state()?; },

            PropertyRequest::Login{ username, password } => {
                self.credentials = Credentials{ username: username.clone(), password: password.clone() };
                log::info!("credentials of \"{}\" will be used on next connection", username);
            },

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
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.controller.disconnect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::astelco::{protocol::DeviceAxis, simulator::Simulator};
    use crate::devices::{astelco::protocol::StatusField, DriverKind};
    use crate::properties::TextField;
    use crate::requests::NudgeStep;

    fn connect(simulator: Simulator) -> (AstelcoFocuser, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::from_file(&dir.path().join("tsilink.toml"));
        let (connection, _) = simulator.spawn();
        let device = DeviceConnection{
            kind: DriverKind::AstelcoFocuser,
            connection,
            read_timeout: std::time::Duration::from_millis(100)
        };
        let (sender, _) = crossbeam::channel::unbounded();
        (AstelcoFocuser::new(device, &config, sender).unwrap(), dir)
    }

    #[test]
    fn given_nudge_requests_move_target_from_real_position() {
        let (mut focuser, _dir) = connect(Simulator::new(DeviceAxis::Focus));
        let nudge = PropertyRequest::Nudge(NudgeStep::new(0.5).unwrap());

        assert_eq!(PropertyState::Ok, focuser.handle_request(&nudge).unwrap());
        assert_eq!(PropertyState::Ok, focuser.handle_request(&nudge).unwrap());
        focuser.handle_request(&PropertyRequest::MoveRelative(0.0)).unwrap();
        assert_eq!(Some(11.0), focuser.controller.axis_value(PositionKind::Real));
        assert_eq!("11.000000", focuser.controller.text(TextField::Status(StatusField::RealPosition)));
    }

    #[test]
    fn given_dome_request_report_unsupported() {
        let (mut focuser, _dir) = connect(Simulator::new(DeviceAxis::Focus));
        assert!(matches!(focuser.handle_request(&PropertyRequest::Park), Err(DeviceError::Unsupported(_))));
    }

    #[test]
    fn given_login_store_credentials_in_config() {
        let (mut focuser, dir) = connect(Simulator::new(DeviceAxis::Focus));
        focuser.handle_request(&PropertyRequest::Login{ username: "obs".into(), password: "pw".into() }).unwrap();

        let mut config = Configuration::from_file(&dir.path().join("tsilink.toml"));
        focuser.store_config(&mut config);
        assert_eq!(Some(Credentials{ username: "obs".into(), password: "pw".into() }), config.astelco_credentials());
    }

    #[test]
    fn given_limits_polled_report_range() {
        let (focuser, _dir) = connect(Simulator::new(DeviceAxis::Focus));
        for _ in 0..100 {
            if focuser.pos_range().is_some() { break; }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(Some(PositionRange{ min: Position(0.0), max: Position(50.0) }), focuser.pos_range());
    }
}
