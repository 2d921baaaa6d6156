//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Astelco OpenTSI controller: asynchronous command issuing and response correlation.
//!
//! Commands are written without waiting for their replies; the response listener thread matches
//! each reply to its command by id using the pending table.
//!

pub mod axis;
pub mod decode;
pub mod listener;
pub mod pending;
pub mod protocol;
pub mod simulator;

use crate::config::Configuration;
use crate::devices::transport::{Connection, Transport};
use crate::devices::utils::{self, InvalidResponseTreatment, LineReader, ResponseType};
use crate::devices::{Credentials, DeviceConnection, DeviceError};
use crate::properties::{DriverToMainThreadMsg, GroupSnapshot, TextField};
use crossbeam::channel::Sender;
use decode::SemanticKind;
use listener::{Listener, Shared};
use pending::{Annotation, Completion, Pending};
use protocol::{path, Command, DeviceAxis, IdAllocator, LoginAck, PositionKind, StatusField, Value, Verb};
use std::io::Write;
use std::sync::Arc;

pub const DEFAULT_GREETING_LINES: usize = 3;

/// Number of greeting lines a controller may send after the banner.
const GREETING_LINES_RANGE: std::ops::RangeInclusive<usize> = 1..=3;

pub const DEFAULT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

/// How many read timeouts a relative move waits for the current position.
const CURRENT_VALUE_WAIT_FACTOR: u32 = 5;

/// Per-device differences between the Astelco drivers.
#[derive(Copy, Clone, Debug)]
pub struct Variant {
    pub axis: DeviceAxis,
    pub default_name: &'static str,
    pub line_terminator: &'static str
}

pub const FOCUSER: Variant = Variant{ axis: DeviceAxis::Focus, default_name: "Astelco Focus", line_terminator: "\r\n" };

pub const DOME: Variant = Variant{ axis: DeviceAxis::Dome, default_name: "Astelco Dome", line_terminator: "\r\n" };

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Disconnected,
    Handshaking,
    Connected,
    Disconnecting
}

pub struct Settings {
    pub connection: Connection,
    pub read_timeout: std::time::Duration,
    /// Unsolicited lines sent by the controller after the banner.
    pub greeting_lines: usize,
    pub credentials: Credentials
}

impl Settings {
    pub fn new(device: DeviceConnection, config: &Configuration) -> Settings {
        Settings{
            connection: device.connection,
            read_timeout: device.read_timeout,
            greeting_lines: clamp_greeting_lines(config.greeting_lines().unwrap_or(DEFAULT_GREETING_LINES)),
            credentials: config.astelco_credentials().unwrap_or_default()
        }
    }
}

fn clamp_greeting_lines(num: usize) -> usize {
    let clamped = num.max(*GREETING_LINES_RANGE.start()).min(*GREETING_LINES_RANGE.end());
    if clamped != num {
        log::warn!("number of greeting lines {} out of range; using {}", num, clamped);
    }
    clamped
}

pub struct Controller {
    variant: Variant,
    lifecycle: Lifecycle,
    writer: Option<Transport>,
    ids: IdAllocator,
    shared: Arc<Shared>,
    listener: Listener,
    read_timeout: std::time::Duration
}

impl Controller {
    /// Opens the link, performs the handshake and starts the response listener.
    pub fn connect(
        variant: Variant,
        settings: &Settings,
        sender: Sender<DriverToMainThreadMsg>
    ) -> Result<Controller, DeviceError> {
        let mut controller = Controller{
            variant,
            lifecycle: Lifecycle::Handshaking,
            writer: None,
            ids: IdAllocator::new(),
            shared: Arc::new(Shared::new()),
            listener: Listener::new(settings.read_timeout),
            read_timeout: settings.read_timeout
        };

        let mut writer = Transport::open(&settings.connection, settings.read_timeout)?;
        let mut reader = LineReader::new(writer.try_clone()?);

        let ack = match handshake(&mut writer, &mut reader, settings, variant.line_terminator) {
            Ok(ack) => ack,
            Err(e) => {
                controller.lifecycle = Lifecycle::Disconnected;
                log::error!("{}: {}", variant.default_name, e);
                return Err(e);
            }
        };
        log::info!(
            "{}: logged in as \"{}\" (read level {}, write level {})",
            variant.default_name, settings.credentials.username, ack.read_level, ack.write_level
        );

        controller.writer = Some(writer);
        controller.lifecycle = Lifecycle::Connected;
        controller.listener.start(reader, Arc::clone(&controller.shared), sender);
        controller.timer_hit()?;

        Ok(controller)
    }

    pub fn lifecycle(&self) -> Lifecycle { self.lifecycle }

    pub fn is_powered(&self) -> bool { self.shared.is_powered() }

    pub fn axis_value(&self, kind: PositionKind) -> Option<f64> {
        self.shared.axes().get(self.variant.axis, kind)
    }

    pub fn text(&self, field: TextField) -> String {
        self.shared.texts().get(field).to_string()
    }

    pub fn snapshots(&self) -> Vec<GroupSnapshot> {
        self.shared.snapshots()
    }

    /// Sends a command and returns its id without waiting for the response.
    pub fn issue(
        &mut self,
        verb: Verb,
        path: &str,
        value: Option<Value>,
        annotation: Option<Annotation>
    ) -> Result<u32, DeviceError> {
        self.issue_with_waiter(verb, path, value, annotation, None)
    }

    fn issue_with_waiter(
        &mut self,
        verb: Verb,
        path: &str,
        value: Option<Value>,
        annotation: Option<Annotation>,
        waiter: Option<Sender<pending::Reply>>
    ) -> Result<u32, DeviceError> {
        if self.lifecycle != Lifecycle::Connected { return Err(DeviceError::NotConnected); }
        let writer = self.writer.as_mut().ok_or(DeviceError::NotConnected)?;

        let command = Command::new(self.ids.allocate(), verb, path, value)?;
        let id = command.id();
        let line = command.to_line();

        // recorded before writing; the response may arrive before `write_all` returns
        self.shared.pending().insert(id, Pending{ annotation, waiter });

        log::debug!("sending: {}", line);
        let result = writer.write_all(format!("{}{}", line, self.variant.line_terminator).as_bytes())
            .and_then(|_| writer.flush());

        if let Err(e) = result {
            self.shared.pending().retire(id);
            log::error!("failed to send \"{}\": {}", line, e);
            return Err(e.into());
        }

        Ok(id)
    }

    fn get(&mut self, path: &str, annotation: Annotation) -> Result<u32, DeviceError> {
        self.issue(Verb::Get, path, None, Some(annotation))
    }

    fn set(&mut self, path: &str, value: Value) -> Result<u32, DeviceError> {
        self.issue(Verb::Set, path, Some(value), None)
    }

    fn status_annotation(&self, field: StatusField) -> Annotation {
        let text_field = TextField::Status(field);
        let axis = self.variant.axis;
        match field {
            StatusField::PowerState => Annotation::text(text_field, SemanticKind::PowerState),
            StatusField::LimitState => Annotation::text(text_field, SemanticKind::LimitState),
            StatusField::MotionState => Annotation::text(text_field, SemanticKind::MotionState),
            StatusField::RealPosition => Annotation::axis_value(text_field, axis, PositionKind::Real),
            StatusField::TargetPosition => Annotation::axis_value(text_field, axis, PositionKind::Target),
            StatusField::Offset => Annotation::axis_value(text_field, axis, PositionKind::Offset),
            StatusField::TargetDistance => Annotation::text(text_field, SemanticKind::Uninitialized)
        }
    }

    fn get_status(&mut self, field: StatusField) -> Result<u32, DeviceError> {
        let annotation = self.status_annotation(field);
        self.get(&path::status(self.variant.axis, field), annotation)
    }

    /// Issues the periodic status queries.
    pub fn timer_hit(&mut self) -> Result<(), DeviceError> {
        if self.lifecycle != Lifecycle::Connected { return Ok(()); }

        self.get(path::SERVER_UPTIME, Annotation::text(TextField::Uptime, SemanticKind::Uninitialized))?;
        self.get_ready_state()?;
        self.get_limits()?;

        if self.is_powered() {
            for field in [
                StatusField::PowerState,
                StatusField::RealPosition,
                StatusField::LimitState,
                StatusField::MotionState,
                StatusField::TargetPosition,
                StatusField::Offset,
                StatusField::TargetDistance
            ] {
                self.get_status(field)?;
            }
        }

        Ok(())
    }

    pub fn get_ready_state(&mut self) -> Result<u32, DeviceError> {
        self.get(path::TELESCOPE_READY_STATE, Annotation::text(TextField::TelescopeReady, SemanticKind::ReadyState))
    }

    pub fn get_limits(&mut self) -> Result<(), DeviceError> {
        let axis = self.variant.axis;
        self.get(&path::real_pos_min(axis), Annotation::axis_value(TextField::MinPosition, axis, PositionKind::Min))?;
        self.get(&path::real_pos_max(axis), Annotation::axis_value(TextField::MaxPosition, axis, PositionKind::Max))?;
        Ok(())
    }

    pub fn power(&mut self, on: bool) -> Result<u32, DeviceError> {
        self.set(path::TELESCOPE_READY, Value::Integer(if on { 1 } else { 0 }))
    }

    pub fn set_target(&mut self, position: f64) -> Result<u32, DeviceError> {
        let path = path::status(self.variant.axis, StatusField::TargetPosition);
        self.set(&path, Value::Real(position))
    }

    pub fn set_offset(&mut self, offset: f64) -> Result<u32, DeviceError> {
        let path = path::status(self.variant.axis, StatusField::Offset);
        self.set(&path, Value::Real(offset))
    }

    /// Queries an axis value and waits for the listener to decode the reply.
    pub fn fetch(&mut self, field: StatusField) -> Result<f64, DeviceError> {
        let annotation = self.status_annotation(field);
        let path = path::status(self.variant.axis, field);

        let (sender, receiver) = pending::reply_channel();
        let id = self.issue_with_waiter(Verb::Get, &path, None, Some(annotation), Some(sender))?;
        let completion = Completion::new(id, receiver);

        let reply = completion.wait(CURRENT_VALUE_WAIT_FACTOR * self.read_timeout)?;
        reply.axis_value.ok_or_else(|| DeviceError::InvalidResponse(format!("non-numeric value \"{}\"", reply.raw)))
    }

    /// Moves the axis target by `delta` relative to the current real position.
    pub fn move_rel(&mut self, delta: f64) -> Result<u32, DeviceError> {
        let current = self.fetch(StatusField::RealPosition)?;
        self.set_target(current + delta)
    }

    pub fn offset_rel(&mut self, delta: f64) -> Result<u32, DeviceError> {
        let current = self.fetch(StatusField::Offset)?;
        self.set_offset(current + delta)
    }

    pub fn disconnect(&mut self) -> Result<(), DeviceError> {
        if self.lifecycle != Lifecycle::Connected { return Ok(()); }

        self.lifecycle = Lifecycle::Disconnecting;
        self.listener.stop();

        let result = match self.writer.as_mut() {
            Some(writer) => writer.write_all(format!("{}{}", protocol::DISCONNECT, self.variant.line_terminator).as_bytes())
                .and_then(|_| writer.flush())
                .map_err(DeviceError::from),
            None => Ok(())
        };

        self.writer = None;
        self.lifecycle = Lifecycle::Disconnected;
        log::info!("{}: disconnected", self.variant.default_name);

        result
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::warn!("{}: error while disconnecting: {}", self.variant.default_name, e);
        }
    }
}

fn handshake(
    writer: &mut Transport,
    reader: &mut LineReader<Transport>,
    settings: &Settings,
    terminator: &str
) -> Result<LoginAck, DeviceError> {
    let mut banner = None;
    for attempt in 1..=2 {
        match utils::send_cmd_and_get_reply(writer, reader, terminator, ResponseType::Line, InvalidResponseTreatment::Fail) {
            Ok(line) if line.len() >= protocol::MIN_BANNER_LEN => { banner = Some(line); break; },
            Ok(line) => log::warn!("invalid banner \"{}\" (attempt {})", line, attempt),
            Err(e) => log::warn!("no banner received (attempt {}): {}", attempt, e)
        }
    }
    let banner = banner.ok_or_else(|| DeviceError::Handshake("no valid banner received".into()))?;
    log::info!("controller banner: {}", banner);

    for _ in 0..settings.greeting_lines {
        match reader.read_line() {
            Ok(Some(line)) => log::info!("greeting: {}", line),
            Ok(None) => break,
            Err(e) => return Err(DeviceError::Handshake(format!("error reading greeting: {}", e)))
        }
    }

    let auth = format!(
        "{}{}", protocol::auth_line(&settings.credentials.username, &settings.credentials.password), terminator
    );
    let reply = utils::send_cmd_and_get_reply(writer, reader, &auth, ResponseType::Line, InvalidResponseTreatment::Fail)?;
    let ack = LoginAck::parse(&reply)?;

    if ack.is_granted() {
        Ok(ack)
    } else {
        Err(DeviceError::Handshake(format!("login rejected: \"{}\"", reply)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::loopback;
    use crate::properties::DriverToMainThreadMsg;
    use listener::ListenerState;
    use simulator::Simulator;

    const TIMEOUT: std::time::Duration = std::time::Duration::from_millis(100);

    fn settings(connection: Connection) -> Settings {
        Settings{ connection, read_timeout: TIMEOUT, greeting_lines: DEFAULT_GREETING_LINES, credentials: Credentials::default() }
    }

    fn connect(simulator: Simulator, variant: Variant) -> (Controller, crossbeam::channel::Receiver<DriverToMainThreadMsg>) {
        let (connection, _) = simulator.spawn();
        let (sender, receiver) = crossbeam::channel::unbounded();
        (Controller::connect(variant, &settings(connection), sender).unwrap(), receiver)
    }

    /// Waits until `condition` holds for the controller's state.
    fn wait_for<F: Fn(&Controller) -> bool>(controller: &Controller, condition: F) -> bool {
        for _ in 0..100 {
            if condition(controller) { return true; }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn given_configured_greeting_lines_clamp_to_valid_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsilink.toml");
        let settings_for = |value: &str| {
            std::fs::write(&path, format!("[Connection]\nGreetingLines = {}\n", value)).unwrap();
            let device = DeviceConnection{
                kind: crate::devices::DriverKind::AstelcoFocuser,
                connection: Connection::Loopback(loopback::pair().0),
                read_timeout: TIMEOUT
            };
            Settings::new(device, &Configuration::from_file(&path))
        };

        assert_eq!(1, settings_for("0").greeting_lines);
        assert_eq!(2, settings_for("2").greeting_lines);
        assert_eq!(3, settings_for("100").greeting_lines);
    }

    #[test]
    fn given_write_failure_retire_entry_and_keep_id() {
        let (connection, simulator) = Simulator::new(DeviceAxis::Focus).spawn();
        let (sender, _receiver) = crossbeam::channel::unbounded();
        let mut controller = Controller::connect(FOCUSER, &settings(connection), sender).unwrap();

        controller.writer.as_mut().unwrap().write_all(b"DISCONNECT\r\n").unwrap();
        simulator.join().unwrap();
        assert!(wait_for(&controller, |c| c.shared.pending().len() == 0));

        let last_id = controller.ids.allocate();
        let result = controller.issue(Verb::Get, path::SERVER_UPTIME, None, None);
        assert!(matches!(result, Err(DeviceError::Io(_))));
        assert_eq!(0, controller.shared.pending().len());
        // the failed command used `last_id + 1`
        assert_eq!(last_id + 2, controller.ids.allocate());
    }

    #[test]
    fn given_simulator_connect_and_poll() {
        let (controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus), FOCUSER);
        assert_eq!(Lifecycle::Connected, controller.lifecycle());

        assert!(wait_for(&controller, |c| c.text(TextField::Uptime) == "1234"));
        assert!(wait_for(&controller, |c| c.is_powered()));
        assert!(wait_for(&controller, |c| c.axis_value(PositionKind::Max) == Some(50.0)));
        assert_eq!("FULLY OPERATIONAL", controller.text(TextField::TelescopeReady));
    }

    #[test]
    fn given_powered_controller_poll_status_battery() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus), FOCUSER);
        assert!(wait_for(&controller, |c| c.is_powered()));
        controller.timer_hit().unwrap();

        assert!(wait_for(&controller, |c| c.text(TextField::Status(StatusField::PowerState)) == "ON"));
        assert!(wait_for(&controller, |c| c.axis_value(PositionKind::Real) == Some(10.0)));
        assert_eq!(" ( )  ( )", controller.text(TextField::Status(StatusField::LimitState)));
    }

    #[test]
    fn given_unpowered_controller_skip_status_battery() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus).powered(false), FOCUSER);
        assert!(wait_for(&controller, |c| c.text(TextField::TelescopeReady) == "SHUT DOWN"));
        controller.timer_hit().unwrap();
        assert!(wait_for(&controller, |c| c.axis_value(PositionKind::Min).is_some()));

        assert_eq!(crate::properties::NOT_AVAILABLE, controller.text(TextField::Status(StatusField::PowerState)));
    }

    #[test]
    fn given_rejected_login_fail_without_listener() {
        let (connection, _) = Simulator::new(DeviceAxis::Focus).with_credentials("observer", "secret").spawn();
        let (sender, _receiver) = crossbeam::channel::unbounded();
        assert!(matches!(Controller::connect(FOCUSER, &settings(connection), sender), Err(DeviceError::Handshake(_))));
    }

    #[test]
    fn given_silent_device_fail_handshake() {
        let (host, _device) = loopback::pair();
        let (sender, _receiver) = crossbeam::channel::unbounded();
        assert!(matches!(
            Controller::connect(FOCUSER, &settings(Connection::Loopback(host)), sender),
            Err(DeviceError::Handshake(_))
        ));
    }

    #[test]
    fn given_fewer_greeting_lines_tolerate_timeout() {
        let (controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus).with_greeting_lines(1), FOCUSER);
        assert_eq!(Lifecycle::Connected, controller.lifecycle());
    }

    #[test]
    fn given_relative_move_read_current_then_set_target() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus), FOCUSER);
        controller.move_rel(-0.5).unwrap();
        controller.move_rel(0.1).unwrap();

        let position = controller.fetch(StatusField::RealPosition).unwrap();
        assert!((position - 9.6).abs() < 1.0e-9);
    }

    #[test]
    fn given_relative_offset_move_accumulate() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Dome), DOME);
        controller.offset_rel(0.05).unwrap();
        controller.offset_rel(0.05).unwrap();
        assert!((controller.fetch(StatusField::Offset).unwrap() - 0.1).abs() < 1.0e-9);
    }

    #[test]
    fn given_unanswered_query_relative_move_times_out() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus).ignoring_requests(100), FOCUSER);
        assert!(matches!(controller.move_rel(0.5), Err(DeviceError::ResponseTimeout(_))));
    }

    #[test]
    fn given_set_commands_pending_entries_are_retired() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus), FOCUSER);
        let id = controller.set_target(1.0).unwrap();
        assert!(wait_for(&controller, |c| !c.shared.pending().contains(id)));
    }

    #[test]
    fn given_invalid_path_fail_before_sending() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus), FOCUSER);
        assert!(matches!(controller.issue(Verb::Get, "BAD PATH", None, None), Err(DeviceError::InvalidCommand(_))));
    }

    #[test]
    fn given_disconnect_stop_listener_and_refuse_commands() {
        let (mut controller, _receiver) = connect(Simulator::new(DeviceAxis::Focus), FOCUSER);
        controller.disconnect().unwrap();

        assert_eq!(Lifecycle::Disconnected, controller.lifecycle());
        assert_eq!(ListenerState::Stopped, controller.listener.state());
        assert!(matches!(controller.power(true), Err(DeviceError::NotConnected)));
        assert!(controller.disconnect().is_ok());
    }

    #[test]
    fn given_decoded_responses_publish_refresh() {
        let (_controller, receiver) = connect(Simulator::new(DeviceAxis::Focus), FOCUSER);
        match receiver.recv_timeout(std::time::Duration::from_secs(2)).unwrap() {
            DriverToMainThreadMsg::Refresh(snapshots) => assert_eq!(3, snapshots.len()),
            _ => panic!("expected a refresh")
        }
    }
}
