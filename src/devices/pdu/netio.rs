//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Koukaam NETIO-4 driver (telnet KSHELL interface).
//!

use crate::config::Configuration;
use crate::devices::{
    pdu::SocketState,
    transport::Transport,
    utils::{self, InvalidResponseTreatment, LineReader, ResponseType},
    Credentials,
    DeviceConnection,
    DeviceError,
    Driver
};
use crate::properties::{DriverToMainThreadMsg, GroupSnapshot, PropertyGroup, PropertyState, TextField, TextProperties, NUM_SOCKETS};
use crate::requests::PropertyRequest;
use crossbeam::channel::Sender;

const REPLY_OK: &str = "250";

pub struct Netio {
    connection_str: String,
    writer: Transport,
    reader: LineReader<Transport>,
    credentials: Credentials,
    /// Index 0 corresponds to socket 1.
    names: Vec<String>,
    states: [Option<SocketState>; NUM_SOCKETS],
    texts: TextProperties,
    sender: Sender<DriverToMainThreadMsg>,
    connected: bool
}

fn default_socket_name(index: usize) -> String {
    format!("Socket {}", index)
}

/// Parses the reply to "port list", e.g. "250 0110".
fn parse_port_list(reply: &str) -> Result<Vec<Option<SocketState>>, DeviceError> {
    let digits = reply.strip_prefix(REPLY_OK)
        .map(|s| s.trim())
        .ok_or_else(|| DeviceError::InvalidResponse(format!("unexpected port list \"{}\"", reply)))?;

    if digits.len() < NUM_SOCKETS {
        return Err(DeviceError::InvalidResponse(format!("port list \"{}\" too short", reply)));
    }

    Ok(digits.chars().take(NUM_SOCKETS).map(|c| match c {
        '0' => Some(SocketState::Off),
        '1' => Some(SocketState::On),
        _ => None
    }).collect())
}

impl Netio {
    pub fn new(
        device: DeviceConnection,
        config: &Configuration,
        sender: Sender<DriverToMainThreadMsg>
    ) -> Result<Netio, DeviceError> {
        let connection_str = device.connection.to_string();
        let writer = Transport::open(&device.connection, device.read_timeout)?;
        let reader = LineReader::new(writer.try_clone()?);

        let mut netio = Netio{
            connection_str,
            writer,
            reader,
            credentials: config.netio_credentials().unwrap_or_default(),
            names: (1..=NUM_SOCKETS).map(|i| config.socket_name(i).unwrap_or_else(|| default_socket_name(i))).collect(),
            states: [None; NUM_SOCKETS],
            texts: TextProperties::default(),
            sender,
            connected: false
        };

        netio.log_in()?;
        netio.connected = true;
        netio.update_texts();
        netio.timer_hit()?;

        Ok(netio)
    }

    fn log_in(&mut self) -> Result<(), DeviceError> {
        match self.reader.read_line() {
            Ok(Some(greeting)) => log::info!("NETIO greeting: {}", greeting),
            Ok(None) => log::warn!("no greeting from NETIO"),
            Err(e) => return Err(e.into())
        }

        let cmd = format!("login {} {}\r\n", self.credentials.username, self.credentials.password);
        utils::send_cmd_and_get_reply(
            &mut self.writer,
            &mut self.reader,
            &cmd,
            ResponseType::LineStartingWith(REPLY_OK.into()),
            InvalidResponseTreatment::Fail
        ).map_err(|e| DeviceError::Handshake(format!("NETIO login failed: {}", e)))?;

        log::info!("logged in to NETIO as \"{}\"", self.credentials.username);
        Ok(())
    }

    fn send(&mut self, cmd: &str, on_invalid_resp: InvalidResponseTreatment) -> Result<String, DeviceError> {
        if !self.connected { return Err(DeviceError::NotConnected); }
        log::debug!("sending: {}", cmd.trim_end());
        let reply = utils::send_cmd_and_get_reply(
            &mut self.writer,
            &mut self.reader,
            cmd,
            ResponseType::LineStartingWith(REPLY_OK.into()),
            on_invalid_resp
        )?;
        log::debug!("received: {}", reply);
        Ok(reply)
    }

    pub fn socket_state(&self, index: usize) -> Option<SocketState> {
        self.states.get(index.wrapping_sub(1)).copied().flatten()
    }

    pub fn socket_name(&self, index: usize) -> Option<&str> {
        self.names.get(index.wrapping_sub(1)).map(|s| s.as_str())
    }

    fn update_texts(&mut self) {
        for (i, (name, state)) in self.names.iter().zip(self.states.iter()).enumerate() {
            let state = state.map(|s| s.to_string()).unwrap_or_else(|| crate::properties::NOT_AVAILABLE.to_string());
            self.texts.set(TextField::Socket(i + 1), format!("{}: {}", name, state));
        }
    }

    fn publish(&self) {
        let _ = self.sender.send(DriverToMainThreadMsg::Refresh(self.summary()));
    }

    pub fn get_status(&mut self) -> Result<(), DeviceError> {
        let reply = self.send("port list\r\n", InvalidResponseTreatment::Fail)?;
        for (slot, state) in self.states.iter_mut().zip(parse_port_list(&reply)?) {
            match state {
                Some(state) => *slot = Some(state),
                None => log::warn!("unrecognized socket state in \"{}\"", reply)
            }
        }
        log::info!("NETIO status: {}", reply);

        self.update_texts();
        self.publish();
        Ok(())
    }

    /// `index` starts at 1.
    pub fn switch(&mut self, index: usize, on: bool) -> Result<PropertyState, DeviceError> {
        if index < 1 || index > NUM_SOCKETS {
            return Err(DeviceError::InvalidCommand(format!("no socket {}", index)));
        }

        let reply = self.send(
            &format!("port {} {}\r\n", index, if on { 1 } else { 0 }),
            InvalidResponseTreatment::Ignore{ log_warning: true }
        )?;

        let acknowledged = reply.strip_prefix(REPLY_OK).map(|s| s.trim_start().starts_with("OK")).unwrap_or(false);
        let (state, result) = if acknowledged {
            (if on { SocketState::On } else { SocketState::Off }, PropertyState::Ok)
        } else {
            log::error!("switching socket {} failed: {}", index, reply);
            (SocketState::Alert, PropertyState::Alert)
        };
        self.states[index - 1] = Some(state);

        self.update_texts();
        self.publish();
        Ok(result)
    }
}

impl Driver for Netio {
    fn info(&self) -> String {
        format!("NETIO-4 on {}", self.connection_str)
    }

    fn handle_request(&mut self, request: &PropertyRequest) -> Result<PropertyState, DeviceError> {
        match request {
            PropertyRequest::Socket{ index, on } => self.switch(*index, *on),

            PropertyRequest::SocketName{ index, name } => {
                match self.names.get_mut(index.wrapping_sub(1)) {
                    Some(slot) => *slot = name.clone(),
                    None => return Err(DeviceError::InvalidCommand(format!("no socket {}", index)))
                }
                self.update_texts();
                Ok(PropertyState::Ok)
            },

            PropertyRequest::RefreshSockets => {
                self.get_status()?;
                Ok(PropertyState::Ok)
            },

            PropertyRequest::Login{ username, password } => {
                self.credentials = Credentials{ username: username.clone(), password: password.clone() };
                log::info!("credentials of \"{}\" will be used on next connection", username);
                Ok(PropertyState::Ok)
            },

            _ => Err(DeviceError::Unsupported(self.info()))
        }
    }

    fn timer_hit(&mut self) -> Result<(), DeviceError> {
        if !self.connected { return Ok(()); }
        self.get_status()
    }

    fn summary(&self) -> Vec<GroupSnapshot> {
        vec![self.texts.snapshot(PropertyGroup::Sockets)]
    }

    fn store_config(&self, config: &mut Configuration) {
        config.set_netio_credentials(&self.credentials);
        for (i, name) in self.names.iter().enumerate() {
            config.set_socket_name(i + 1, name);
        }
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        if !self.connected { return Ok(()); }
        self.connected = false;

        let result = utils::send_cmd_and_get_reply(
            &mut self.writer, &mut self.reader, "quit\r\n", ResponseType::None, InvalidResponseTreatment::Fail
        );
        log::info!("disconnected from NETIO");

        result.map(|_| ())
    }
}

impl Drop for Netio {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::warn!("error while disconnecting from NETIO: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::pdu::simulator::NetioSimulator;
    use crate::devices::DriverKind;

    fn connect(simulator: NetioSimulator, config: &Configuration) -> Result<Netio, DeviceError> {
        let (connection, _) = simulator.spawn();
        let device = DeviceConnection{ kind: DriverKind::Netio, connection, read_timeout: std::time::Duration::from_millis(100) };
        let (sender, _) = crossbeam::channel::unbounded();
        Netio::new(device, config, sender)
    }

    fn empty_config(dir: &tempfile::TempDir) -> Configuration {
        Configuration::from_file(&dir.path().join("tsilink.toml"))
    }

    #[test]
    fn given_port_list_parse_states() {
        assert_eq!(
            vec![Some(SocketState::Off), Some(SocketState::On), Some(SocketState::On), None],
            parse_port_list("250 011x").unwrap()
        );
        assert!(parse_port_list("250 01").is_err());
        assert!(parse_port_list("533 NOT LOGGED IN").is_err());
    }

    #[test]
    fn given_login_read_initial_status() {
        let dir = tempfile::tempdir().unwrap();
        let netio = connect(NetioSimulator::new("0110"), &empty_config(&dir)).unwrap();

        assert_eq!(Some(SocketState::Off), netio.socket_state(1));
        assert_eq!(Some(SocketState::On), netio.socket_state(2));
        assert_eq!("Socket 2: ON", netio.summary()[0].fields[1].1);
    }

    #[test]
    fn given_wrong_credentials_fail_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let result = connect(NetioSimulator::new("0000").with_credentials("user", "secret"), &empty_config(&dir));
        assert!(matches!(result, Err(DeviceError::Handshake(_))));
    }

    #[test]
    fn given_switch_request_update_socket() {
        let dir = tempfile::tempdir().unwrap();
        let mut netio = connect(NetioSimulator::new("0000"), &empty_config(&dir)).unwrap();

        assert_eq!(PropertyState::Ok, netio.handle_request(&PropertyRequest::Socket{ index: 3, on: true }).unwrap());
        assert_eq!(Some(SocketState::On), netio.socket_state(3));

        netio.handle_request(&PropertyRequest::RefreshSockets).unwrap();
        assert_eq!(Some(SocketState::On), netio.socket_state(3));
    }

    #[test]
    fn given_rejected_switch_report_alert() {
        let dir = tempfile::tempdir().unwrap();
        let mut netio = connect(NetioSimulator::new("0000").with_faulty_socket(2), &empty_config(&dir)).unwrap();

        assert_eq!(PropertyState::Alert, netio.switch(2, true).unwrap());
        assert_eq!(Some(SocketState::Alert), netio.socket_state(2));
    }

    #[test]
    fn given_socket_names_load_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = empty_config(&dir);
        config.set_socket_name(1, "Mount");
        let mut netio = connect(NetioSimulator::new("1000"), &config).unwrap();
        assert_eq!(Some("Mount"), netio.socket_name(1));

        netio.handle_request(&PropertyRequest::SocketName{ index: 4, name: "Camera".into() }).unwrap();
        let mut stored = empty_config(&dir);
        netio.store_config(&mut stored);
        assert_eq!(Some("Camera".to_string()), stored.socket_name(4));
        assert_eq!(Some("Mount".to_string()), stored.socket_name(1));
    }

    #[test]
    fn given_disconnected_refuse_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mut netio = connect(NetioSimulator::new("0000"), &empty_config(&dir)).unwrap();
        netio.disconnect().unwrap();
        assert!(matches!(netio.switch(1, true), Err(DeviceError::NotConnected)));
    }
}
