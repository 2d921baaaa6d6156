//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Simulated OpenTSI controller.
//!

use crate::devices::astelco::protocol::{self, path, DeviceAxis, StatusField};
use crate::devices::loopback;
use crate::devices::transport::Connection;
use crate::devices::utils::LineReader;
use std::collections::HashMap;
use std::io::Write;

const BANNER: &str = "TPL2 2.3 CONN 1";

const GREETING: [&str; 3] = [
    "AUTH PLAIN \"username\" \"password\"",
    "AUTH ENCRYPTED",
    "AUTH REQUIRED"
];

pub struct Simulator {
    axis: DeviceAxis,
    /// If set, only these credentials are accepted.
    credentials: Option<(String, String)>,
    greeting_lines: usize,
    powered: bool,
    /// Number of data requests left unanswered (for timeout tests).
    silent: usize
}

impl Simulator {
    pub fn new(axis: DeviceAxis) -> Simulator {
        Simulator{ axis, credentials: None, greeting_lines: GREETING.len(), powered: true, silent: 0 }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Simulator {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn with_greeting_lines(mut self, num: usize) -> Simulator {
        self.greeting_lines = num.min(GREETING.len());
        self
    }

    pub fn powered(mut self, powered: bool) -> Simulator {
        self.powered = powered;
        self
    }

    pub fn ignoring_requests(mut self, num: usize) -> Simulator {
        self.silent = num;
        self
    }

    fn initial_values(&self) -> HashMap<String, String> {
        let (min, max) = match self.axis {
            DeviceAxis::Dome => (0.0, 360.0),
            DeviceAxis::Focus => (0.0, 50.0)
        };
        let ready = if self.powered { "1.0" } else { "0.0" };

        let mut values = HashMap::new();
        values.insert(path::SERVER_UPTIME.to_string(), "1234".to_string());
        values.insert(path::TELESCOPE_READY_STATE.to_string(), ready.to_string());
        values.insert(path::real_pos_min(self.axis), format!("{:.6}", min));
        values.insert(path::real_pos_max(self.axis), format!("{:.6}", max));
        let mut set = |field, value: &str| { values.insert(path::status(self.axis, field), value.to_string()); };
        set(StatusField::PowerState, ready);
        set(StatusField::RealPosition, "10.000000");
        set(StatusField::LimitState, "0");
        set(StatusField::MotionState, "0");
        set(StatusField::TargetPosition, "10.000000");
        set(StatusField::Offset, "0.000000");
        set(StatusField::TargetDistance, "0.000000");

        values
    }

    /// Starts the simulator thread; returns the connection for the driver side.
    pub fn spawn(self) -> (Connection, std::thread::JoinHandle<()>) {
        let (host_end, device_end) = loopback::pair();
        let thread = std::thread::spawn(move || self.run(device_end));
        (Connection::Loopback(host_end), thread)
    }

    fn run(mut self, port: loopback::LoopbackPort) {
        let mut values = self.initial_values();
        let mut writer = port.clone();
        let mut reader = LineReader::new(port);

        loop {
            let line = match reader.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(_) => break
            };

            let replies = if line.is_empty() {
                let mut replies = vec![BANNER.to_string()];
                replies.extend(GREETING.iter().take(self.greeting_lines).map(|s| s.to_string()));
                replies
            } else if line == protocol::DISCONNECT {
                log::info!("simulator: disconnect");
                break;
            } else if line.starts_with("AUTH PLAIN") {
                vec![self.login_reply(&line)]
            } else {
                self.command_reply(&line, &mut values)
            };

            for reply in replies {
                if writer.write_all(format!("{}\r\n", reply).as_bytes()).is_err() { return; }
            }
        }
    }

    fn login_reply(&self, line: &str) -> String {
        let quoted: Vec<&str> = line.split('"').skip(1).step_by(2).collect();
        let granted = match &self.credentials {
            None => true,
            Some((username, password)) => quoted.len() == 2 && quoted[0] == username && quoted[1] == password
        };

        if granted { "AUTH OK 2 2".into() } else { "AUTH ERROR 0 0".into() }
    }

    fn command_reply(&mut self, line: &str, values: &mut HashMap<String, String>) -> Vec<String> {
        let mut tokens = line.splitn(3, ' ');
        let (id, verb, argument) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(id), Some(verb), Some(argument)) => (id, verb, argument),
            _ => return vec![format!("0 ERROR SYNTAX \"{}\"", line)]
        };

        match verb {
            "GET" => match values.get(argument) {
                Some(value) => {
                    if self.silent > 0 {
                        self.silent -= 1;
                        return vec![format!("{} COMMAND OK", id)];
                    }
                    vec![
                        format!("{} COMMAND OK", id),
                        format!("{} DATA INLINE {}={}", id, argument, value),
                        format!("{} COMMAND COMPLETE", id)
                    ]
                },
                None => vec![format!("{} COMMAND FAILED", id)]
            },

            "SET" => {
                let (key, value) = match argument.split_once('=') {
                    Some(kv) => kv,
                    None => return vec![format!("{} COMMAND FAILED", id)]
                };
                if self.apply_set(key, value, values) {
                    vec![format!("{} COMMAND OK", id), format!("{} COMMAND COMPLETE", id)]
                } else {
                    vec![format!("{} COMMAND FAILED", id)]
                }
            },

            _ => vec![format!("0 ERROR SYNTAX \"{}\"", line)]
        }
    }

    fn apply_set(&self, key: &str, value: &str, values: &mut HashMap<String, String>) -> bool {
        let number = match value.parse::<f64>() {
            Ok(number) => number,
            Err(_) => return false
        };
        let status = |field| path::status(self.axis, field);

        if key == path::TELESCOPE_READY {
            let state = if number >= 1.0 { "1.0" } else { "0.0" };
            values.insert(path::TELESCOPE_READY_STATE.to_string(), state.to_string());
            values.insert(status(StatusField::PowerState), state.to_string());
        } else if key == status(StatusField::TargetPosition) {
            // moves are instantaneous
            values.insert(status(StatusField::TargetPosition), format!("{:.6}", number));
            values.insert(status(StatusField::RealPosition), format!("{:.6}", number));
        } else if key == status(StatusField::Offset) {
            values.insert(status(StatusField::Offset), format!("{:.6}", number));
        } else {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::utils::{self, InvalidResponseTreatment, ResponseType};
    use crate::devices::transport::Transport;

    fn open(simulator: Simulator) -> (Transport, LineReader<Transport>) {
        let (connection, _) = simulator.spawn();
        let writer = Transport::open(&connection, std::time::Duration::from_millis(500)).unwrap();
        let reader = LineReader::new(writer.try_clone().unwrap());
        (writer, reader)
    }

    fn exchange(writer: &mut Transport, reader: &mut LineReader<Transport>, cmd: &str) -> String {
        utils::send_cmd_and_get_reply(writer, reader, cmd, ResponseType::Line, InvalidResponseTreatment::Fail).unwrap()
    }

    #[test]
    fn given_empty_line_send_banner_and_greeting() {
        let (mut writer, mut reader) = open(Simulator::new(DeviceAxis::Focus).with_greeting_lines(1));
        assert_eq!(BANNER, exchange(&mut writer, &mut reader, "\r\n"));
        assert_eq!(Some(GREETING[0].to_string()), reader.read_line().unwrap());
    }

    #[test]
    fn given_wrong_credentials_reject_login() {
        let (mut writer, mut reader) = open(Simulator::new(DeviceAxis::Focus).with_credentials("admin", "admin"));
        assert_eq!("AUTH ERROR 0 0", exchange(&mut writer, &mut reader, "AUTH PLAIN \"admin\" \"x\"\r\n"));
        assert_eq!("AUTH OK 2 2", exchange(&mut writer, &mut reader, "AUTH PLAIN \"admin\" \"admin\"\r\n"));
    }

    #[test]
    fn given_set_target_move_axis() {
        let (mut writer, mut reader) = open(Simulator::new(DeviceAxis::Focus));
        assert_eq!("1 COMMAND OK", exchange(&mut writer, &mut reader, "1 SET POSITION.INSTRUMENTAL.FOCUS.TARGETPOS=3.500000\r\n"));
        assert_eq!(Some("1 COMMAND COMPLETE".to_string()), reader.read_line().unwrap());

        exchange(&mut writer, &mut reader, "2 GET POSITION.INSTRUMENTAL.FOCUS.REALPOS\r\n");
        assert_eq!(
            Some("2 DATA INLINE POSITION.INSTRUMENTAL.FOCUS.REALPOS=3.500000".to_string()),
            reader.read_line().unwrap()
        );
    }

    #[test]
    fn given_unknown_path_fail_command() {
        let (mut writer, mut reader) = open(Simulator::new(DeviceAxis::Dome));
        assert_eq!("5 COMMAND FAILED", exchange(&mut writer, &mut reader, "5 GET POINTING.TRACK\r\n"));
    }
}
