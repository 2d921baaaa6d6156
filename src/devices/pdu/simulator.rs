//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Simulated NETIO-4 telnet interface.
//!

use crate::devices::loopback;
use crate::devices::transport::Connection;
use crate::devices::utils::LineReader;
use crate::properties::NUM_SOCKETS;
use std::io::Write;

fn reply(writer: &mut loopback::LoopbackPort, text: &str) -> bool {
    writer.write_all(format!("{}\r\n", text).as_bytes()).is_ok()
}

pub struct NetioSimulator {
    sockets: Vec<bool>,
    credentials: Option<(String, String)>,
    /// Socket (starting at 1) which refuses to switch.
    faulty_socket: Option<usize>
}

impl NetioSimulator {
    /// `initial` lists socket states as in the "port list" reply, e.g. "0110".
    pub fn new(initial: &str) -> NetioSimulator {
        let mut sockets: Vec<bool> = initial.chars().map(|c| c == '1').collect();
        sockets.resize(NUM_SOCKETS, false);
        NetioSimulator{ sockets, credentials: None, faulty_socket: None }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> NetioSimulator {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn with_faulty_socket(mut self, index: usize) -> NetioSimulator {
        self.faulty_socket = Some(index);
        self
    }

    pub fn spawn(self) -> (Connection, std::thread::JoinHandle<()>) {
        let (host_end, device_end) = loopback::pair();
        let thread = std::thread::spawn(move || self.run(device_end));
        (Connection::Loopback(host_end), thread)
    }

    fn run(mut self, port: loopback::LoopbackPort) {
        let mut writer = port.clone();
        let mut reader = LineReader::new(port);
        let mut logged_in = false;

        if !reply(&mut writer, "100 HELLO 00000000 - KSHELL V1.5") { return; }

        loop {
            let line = match reader.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(_) => break
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();

            let text = match tokens.as_slice() {
                ["quit"] => { reply(&mut writer, "110 BYE"); break; },

                ["login", username, password] => {
                    logged_in = match &self.credentials {
                        None => true,
                        Some((u, p)) => u == username && p == password
                    };
                    if logged_in { "250 OK".to_string() } else { "502 UNKNOWN USER".to_string() }
                },

                _ if !logged_in => "533 NOT LOGGED IN".to_string(),

                ["port", "list"] => format!("250 {}", self.sockets.iter().map(|on| if *on { '1' } else { '0' }).collect::<String>()),

                ["port", index, value] => match (index.parse::<usize>(), *value) {
                    (Ok(index), "0") | (Ok(index), "1") if index >= 1 && index <= NUM_SOCKETS => {
                        if self.faulty_socket == Some(index) {
                            "551 INVALID SOCKET STATE".to_string()
                        } else {
                            self.sockets[index - 1] = *value == "1";
                            "250 OK".to_string()
                        }
                    },
                    _ => "501 INVALID PARAMETR".to_string()
                },

                _ => "502 UNKNOWN COMMAND".to_string()
            };

            if !reply(&mut writer, &text) { break; }
        }
    }
}
