//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Simulated Watec camera remote.
//!

use crate::devices::loopback;
use crate::devices::transport::Connection;
use crate::devices::utils::LineReader;
use std::io::Write;

fn is_known(command: &str) -> bool {
    match command {
        "START" | "STOP" | "MON" | "MOF" => true,
        _ => {
            let mut chars = command.chars();
            match chars.next() {
                Some('E') => chars.next() == Some('1')
                    && chars.next().map_or(false, |c| c.is_ascii_hexdigit())
                    && chars.next().is_none(),
                Some('G') => {
                    let digits = chars.as_str();
                    !digits.is_empty() && digits.len() <= 2 && digits.bytes().all(|b| b.is_ascii_digit())
                },
                _ => false
            }
        }
    }
}

pub struct WatecSimulator {
    /// Commands left unanswered.
    ignored: Vec<String>
}

impl WatecSimulator {
    pub fn new() -> WatecSimulator {
        WatecSimulator{ ignored: vec![] }
    }

    pub fn ignoring(mut self, command: &str) -> WatecSimulator {
        self.ignored.push(command.into());
        self
    }

    /// The returned thread yields all received commands once the link closes or "STOP" arrives.
    pub fn spawn(self) -> (Connection, std::thread::JoinHandle<Vec<String>>) {
        let (host_end, device_end) = loopback::pair();
        let thread = std::thread::spawn(move || self.run(device_end));
        (Connection::Loopback(host_end), thread)
    }

    fn run(self, port: loopback::LoopbackPort) -> Vec<String> {
        let mut writer = port.clone();
        let mut reader = LineReader::with_delimiter(port, b'#');
        let mut received = vec![];

        loop {
            let command = match reader.read_line() {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(_) => break
            };
            received.push(command.clone());

            if !is_known(&command) {
                log::warn!("simulator: unknown command \"{}\"", command);
                continue;
            }
            if self.ignored.contains(&command) { continue; }

            if writer.write_all(format!("{}#", command).as_bytes()).is_err() { break; }
            if command == "STOP" { break; }
        }

        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_command_syntax_recognize() {
        assert!(is_known("E1F"));
        assert!(is_known("G7"));
        assert!(is_known("G99"));
        assert!(!is_known("E2F"));
        assert!(!is_known("G100"));
        assert!(!is_known("MIRROR"));
    }
}
