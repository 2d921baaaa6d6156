//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Command-line argument parsing.
//!

mod cmdline {
    pub const ENABLE_LOGGING: &str = "log";
    pub const CONFIG_FILE: &str = "config";
    pub const DRIVER: &str = "driver";
    pub const TCP_ADDRESS: &str = "tcp";
    pub const SERIAL_DEVICE: &str = "serial";
    pub const BAUD_RATE: &str = "baud";
    pub const SIMULATE: &str = "simulate";
}

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub logging: bool,
    pub config_file: Option<std::path::PathBuf>,
    pub driver: Option<String>,
    /// "host:port"; the port may be omitted.
    pub tcp_address: Option<String>,
    pub serial_device: Option<String>,
    pub baud_rate: Option<u32>,
    pub simulate: bool
}

/// Options which take no value.
const FLAGS: [&str; 2] = [cmdline::ENABLE_LOGGING, cmdline::SIMULATE];

pub fn parse_command_line<I: Iterator<Item=String>>(stream: I) -> Result<Args, String> {
    let allowed_options = [
        cmdline::ENABLE_LOGGING,
        cmdline::CONFIG_FILE,
        cmdline::DRIVER,
        cmdline::TCP_ADDRESS,
        cmdline::SERIAL_DEVICE,
        cmdline::BAUD_RATE,
        cmdline::SIMULATE
    ];

    // key: option name
    let mut option_values = std::collections::HashMap::<String, Vec<String>>::new();

    let mut current: Option<String> = None;

    for arg in stream.skip(1) /*skip the binary name*/ {
        if let Some(name) = arg.strip_prefix("--") {
            if !allowed_options.contains(&name) {
                return Err(format!("unknown command-line option: {}", name));
            }
            option_values.entry(name.to_string()).or_default();
            current = if FLAGS.contains(&name) { None } else { Some(name.to_string()) };
        } else {
            match current.take() {
                Some(option) => option_values.entry(option).or_default().push(arg),
                None => return Err(format!("unexpected value: {}", arg))
            }
        }
    }

    let single = |name: &str| -> Result<Option<String>, String> {
        match option_values.get(name).map(|values| values.as_slice()) {
            None => Ok(None),
            Some([value]) => Ok(Some(value.clone())),
            Some(_) => Err(format!("option --{} requires one value", name))
        }
    };

    let baud_rate = match single(cmdline::BAUD_RATE)? {
        Some(s) => Some(s.parse::<u32>().map_err(|_| format!("invalid baud rate: {}", s))?),
        None => None
    };

    Ok(Args{
        logging: option_values.contains_key(cmdline::ENABLE_LOGGING),
        config_file: single(cmdline::CONFIG_FILE)?.map(std::path::PathBuf::from),
        driver: single(cmdline::DRIVER)?,
        tcp_address: single(cmdline::TCP_ADDRESS)?,
        serial_device: single(cmdline::SERIAL_DEVICE)?,
        baud_rate,
        simulate: option_values.contains_key(cmdline::SIMULATE)
    })
}
