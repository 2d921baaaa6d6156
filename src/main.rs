//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Entry point of the `tsilink` executable: connects a driver and relays property requests from stdin.
//!

mod args;
mod config;
mod devices;
mod properties;
mod requests;
mod timer;

use config::Configuration;
use crossbeam::channel::Receiver;
use devices::{astelco::{protocol::DeviceAxis, simulator::Simulator}, pdu::simulator::NetioSimulator};
use devices::{camera_remote::simulator::WatecSimulator, transport::Connection};
use devices::{AnyDriver, DeviceConnection, Driver, DriverKind};
use properties::{DriverToMainThreadMsg, GroupSnapshot, PropertyGroup};
use requests::Request;
use std::collections::HashMap;
use std::error::Error;
use std::io::BufRead;
use std::str::FromStr;
use timer::PollingTimer;

pub const VERSION_STRING: &'static str = include_str!(concat!(env!("OUT_DIR"), "/version"));

const USAGE: &str = "usage: tsilink [--log] [--config <file>] [--driver focuser|dome|netio|watec] \
    [--tcp <host[:port]>] [--serial <device>] [--baud <rate>] [--simulate]";

fn main() {
    let args = match args::parse_command_line(std::env::args()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(1);
        }
    };

    if args.logging { set_up_logging(); }

    log::info!("tsilink ver. {} started", VERSION_STRING);

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn with_default_port(address: &str, kind: DriverKind) -> String {
    if address.contains(':') { address.to_string() } else { format!("{}:{}", address, kind.default_tcp_port()) }
}

/// Chooses the link from command-line options, falling back to the configuration.
fn select_connection(args: &args::Args, config: &mut Configuration, kind: DriverKind) -> Result<Connection, Box<dyn Error>> {
    if args.simulate {
        let connection = match kind {
            DriverKind::AstelcoFocuser => Simulator::new(DeviceAxis::Focus).spawn().0,
            DriverKind::AstelcoDome => Simulator::new(DeviceAxis::Dome).spawn().0,
            DriverKind::Netio => NetioSimulator::new("0110").spawn().0,
            DriverKind::WatecRemote => WatecSimulator::new().spawn().0
        };
        return Ok(connection);
    }

    if let Some(address) = &args.tcp_address {
        config.set_tcp_address(address);
        return Ok(Connection::TcpIp{ address: with_default_port(address, kind) });
    }

    if let Some(device) = &args.serial_device {
        let baud_rate = args.baud_rate.or_else(|| config.baud_rate()).unwrap_or(kind.default_baud_rate());
        config.set_serial_device(device);
        config.set_baud_rate(baud_rate);
        return Ok(Connection::Serial{ device: device.clone(), baud_rate });
    }

    if let Some(address) = config.tcp_address() {
        return Ok(Connection::TcpIp{ address: with_default_port(&address, kind) });
    }

    if let Some(device) = config.serial_device() {
        let baud_rate = args.baud_rate.or_else(|| config.baud_rate()).unwrap_or(kind.default_baud_rate());
        return Ok(Connection::Serial{ device, baud_rate });
    }

    Err(format!("no connection specified\n{}", USAGE).into())
}

fn run(args: args::Args) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config_file {
        Some(path) => Configuration::from_file(path),
        None => Configuration::new()
    };

    let driver_name = args.driver.clone().or_else(|| config.driver()).unwrap_or_else(|| DriverKind::AstelcoFocuser.to_string());
    let kind = DriverKind::from_str(&driver_name).map_err(|_| format!("unknown driver: {}", driver_name))?;
    config.set_driver(&kind.to_string());

    let connection = select_connection(&args, &mut config, kind)?;
    let read_timeout = config.read_timeout().unwrap_or(devices::astelco::DEFAULT_READ_TIMEOUT);

    let (driver_sender, driver_receiver) = crossbeam::channel::unbounded();
    let mut driver = devices::connect_to_device(DeviceConnection{ kind, connection, read_timeout }, &config, driver_sender)?;
    println!("Connected to {}.", driver.info());
    log::info!("connected to {}", driver.info());

    let (mut timer, ticks) = PollingTimer::start(config.polling_period().unwrap_or(timer::DEFAULT_POLLING_PERIOD));
    let requests = spawn_stdin_reader();

    main_loop(&mut driver, &ticks, &requests, &driver_receiver);

    timer.stop();
    if let Err(e) = driver.disconnect() {
        log::error!("error while disconnecting: {}", e);
    }

    driver.store_config(&mut config);
    if let Err(e) = config.store() {
        log::error!("failed to save configuration to {}: {}", config.file_path().display(), e);
    }

    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = crossbeam::channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => if sender.send(line).is_err() { break; },
                Err(e) => { log::error!("error reading standard input: {}", e); break; }
            }
        }
    });
    receiver
}

/// Prints only the groups which changed since they were last printed.
fn print_changed(snapshots: Vec<GroupSnapshot>, last_printed: &mut HashMap<PropertyGroup, GroupSnapshot>) {
    for snapshot in snapshots {
        if last_printed.get(&snapshot.group) != Some(&snapshot) {
            println!("{}", snapshot);
            last_printed.insert(snapshot.group, snapshot);
        }
    }
}

fn main_loop(
    driver: &mut AnyDriver,
    ticks: &Receiver<std::time::Instant>,
    requests: &Receiver<String>,
    driver_messages: &Receiver<DriverToMainThreadMsg>
) {
    let mut last_printed = HashMap::new();

    loop {
        crossbeam::select! {
            recv(ticks) -> _ => if let Err(e) = driver.timer_hit() {
                log::error!("polling failed: {}", e);
            },

            recv(requests) -> line => {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break
                };
                if line.trim().is_empty() { continue; }

                match requests::parse_request(&line) {
                    Ok(Request::Quit) => break,

                    Ok(Request::Summary) => for snapshot in driver.summary() { println!("{}", snapshot); },

                    Ok(Request::Property(request)) => match driver.handle_request(&request) {
                        Ok(state) => println!("{}", state),
                        Err(e) => {
                            log::error!("request {:?} failed: {}", request, e);
                            println!("{}: {}", properties::PropertyState::Alert, e);
                        }
                    },

                    Err(e) => println!("{}", e)
                }
            },

            recv(driver_messages) -> msg => match msg {
                Ok(DriverToMainThreadMsg::Refresh(snapshots)) => print_changed(snapshots, &mut last_printed),
                Ok(DriverToMainThreadMsg::Warning(text)) => println!("WARNING: {}", text),
                Ok(DriverToMainThreadMsg::ConnectionLost) | Err(_) => {
                    println!("Connection lost.");
                    break;
                }
            }
        }
    }
}

fn set_up_logging() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("{}\n\n{}", info, backtrace);
    }));

    let tz_offset = chrono::Local::now().offset().clone();
    let logfile = dirs::data_dir().unwrap_or(std::path::Path::new("").to_path_buf())
        .join(format!("tsilink_{}.log", chrono::Local::now().format("%Y-%m-%d_%H%M%S")));

    let file = match std::fs::File::create(&logfile) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot create log file {}: {}", logfile.to_string_lossy(), e);
            return;
        }
    };
    let time_offset = time::UtcOffset::from_whole_seconds(tz_offset.local_minus_utc()).unwrap_or(time::UtcOffset::UTC);

    println!("Logging to: {}", logfile.to_string_lossy());
    if simplelog::WriteLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::ConfigBuilder::new()
            .set_target_level(simplelog::LevelFilter::Error)
            .set_time_offset(time_offset)
            .set_time_format_custom(simplelog::format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]"
            ))
            .build(),
        file
    ).is_err() {
        eprintln!("Logger already initialized.");
    }
}
