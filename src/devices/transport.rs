//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Byte transports (serial port, TCP, in-memory loopback).
//!

use crate::devices::{loopback::LoopbackPort, DeviceError};
use std::io::{Read, Write};

pub const DEFAULT_BAUD_RATE: u32 = 9600;

#[derive(Clone, Debug)]
pub enum Connection {
    Serial{ device: String, baud_rate: u32 },
    /// `address` is "host:port".
    TcpIp{ address: String },
    Loopback(LoopbackPort)
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Serial{ device, baud_rate } => write!(f, "{} ({} baud)", device, baud_rate),
            Connection::TcpIp{ address } => write!(f, "{}", address),
            Connection::Loopback(_) => write!(f, "simulator")
        }
    }
}

/// An open link. Both directions share one descriptor; `try_clone` gives an independent handle
/// to the same descriptor so that reading and writing can happen on different threads.
pub enum Transport {
    Serial(Box<dyn serialport::SerialPort>),
    TcpIp(std::net::TcpStream),
    Loopback(LoopbackPort)
}

impl Transport {
    /// Opens the link; reads on the returned transport fail with `TimedOut`/`WouldBlock`
    /// if nothing arrives within `read_timeout`.
    pub fn open(connection: &Connection, read_timeout: std::time::Duration) -> Result<Transport, DeviceError> {
        match connection {
            Connection::Serial{ device, baud_rate } => {
                Ok(Transport::Serial(serialport::new(device, *baud_rate)
                    .data_bits(serialport::DataBits::Eight)
                    .flow_control(serialport::FlowControl::None)
                    .parity(serialport::Parity::None)
                    .stop_bits(serialport::StopBits::One)
                    .timeout(read_timeout)
                    .open()?))
            },

            Connection::TcpIp{ address } => {
                let stream = std::net::TcpStream::connect(address.as_str())?;
                stream.set_read_timeout(Some(read_timeout))?;
                stream.set_nodelay(true)?;
                Ok(Transport::TcpIp(stream))
            },

            Connection::Loopback(port) => {
                let mut port = port.clone();
                port.set_timeout(read_timeout);
                Ok(Transport::Loopback(port))
            }
        }
    }

    pub fn try_clone(&self) -> Result<Transport, DeviceError> {
        Ok(match self {
            Transport::Serial(port) => Transport::Serial(port.try_clone()?),
            Transport::TcpIp(stream) => Transport::TcpIp(stream.try_clone()?),
            Transport::Loopback(port) => Transport::Loopback(port.clone())
        })
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Transport::Serial(io) => io.read(buf),
            Transport::TcpIp(io) => io.read(buf),
            Transport::Loopback(io) => io.read(buf)
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Transport::Serial(io) => io.write(buf),
            Transport::TcpIp(io) => io.write(buf),
            Transport::Loopback(io) => io.write(buf)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Serial(io) => io.flush(),
            Transport::TcpIp(io) => io.flush(),
            Transport::Loopback(io) => io.flush()
        }
    }
}

/// Returns true for the error kinds a read with a timeout reports when nothing arrived.
pub fn is_timeout(error: &std::io::Error) -> bool {
    matches!(error.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
}
