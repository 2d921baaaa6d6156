//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! OpenTSI line protocol: commands, response lines, login.
//!
//! Outbound:  `<id> GET <PATH>` or `<id> SET <PATH>=<value>`.
//! Inbound:   `<id> ... <KEY>=<VALUE>` (data), `<id> <text>` (events), lines without an id (warnings).
//!

use crate::devices::DeviceError;
use std::sync::atomic::{AtomicU32, Ordering};

pub const DISCONNECT: &str = "DISCONNECT";

/// Shortest plausible greeting banner (e.g. "TPL2 ...").
pub const MIN_BANNER_LEN: usize = 5;

/// Sub-device addressed by a command.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum DeviceAxis {
    #[strum(serialize = "DOME[0]")]
    Dome,
    #[strum(serialize = "FOCUS")]
    Focus
}

/// Attribute of an axis kept in the axis state table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PositionKind {
    Real,
    Min,
    Max,
    Target,
    Offset
}

/// Status values polled for an axis; `Display` gives the OpenTSI variable name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum StatusField {
    #[strum(serialize = "POWER_STATE")]
    PowerState,
    #[strum(serialize = "REALPOS")]
    RealPosition,
    #[strum(serialize = "LIMIT_STATE")]
    LimitState,
    #[strum(serialize = "MOTION_STATE")]
    MotionState,
    #[strum(serialize = "TARGETPOS")]
    TargetPosition,
    #[strum(serialize = "OFFSET")]
    Offset,
    #[strum(serialize = "TARGETDISTANCE")]
    TargetDistance
}

impl StatusField {
    /// Name of the host text field showing this value.
    pub fn property_name(&self) -> &'static str {
        match self {
            StatusField::PowerState => "POWER_STATE",
            StatusField::RealPosition => "REAL_POSITION",
            StatusField::LimitState => "LIMIT_STATE",
            StatusField::MotionState => "MOTION_STATE",
            StatusField::TargetPosition => "TARGET_POSITION",
            StatusField::Offset => "OFFSET",
            StatusField::TargetDistance => "TARGET_DISTANCE"
        }
    }
}

pub mod path {
    use super::{DeviceAxis, StatusField};

    pub const SERVER_UPTIME: &str = "SERVER.UPTIME";
    pub const TELESCOPE_READY: &str = "TELESCOPE.READY";
    pub const TELESCOPE_READY_STATE: &str = "TELESCOPE.READY_STATE";

    pub fn status(axis: DeviceAxis, field: StatusField) -> String {
        format!("POSITION.INSTRUMENTAL.{}.{}", axis, field)
    }

    pub fn real_pos_min(axis: DeviceAxis) -> String {
        format!("{}!MIN", status(axis, StatusField::RealPosition))
    }

    pub fn real_pos_max(axis: DeviceAxis) -> String {
        format!("{}!MAX", status(axis, StatusField::RealPosition))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Verb {
    #[strum(serialize = "GET")]
    Get,
    #[strum(serialize = "SET")]
    Set
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64)
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{}", value),
            Value::Real(value) => write!(f, "{:.6}", value)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    id: u32,
    verb: Verb,
    path: String,
    value: Option<Value>
}

impl Command {
    pub fn new(id: u32, verb: Verb, path: &str, value: Option<Value>) -> Result<Command, DeviceError> {
        if path.is_empty() || path.chars().any(|c| c.is_whitespace() || c == '=') {
            return Err(DeviceError::InvalidCommand(format!("malformed property path \"{}\"", path)));
        }

        if let Some(Value::Real(number)) = value {
            if !number.is_finite() {
                return Err(DeviceError::InvalidCommand(format!("SET {} with non-finite value {}", path, number)));
            }
        }

        match (verb, &value) {
            (Verb::Set, None) => Err(DeviceError::InvalidCommand(format!("SET {} requires a value", path))),
            (Verb::Get, Some(_)) => Err(DeviceError::InvalidCommand(format!("GET {} cannot carry a value", path))),
            _ => Ok(Command{ id, verb, path: path.to_string(), value })
        }
    }

    pub fn id(&self) -> u32 { self.id }

    /// Wire line without the terminator.
    pub fn to_line(&self) -> String {
        match &self.value {
            Some(value) => format!("{} {} {}={}", self.id, self.verb, self.path, value),
            None => format!("{} {} {}", self.id, self.verb, self.path)
        }
    }
}

/// Hands out command ids: monotonic, wrapping, never 0 (a response id of 0 marks a warning line).
pub struct IdAllocator {
    next: AtomicU32
}

impl IdAllocator {
    pub fn new() -> IdAllocator {
        IdAllocator{ next: AtomicU32::new(1) }
    }

    pub fn allocate(&self) -> u32 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 { return id; }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub id: u32,
    pub key: String,
    pub value: String
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParseFailure {
    /// Line without a valid id; contains the text after the zero id, or the whole line if it has no digits.
    Warning(String),
    /// Numbered line without a `KEY=VALUE` payload (e.g. "5 COMMAND COMPLETE").
    NoValue{ id: u32, text: String }
}

/// Value of the leading decimal digits of `s` (0 if there are none).
fn leading_number(s: &str) -> u32 {
    s.bytes()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u32, |acc, b| acc.wrapping_mul(10).wrapping_add((b - b'0') as u32))
}

pub fn parse_response_line(line: &str) -> Result<Response, ParseFailure> {
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    let start = match line.find(|c: char| c.is_ascii_digit()) {
        Some(start) => start,
        None => return Err(ParseFailure::Warning(line.trim().to_string()))
    };
    let line = &line[start..];

    let (id_token, rest) = match line.find(' ') {
        Some(pos) => (&line[..pos], &line[pos + 1..]),
        None => (line, "")
    };

    let id = leading_number(id_token);
    if id == 0 {
        return Err(ParseFailure::Warning(rest.to_string()));
    }

    match rest.find('=') {
        Some(pos) if pos + 1 < rest.len() => {
            let key = rest[..pos].split_whitespace().last().unwrap_or("").to_string();
            Ok(Response{ id, key, value: rest[pos + 1..].to_string() })
        },

        _ => Err(ParseFailure::NoValue{ id, text: rest.to_string() })
    }
}

/// Returns true if an event line reports that the command has finished (successfully or not).
pub fn is_completion_event(text: &str) -> bool {
    text.contains("COMPLETE") || text.contains("FAILED")
}

pub fn auth_line(username: &str, password: &str) -> String {
    format!("AUTH PLAIN \"{}\" \"{}\"", username, password)
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoginAck {
    pub status: String,
    pub read_level: i32,
    pub write_level: i32
}

impl LoginAck {
    /// Parses `<echo> <STATUS> <READRULES> <WRITERULES>`.
    pub fn parse(line: &str) -> Result<LoginAck, DeviceError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(DeviceError::InvalidResponse(format!("malformed login reply \"{}\"", line)));
        }

        let level = |s: &str| s.parse::<i32>().unwrap_or(0);

        // fields[0] echoes the command
        Ok(LoginAck{
            status: fields[1].to_string(),
            read_level: level(fields[2]),
            write_level: level(fields[3])
        })
    }

    pub fn is_granted(&self) -> bool {
        self.status.starts_with('O') || self.status.chars().nth(1) == Some('K')
    }
}
