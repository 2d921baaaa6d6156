//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Property-change requests entered by the user.
//!

use crate::devices::camera_remote::{ExposurePreset, GainPreset, GainStep};

/// Fixed nudge deltas offered for the focuser (mm).
pub const NUDGE_STEPS: [f64; 6] = [0.5, -0.5, 0.1, -0.1, 0.05, -0.05];

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NudgeStep(f64);

impl NudgeStep {
    pub fn new(delta: f64) -> Option<NudgeStep> {
        NUDGE_STEPS.iter().find(|step| (**step - delta).abs() < 1.0e-9).map(|step| NudgeStep(*step))
    }

    pub fn delta(&self) -> f64 { self.0 }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerSwitch {
    On,
    Off,
    GetState
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyRequest {
    GotoTarget(f64),
    SetOffset(f64),
    Nudge(NudgeStep),
    NudgeOffset(NudgeStep),
    /// Relative to the current real position.
    MoveRelative(f64),
    MoveOffsetRelative(f64),
    Power(PowerSwitch),
    Login{ username: String, password: String },
    Park,
    Unpark,
    SetCurrentPark,
    SetDefaultPark,
    /// Socket number starting at 1.
    Socket{ index: usize, on: bool },
    SocketName{ index: usize, name: String },
    RefreshSockets,
    Mirror(bool),
    Exposure(ExposurePreset),
    /// Gain preset in %.
    Gain(GainPreset),
    GainIncrement(GainStep)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Property(PropertyRequest),
    Summary,
    Quit
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("unknown request \"{0}\"")]
    Unknown(String),

    #[error("{request}: missing argument")]
    MissingArgument{ request: String },

    #[error("{request}: invalid argument \"{argument}\"")]
    InvalidArgument{ request: String, argument: String }
}

fn argument<'a, I: Iterator<Item = &'a str>>(request: &str, tokens: &mut I) -> Result<&'a str, RequestError> {
    tokens.next().ok_or_else(|| RequestError::MissingArgument{ request: request.into() })
}

fn parse_arg<'a, T: std::str::FromStr, I: Iterator<Item = &'a str>>(request: &str, tokens: &mut I) -> Result<T, RequestError> {
    let arg = argument(request, tokens)?;
    arg.parse::<T>().map_err(|_| RequestError::InvalidArgument{ request: request.into(), argument: arg.into() })
}

/// Positions and offsets; "nan" and "inf" are refused.
fn parse_real<'a, I: Iterator<Item = &'a str>>(request: &str, tokens: &mut I) -> Result<f64, RequestError> {
    let arg = argument(request, tokens)?;
    match arg.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RequestError::InvalidArgument{ request: request.into(), argument: arg.into() })
    }
}

fn parse_nudge<'a, I: Iterator<Item = &'a str>>(request: &str, tokens: &mut I) -> Result<NudgeStep, RequestError> {
    let arg = argument(request, tokens)?;
    arg.parse::<f64>().ok()
        .and_then(NudgeStep::new)
        .ok_or_else(|| RequestError::InvalidArgument{ request: request.into(), argument: arg.into() })
}

fn parse_on_off<'a, I: Iterator<Item = &'a str>>(request: &str, tokens: &mut I) -> Result<bool, RequestError> {
    match argument(request, tokens)? {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(RequestError::InvalidArgument{ request: request.into(), argument: other.into() })
    }
}

fn parse_socket<'a, I: Iterator<Item = &'a str>>(request: &str, tokens: &mut I) -> Result<usize, RequestError> {
    let arg = argument(request, tokens)?;
    match arg.parse::<usize>() {
        Ok(index) if index >= 1 && index <= crate::properties::NUM_SOCKETS => Ok(index),
        _ => Err(RequestError::InvalidArgument{ request: request.into(), argument: arg.into() })
    }
}

/// Parses one line of user input, e.g. "goto 12.5" or "socket 2 on".
pub fn parse_request(line: &str) -> Result<Request, RequestError> {
    let mut tokens = line.split_whitespace();
    let name = match tokens.next() {
        Some(name) => name,
        None => return Err(RequestError::Unknown(String::new()))
    };

    let property = |request| Ok(Request::Property(request));

    match name {
        "goto" => property(PropertyRequest::GotoTarget(parse_real(name, &mut tokens)?)),
        "offset" => property(PropertyRequest::SetOffset(parse_real(name, &mut tokens)?)),
        "nudge" => property(PropertyRequest::Nudge(parse_nudge(name, &mut tokens)?)),
        "nudge-offset" => property(PropertyRequest::NudgeOffset(parse_nudge(name, &mut tokens)?)),
        "move" => property(PropertyRequest::MoveRelative(parse_real(name, &mut tokens)?)),
        "move-offset" => property(PropertyRequest::MoveOffsetRelative(parse_real(name, &mut tokens)?)),
        "on" => property(PropertyRequest::Power(PowerSwitch::On)),
        "off" => property(PropertyRequest::Power(PowerSwitch::Off)),
        "state" => property(PropertyRequest::Power(PowerSwitch::GetState)),

        "login" => {
            let username = argument(name, &mut tokens)?.to_string();
            let password = argument(name, &mut tokens)?.to_string();
            property(PropertyRequest::Login{ username, password })
        },

        "park" => property(PropertyRequest::Park),
        "unpark" => property(PropertyRequest::Unpark),
        "set-park" => property(PropertyRequest::SetCurrentPark),
        "default-park" => property(PropertyRequest::SetDefaultPark),

        "socket" => {
            let index = parse_socket(name, &mut tokens)?;
            let on = parse_on_off(name, &mut tokens)?;
            property(PropertyRequest::Socket{ index, on })
        },

        "socket-name" => {
            let index = parse_socket(name, &mut tokens)?;
            let words: Vec<&str> = tokens.collect();
            if words.is_empty() { return Err(RequestError::MissingArgument{ request: name.into() }); }
            property(PropertyRequest::SocketName{ index, name: words.join(" ") })
        },

        "sockets" => property(PropertyRequest::RefreshSockets),
        "mirror" => property(PropertyRequest::Mirror(parse_on_off(name, &mut tokens)?)),

        "exposure" => {
            let code = argument(name, &mut tokens)?;
            let exposure = ExposurePreset::from_code(code)
                .ok_or_else(|| RequestError::InvalidArgument{ request: name.into(), argument: code.into() })?;
            property(PropertyRequest::Exposure(exposure))
        },

        "gain" => {
            let percent: u32 = parse_arg(name, &mut tokens)?;
            let preset = GainPreset::new(percent)
                .ok_or_else(|| RequestError::InvalidArgument{ request: name.into(), argument: percent.to_string() })?;
            property(PropertyRequest::Gain(preset))
        },

        "gain-add" => {
            let delta: i32 = parse_arg(name, &mut tokens)?;
            let step = GainStep::new(delta)
                .ok_or_else(|| RequestError::InvalidArgument{ request: name.into(), argument: delta.to_string() })?;
            property(PropertyRequest::GainIncrement(step))
        },

        "summary" => Ok(Request::Summary),
        "quit" | "exit" => Ok(Request::Quit),

        _ => Err(RequestError::Unknown(name.into()))
    }
}
