//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Decoding of response values into display text.
//!

/// How the value of a response is to be interpreted; chosen when the command is issued.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SemanticKind {
    /// Stored verbatim.
    Uninitialized,
    PowerState,
    LimitState,
    MotionState,
    /// Numeric axis attribute (position, offset, limits).
    AxisValue,
    ReadyState
}

#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub text: String,
    pub axis_value: Option<f64>,
    /// New value of the "powered" flag, if the response changes it.
    pub powered: Option<bool>
}

impl Decoded {
    fn text(text: String) -> Decoded {
        Decoded{ text, axis_value: None, powered: None }
    }
}

/// Integer value of the leading part of `s`, like C's `atoi` (0 if there is none).
pub fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s)
    };

    let value = digits.bytes()
        .take_while(|b| b.is_ascii_digit())
        .fold(0i64, |acc, b| acc.wrapping_mul(10).wrapping_add((b - b'0') as i64));

    if negative { -value } else { value }
}

fn flag(value: i64, mask: i64, label: &'static str) -> &'static str {
    if value & mask != 0 { label } else { "" }
}

pub fn decode_power_state(raw: &str) -> String {
    match raw {
        "-1.0" => "EMERGENCY STOP".into(),
        "0.0" => "OFF".into(),
        "1.0" => "ON".into(),
        _ => raw.into()
    }
}

/// Cleared flags leave empty segments; the separators are kept regardless.
pub fn decode_limit_state(raw: &str) -> String {
    let value = leading_int(raw);
    format!(
        "{} ({} {}) {} ({} {})",
        flag(value, 0x0080, "HW LIMIT BLOCKING"),
        flag(value, 0x0001, "MIN-HW"),
        flag(value, 0x0002, "MAX-HW"),
        flag(value, 0x8000, "SW LIMIT BLOCKING"),
        flag(value, 0x0100, "MIN-SW"),
        flag(value, 0x0200, "MAX-SW")
    )
}

pub fn decode_motion_state(raw: &str) -> String {
    let value = leading_int(raw);

    // 0x20 and 0x40 share the last segment; 0x40 takes precedence
    let mut parking = "";
    if value & 0x20 != 0 { parking = "Unparking/ed"; }
    if value & 0x40 != 0 { parking = "Parking/ed"; }

    [
        flag(value, 0x01, "Axis_Moving"),
        flag(value, 0x02, "Trajectory"),
        flag(value, 0x04, "LIMIT_STATE"),
        flag(value, 0x08, "Target"),
        flag(value, 0x10, "Too_Fast_Move"),
        parking
    ].join(" ")
}

pub fn decode_ready_state(raw: &str) -> (String, Option<bool>) {
    match raw {
        "-3.0" => ("LOCAL MODE".into(), None),
        "-2.0" => ("EMERGENCY STOP".into(), None),
        "-1.0" => ("ERRORS block operation".into(), None),
        "0.0" => ("SHUT DOWN".into(), Some(false)),
        "1.0" => ("FULLY OPERATIONAL".into(), Some(true)),
        _ => (raw.into(), None)
    }
}

pub fn decode(kind: SemanticKind, raw: &str) -> Decoded {
    match kind {
        SemanticKind::Uninitialized => Decoded::text(raw.into()),
        SemanticKind::PowerState => Decoded::text(decode_power_state(raw)),
        SemanticKind::LimitState => Decoded::text(decode_limit_state(raw)),
        SemanticKind::MotionState => Decoded::text(decode_motion_state(raw)),

        SemanticKind::AxisValue => {
            let axis_value = raw.trim().parse::<f64>().ok();
            if axis_value.is_none() {
                log::warn!("cannot parse axis value \"{}\"", raw);
            }
            Decoded{ text: raw.into(), axis_value, powered: None }
        },

        SemanticKind::ReadyState => {
            let (text, powered) = decode_ready_state(raw);
            Decoded{ text, axis_value: None, powered }
        }
    }
}
