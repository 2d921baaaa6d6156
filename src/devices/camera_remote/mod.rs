//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Camera remote control module.
//!

pub mod simulator;
mod watec;

pub use watec::WatecRemote;

/// Highest gain value accepted by the camera.
pub const MAX_GAIN: u32 = 99;

/// Exposure codes (second character of the "E1<code>" command) with their labels, as offered to the user.
const EXPOSURES: [(char, &str); 16] = [
    ('7', "5.12 s"),
    ('8', "2.56 s"),
    ('9', "1.28 s"),
    ('A', "0.64 s"),
    ('B', "0.32 s"),
    ('C', "0.16 s"),
    ('D', "0.08 s"),
    ('E', "1/25 s"),
    ('F', "1/50 s"),
    ('0', "*1/50 s"),
    ('1', "1/60 s"),
    ('2', "1/125 s"),
    ('3', "1/250 s"),
    ('4', "1/500 s"),
    ('5', "1/1000 s"),
    ('6', "1/2000 s")
];

/// Exposure set when connecting.
pub const DEFAULT_EXPOSURE: ExposurePreset = ExposurePreset('F');

/// Gain preset (%) set when connecting.
pub const DEFAULT_GAIN: GainPreset = GainPreset(50);

pub const GAIN_STEPS: [i32; 6] = [25, -25, 10, -10, 1, -1];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExposurePreset(char);

impl ExposurePreset {
    /// Accepts one of the codes "0"-"9", "A"-"F" (case-insensitive).
    pub fn from_code(code: &str) -> Option<ExposurePreset> {
        let mut chars = code.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                let c = c.to_ascii_uppercase();
                EXPOSURES.iter().find(|(code, _)| *code == c).map(|(code, _)| ExposurePreset(*code))
            },
            _ => None
        }
    }

    pub fn code(&self) -> char { self.0 }

    pub fn label(&self) -> &'static str {
        EXPOSURES.iter().find(|(code, _)| *code == self.0).map(|(_, label)| *label).unwrap_or("")
    }
}

/// Gain preset in 10% steps from 0 to 100%.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GainPreset(u32);

impl GainPreset {
    pub fn new(percent: u32) -> Option<GainPreset> {
        if percent <= 100 && percent % 10 == 0 { Some(GainPreset(percent)) } else { None }
    }

    pub fn percent(&self) -> u32 { self.0 }

    /// Value sent to the camera; 100% maps to the highest gain.
    pub fn value(&self) -> u32 { self.0.min(MAX_GAIN) }
}

/// Relative gain change, one of `GAIN_STEPS`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GainStep(i32);

impl GainStep {
    pub fn new(delta: i32) -> Option<GainStep> {
        if GAIN_STEPS.contains(&delta) { Some(GainStep(delta)) } else { None }
    }

    pub fn delta(&self) -> i32 { self.0 }
}
