//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Observatory dome module.
//!

mod astelco;

pub use astelco::AstelcoDome;

/// Park azimuth used until one is set.
pub const DEFAULT_PARK_AZIMUTH: f64 = 0.0;

#[derive(Copy, Clone, Debug, PartialEq, strum_macros::Display)]
pub enum ParkState {
    #[strum(serialize = "PARKED")]
    Parked,
    #[strum(serialize = "UNPARKED")]
    Unparked
}
