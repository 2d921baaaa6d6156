//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Telescope focuser module.
//!

mod astelco;

pub use astelco::AstelcoFocuser;

/// Focuser position in millimetres.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Position(pub f64);

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PositionRange {
    pub min: Position,
    pub max: Position
}

impl PositionRange {
    pub fn contains(&self, pos: Position) -> bool {
        pos.0 >= self.min.0 && pos.0 <= self.max.0
    }
}
