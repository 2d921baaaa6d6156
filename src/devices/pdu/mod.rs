//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Power distribution unit module.
//!

mod netio;
pub mod simulator;

pub use netio::Netio;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum SocketState {
    #[strum(serialize = "ON")]
    On,
    #[strum(serialize = "OFF")]
    Off,
    /// Last switching attempt was not acknowledged.
    #[strum(serialize = "ALERT")]
    Alert
}
