//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

use crate::devices::astelco::protocol::{DeviceAxis, PositionKind};
use std::collections::HashMap;

/// Last known numeric attributes of the controller's axes.
#[derive(Default)]
pub struct AxisState {
    values: HashMap<(DeviceAxis, PositionKind), f64>
}

impl AxisState {
    pub fn get(&self, axis: DeviceAxis, kind: PositionKind) -> Option<f64> {
        self.values.get(&(axis, kind)).copied()
    }

    pub fn set(&mut self, axis: DeviceAxis, kind: PositionKind, value: f64) {
        self.values.insert((axis, kind), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_real_position_and_offset_keep_separate() {
        let mut axes = AxisState::default();
        axes.set(DeviceAxis::Focus, PositionKind::Real, 10.0);
        axes.set(DeviceAxis::Focus, PositionKind::Offset, 0.25);

        assert_eq!(Some(10.0), axes.get(DeviceAxis::Focus, PositionKind::Real));
        assert_eq!(Some(0.25), axes.get(DeviceAxis::Focus, PositionKind::Offset));
        assert_eq!(None, axes.get(DeviceAxis::Dome, PositionKind::Real));
    }
}
