//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Host-visible properties published by the drivers.
//!

use crate::devices::astelco::protocol::StatusField;
use std::collections::HashMap;
use strum::IntoEnumIterator;

/// Initial value of every text field.
pub const NOT_AVAILABLE: &str = "NA";

pub const NUM_SOCKETS: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyGroup {
    MainStatus,
    Status,
    Position,
    Sockets,
    CameraSettings
}

impl PropertyGroup {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyGroup::MainStatus => "STATUS TELESCOPE",
            PropertyGroup::Status => "STATUS",
            PropertyGroup::Position => "POSITION",
            PropertyGroup::Sockets => "SOCKETS",
            PropertyGroup::CameraSettings => "CAMERA SETTINGS"
        }
    }

    pub fn fields(&self) -> Vec<TextField> {
        match self {
            PropertyGroup::MainStatus => vec![TextField::Uptime, TextField::TelescopeReady],
            PropertyGroup::Status => StatusField::iter().map(TextField::Status).collect(),
            PropertyGroup::Position => vec![TextField::MinPosition, TextField::MaxPosition],
            PropertyGroup::Sockets => (1..=NUM_SOCKETS).map(TextField::Socket).collect(),
            PropertyGroup::CameraSettings => vec![TextField::Exposure, TextField::Gain, TextField::Mirror]
        }
    }
}

/// Groups refreshed after every decoded Astelco response.
pub const ASTELCO_GROUPS: [PropertyGroup; 3] = [PropertyGroup::Status, PropertyGroup::Position, PropertyGroup::MainStatus];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextField {
    Uptime,
    TelescopeReady,
    Status(StatusField),
    MinPosition,
    MaxPosition,
    /// Socket number (starting at 1).
    Socket(usize),
    Exposure,
    Gain,
    Mirror
}

impl TextField {
    pub fn group(&self) -> PropertyGroup {
        match self {
            TextField::Uptime | TextField::TelescopeReady => PropertyGroup::MainStatus,
            TextField::Status(_) => PropertyGroup::Status,
            TextField::MinPosition | TextField::MaxPosition => PropertyGroup::Position,
            TextField::Socket(_) => PropertyGroup::Sockets,
            TextField::Exposure | TextField::Gain | TextField::Mirror => PropertyGroup::CameraSettings
        }
    }

    pub fn name(&self) -> String {
        match self {
            TextField::Uptime => "UPTIME".into(),
            TextField::TelescopeReady => "TELESCOPE_READY".into(),
            TextField::Status(field) => field.property_name().into(),
            TextField::MinPosition => "MIN_POSITION".into(),
            TextField::MaxPosition => "MAX_POSITION".into(),
            TextField::Socket(index) => format!("SOCKET {}", index),
            TextField::Exposure => "EXPOSURE_TIME".into(),
            TextField::Gain => "GAIN".into(),
            TextField::Mirror => "FLIP_MIRROR".into()
        }
    }
}

#[derive(Default)]
pub struct TextProperties {
    values: HashMap<TextField, String>
}

impl TextProperties {
    pub fn get(&self, field: TextField) -> &str {
        self.values.get(&field).map(|s| s.as_str()).unwrap_or(NOT_AVAILABLE)
    }

    pub fn set(&mut self, field: TextField, value: String) {
        self.values.insert(field, value);
    }

    pub fn snapshot(&self, group: PropertyGroup) -> GroupSnapshot {
        GroupSnapshot{
            group,
            fields: group.fields().into_iter().map(|f| (f, self.get(f).to_string())).collect()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupSnapshot {
    pub group: PropertyGroup,
    pub fields: Vec<(TextField, String)>
}

impl std::fmt::Display for GroupSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.group.name())?;
        for (field, value) in &self.fields {
            write!(f, " {}=\"{}\"", field.name(), value)?;
        }
        Ok(())
    }
}

/// State reported back to the host after handling a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum PropertyState {
    #[strum(serialize = "OK")]
    Ok,
    #[strum(serialize = "BUSY")]
    Busy,
    #[strum(serialize = "ALERT")]
    Alert
}

pub enum DriverToMainThreadMsg {
    Refresh(Vec<GroupSnapshot>),
    Warning(String),
    ConnectionLost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_unset_field_report_not_available() {
        let props = TextProperties::default();
        assert_eq!(NOT_AVAILABLE, props.get(TextField::Uptime));
    }

    #[test]
    fn given_status_group_snapshot_list_all_fields_in_order() {
        let mut props = TextProperties::default();
        props.set(TextField::Status(StatusField::RealPosition), "10.000000".into());
        let snapshot = props.snapshot(PropertyGroup::Status);

        assert_eq!(7, snapshot.fields.len());
        assert_eq!((TextField::Status(StatusField::PowerState), NOT_AVAILABLE.to_string()), snapshot.fields[0]);
        assert_eq!((TextField::Status(StatusField::RealPosition), "10.000000".to_string()), snapshot.fields[1]);
    }

    #[test]
    fn given_snapshot_format() {
        let mut props = TextProperties::default();
        props.set(TextField::Uptime, "1234".into());
        assert_eq!(
            "STATUS TELESCOPE: UPTIME=\"1234\" TELESCOPE_READY=\"NA\"",
            props.snapshot(PropertyGroup::MainStatus).to_string()
        );
    }
}
