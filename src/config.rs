//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Program configuration.
//!

use crate::devices::Credentials;
use std::convert::TryFrom;
use std::path::{Path, PathBuf};

mod groups {
    pub const ASTELCO: &str = "Astelco";
    pub const CONNECTION: &str = "Connection";
    pub const NETIO: &str = "Netio";
    pub const WATEC: &str = "Watec";
}

mod keys {
    // group: CONNECTION
    pub const DRIVER: &str = "Driver";
    pub const TCP_ADDRESS: &str = "TcpAddress";
    pub const SERIAL_DEVICE: &str = "SerialDevice";
    pub const BAUD_RATE: &str = "BaudRate";
    pub const READ_TIMEOUT_MS: &str = "ReadTimeoutMs";
    pub const POLLING_PERIOD_MS: &str = "PollingPeriodMs";
    /// Number of unsolicited lines the controller sends after the banner.
    pub const GREETING_LINES: &str = "GreetingLines";

    // groups: ASTELCO, NETIO
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";

    // group: ASTELCO
    pub const DOME_PARK_POSITION: &str = "DomeParkPosition";

    // group: WATEC
    pub const MIRROR_SETTLE_TIME_MS: &str = "MirrorSettleTimeMs";
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error)
}

pub struct Configuration {
    table: toml::Table,
    file_path: PathBuf
}

impl Configuration {
    /// Loads the configuration from the default location.
    pub fn new() -> Configuration {
        Configuration::from_file(&config_file_path())
    }

    /// Loads the configuration from `file_path`; a missing or invalid file leaves all values at defaults.
    pub fn from_file(file_path: &Path) -> Configuration {
        let table = match load(file_path) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("failed to load configuration from {}: {}", file_path.display(), e);
                toml::Table::new()
            }
        };

        Configuration{ table, file_path: file_path.to_path_buf() }
    }

    pub fn store(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.file_path, toml::to_string(&self.table)?)?;
        Ok(())
    }

    pub fn file_path(&self) -> &Path { &self.file_path }

    pub fn driver(&self) -> Option<String> {
        self.string(groups::CONNECTION, keys::DRIVER)
    }

    pub fn set_driver(&mut self, value: &str) {
        self.set_string(groups::CONNECTION, keys::DRIVER, value);
    }

    pub fn tcp_address(&self) -> Option<String> {
        self.string(groups::CONNECTION, keys::TCP_ADDRESS)
    }

    pub fn set_tcp_address(&mut self, value: &str) {
        self.set_string(groups::CONNECTION, keys::TCP_ADDRESS, value);
    }

    pub fn serial_device(&self) -> Option<String> {
        self.string(groups::CONNECTION, keys::SERIAL_DEVICE)
    }

    pub fn set_serial_device(&mut self, value: &str) {
        self.set_string(groups::CONNECTION, keys::SERIAL_DEVICE, value);
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.integer(groups::CONNECTION, keys::BAUD_RATE).and_then(|value| u32::try_from(value).ok())
    }

    pub fn set_baud_rate(&mut self, value: u32) {
        self.set_value(groups::CONNECTION, keys::BAUD_RATE, toml::Value::Integer(value as i64));
    }

    pub fn read_timeout(&self) -> Option<std::time::Duration> {
        self.duration_ms(groups::CONNECTION, keys::READ_TIMEOUT_MS, 1)
    }

    pub fn polling_period(&self) -> Option<std::time::Duration> {
        self.duration_ms(groups::CONNECTION, keys::POLLING_PERIOD_MS, 1)
    }

    pub fn greeting_lines(&self) -> Option<usize> {
        self.integer(groups::CONNECTION, keys::GREETING_LINES).and_then(|value| usize::try_from(value).ok())
    }

    pub fn astelco_credentials(&self) -> Option<Credentials> {
        self.credentials(groups::ASTELCO)
    }

    pub fn set_astelco_credentials(&mut self, credentials: &Credentials) {
        self.set_credentials(groups::ASTELCO, credentials);
    }

    pub fn netio_credentials(&self) -> Option<Credentials> {
        self.credentials(groups::NETIO)
    }

    pub fn set_netio_credentials(&mut self, credentials: &Credentials) {
        self.set_credentials(groups::NETIO, credentials);
    }

    /// Park azimuth of the dome (degrees).
    pub fn dome_park_position(&self) -> Option<f64> {
        match self.value(groups::ASTELCO, keys::DOME_PARK_POSITION)? {
            toml::Value::Float(value) => Some(*value),
            toml::Value::Integer(value) => Some(*value as f64),
            _ => None
        }
    }

    pub fn set_dome_park_position(&mut self, value: f64) {
        self.set_value(groups::ASTELCO, keys::DOME_PARK_POSITION, toml::Value::Float(value));
    }

    /// Wait after a mirror flip of the camera remote; may be zero.
    pub fn mirror_settle_time(&self) -> Option<std::time::Duration> {
        self.duration_ms(groups::WATEC, keys::MIRROR_SETTLE_TIME_MS, 0)
    }

    pub fn set_mirror_settle_time(&mut self, value: std::time::Duration) {
        self.set_value(groups::WATEC, keys::MIRROR_SETTLE_TIME_MS, toml::Value::Integer(value.as_millis() as i64));
    }

    /// `index` starts at 1.
    pub fn socket_name(&self, index: usize) -> Option<String> {
        self.string(groups::NETIO, &socket_name_key(index))
    }

    pub fn set_socket_name(&mut self, index: usize, value: &str) {
        self.set_string(groups::NETIO, &socket_name_key(index), value);
    }

    fn credentials(&self, group: &str) -> Option<Credentials> {
        Some(Credentials{
            username: self.string(group, keys::USERNAME)?,
            password: self.string(group, keys::PASSWORD)?
        })
    }

    fn set_credentials(&mut self, group: &str, credentials: &Credentials) {
        self.set_string(group, keys::USERNAME, &credentials.username);
        self.set_string(group, keys::PASSWORD, &credentials.password);
    }

    fn duration_ms(&self, group: &str, key: &str, min: i64) -> Option<std::time::Duration> {
        match self.integer(group, key) {
            Some(value) if value >= min => Some(std::time::Duration::from_millis(value as u64)),
            Some(value) => {
                log::warn!("ignoring invalid value of {}: {}", key, value);
                None
            },
            None => None
        }
    }

    fn value(&self, group: &str, key: &str) -> Option<&toml::Value> {
        self.table.get(group)?.as_table()?.get(key)
    }

    fn string(&self, group: &str, key: &str) -> Option<String> {
        self.value(group, key)?.as_str().map(|s| s.to_string())
    }

    fn integer(&self, group: &str, key: &str) -> Option<i64> {
        self.value(group, key)?.as_integer()
    }

    fn set_string(&mut self, group: &str, key: &str, value: &str) {
        self.set_value(group, key, toml::Value::String(value.to_string()));
    }

    fn set_value(&mut self, group: &str, key: &str, value: toml::Value) {
        let entry = self.table.entry(group.to_string()).or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        if let toml::Value::Table(group_table) = entry {
            group_table.insert(key.to_string(), value);
        }
    }
}

fn socket_name_key(index: usize) -> String {
    format!("Socket{}Name", index)
}

fn load(file_path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(contents.parse::<toml::Table>()?)
}

fn config_file_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("tsilink.toml");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_missing_file_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::from_file(&dir.path().join("none.toml"));
        assert_eq!(None, config.driver());
        assert_eq!(None, config.astelco_credentials());
    }

    #[test]
    fn given_stored_values_read_back_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("tsilink.toml");

        let mut config = Configuration::from_file(&path);
        config.set_driver("dome");
        config.set_baud_rate(19200);
        config.set_astelco_credentials(&Credentials{ username: "obs".into(), password: "pw".into() });
        config.set_dome_park_position(270.0);
        config.set_socket_name(3, "Dew heater");
        config.store().unwrap();

        let config = Configuration::from_file(&path);
        assert_eq!(Some("dome".to_string()), config.driver());
        assert_eq!(Some(19200), config.baud_rate());
        assert_eq!(Some(Credentials{ username: "obs".into(), password: "pw".into() }), config.astelco_credentials());
        assert_eq!(None, config.netio_credentials());
        assert_eq!(Some(270.0), config.dome_park_position());
        assert_eq!(Some("Dew heater".to_string()), config.socket_name(3));
    }

    #[test]
    fn given_hand_written_file_parse_durations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsilink.toml");
        std::fs::write(&path, "[Connection]\nReadTimeoutMs = 500\nPollingPeriodMs = -1\nGreetingLines = 2\n").unwrap();

        let config = Configuration::from_file(&path);
        assert_eq!(Some(std::time::Duration::from_millis(500)), config.read_timeout());
        assert_eq!(None, config.polling_period());
        assert_eq!(Some(2), config.greeting_lines());
    }

    #[test]
    fn given_zero_settle_time_accept_only_for_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsilink.toml");
        std::fs::write(&path, "[Connection]\nReadTimeoutMs = 0\n\n[Watec]\nMirrorSettleTimeMs = 0\n").unwrap();

        let mut config = Configuration::from_file(&path);
        assert_eq!(None, config.read_timeout());
        assert_eq!(Some(std::time::Duration::from_millis(0)), config.mirror_settle_time());

        config.set_mirror_settle_time(std::time::Duration::from_millis(800));
        config.store().unwrap();
        assert_eq!(Some(std::time::Duration::from_millis(800)), Configuration::from_file(&path).mirror_settle_time());
    }

    #[test]
    fn given_invalid_file_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsilink.toml");
        std::fs::write(&path, "[Connection\nDriver = ").unwrap();
        assert_eq!(None, Configuration::from_file(&path).driver());
    }
}
