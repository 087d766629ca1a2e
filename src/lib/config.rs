// Nanosign
// Written in 2026 by
//   The Nanosign developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! # Configuration
//!
//! Runtime knobs for device discovery and the transport. Every field has a
//! default, so an empty JSON object (or no file at all) is a valid config.
//!

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::Error;

/// Name of the config file looked up in the home directory
pub const CONFIG_FILE_NAME: &str = ".nanosign.json";

/// Runtime configuration
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// USB vendor IDs recognized as Ledger devices
    pub vendor_ids: Vec<u16>,
    /// HID usage page of the APDU interface
    pub usage_page: u16,
    /// HID interface number of the APDU interface
    pub interface_number: i32,
    /// How long to wait for each response frame, in milliseconds
    pub read_timeout_ms: u64,
    /// Bogus sequence number some firmware reports on the first response frame
    pub sequence_sentinel: u16,
    /// How many times a session may reopen the device to recover from the sentinel
    pub reopen_budget: u32,
    /// Capacity of the event queue handed to callers
    pub event_queue_depth: usize,
    /// Log level used by the command-line tool
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vendor_ids: vec![
                constants::hid::VENDOR_ID_NANO_S,
                constants::hid::VENDOR_ID_NANO_X,
            ],
            usage_page: constants::hid::USAGE_PAGE,
            interface_number: constants::hid::INTERFACE_NUMBER,
            read_timeout_ms: 30_000,
            sequence_sentinel: 0xffff,
            reopen_budget: 10,
            event_queue_depth: 16,
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    /// Parses a config from a JSON string
    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Reads a config from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let data = fs::read_to_string(path)?;
        Config::from_json(&data)
    }

    /// Loads `~/.nanosign.json` if it exists, otherwise the defaults
    pub fn load_default() -> Result<Self, Error> {
        match Config::default_path() {
            Some(path) => match fs::read_to_string(&path) {
                Ok(data) => {
                    log::debug!("loading config from {}", path.to_string_lossy());
                    Config::from_json(&data)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
                Err(e) => Err(e.into()),
            },
            None => Ok(Config::default()),
        }
    }

    /// Location of the per-user config file
    pub fn default_path() -> Option<PathBuf> {
        home::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Per-frame read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
