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

//! `list`
//!
//! Lists the connected devices
//!

use anyhow::Context;
use nanosign::{ledger, Config};
use serde::Deserialize;

/// Lists devices
pub struct List;

/// Lists devices
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {}

impl super::Command for List {
    type Options = Options;

    fn execute(_options: Self::Options, config: &Config) -> anyhow::Result<()> {
        let devices = ledger::list_devices(config).context("listing devices")?;
        if devices.is_empty() {
            eprintln!("No devices found.");
        }
        println!("{}", serde_json::to_string_pretty(&devices)?);
        Ok(())
    }
}
