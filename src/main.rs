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

//! # Nanosign
//!
//! Command-line front end for the Nanosign library: lists Ledger devices,
//! fetches their account keys and signs transactions with them.
//!

mod commands;

use anyhow::Context;
use nanosign::Config;
use std::env;

/// Environment variable naming an alternate config file
const CONFIG_ENV: &str = "NANOSIGN_CONFIG";

fn main() -> anyhow::Result<()> {
    let config = match env::var_os(CONFIG_ENV) {
        Some(path) => Config::from_path(&path)
            .with_context(|| format!("loading config from {}", path.to_string_lossy()))?,
        None => Config::load_default().context("loading config")?,
    };

    simplelog::SimpleLogger::init(config.log_level, simplelog::Config::default())
        .context("initializing logger")?;

    commands::execute_from_args(&config)
}
