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

//! `getpublickeys`
//!
//! Fetches the account-level extended public keys of a device
//!

use miniscript::bitcoin::bip32;
use nanosign::{Config, HwDevice};
use serde::Deserialize;
use std::collections::HashMap;

/// Fetches account keys
pub struct GetPublicKeys;

/// Fetches account keys
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// Serial number of the device, needed when several are connected
    #[serde(default)]
    serial: Option<String>,
    /// Use testnet coin type and key version bytes
    #[serde(default)]
    testnet: bool,
    /// BIP44 account number
    #[serde(default)]
    account: u32,
    /// Root keys (at `m/0'`) of known wallets, by wallet id
    #[serde(default)]
    known_wallets: HashMap<String, bip32::Xpub>,
}

impl super::Command for GetPublicKeys {
    type Options = Options;

    fn execute(options: Self::Options, config: &Config) -> anyhow::Result<()> {
        let device = super::open_device(config, options.serial.as_deref())?
            .with_known_wallets(options.known_wallets);
        let info = device
            .get_public_keys(options.testnet, options.account)
            .wait(super::print_progress)
            .map_err(super::device_error)?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        Ok(())
    }
}
