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

//! Argument Parsing
//!
//! Different subcommands supported by the command-line utility
//!

mod getpublickeys;
mod list;
mod signtransaction;

use anyhow::{self, Context};
use nanosign::{Config, ErrorCategory, HwDevice, LedgerDevice, Progress};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, env};

pub trait Command {
    type Options: DeserializeOwned;

    fn execute(options: Self::Options, config: &Config) -> anyhow::Result<()>;
}

macro_rules! register_commands {
    ($($cmd_name:ident, $type_name:ident, $help:expr;)*) => {
        $(use $cmd_name::$type_name;)*

        fn usage<T>(name: &str) -> anyhow::Result<T> {
            eprintln!("Usage: {} <command> [options]", name);
            eprintln!("");
            eprintln!("Commands:");
            $(eprintln!("    {:16} {}", stringify!($cmd_name), $help);)*
            Err(anyhow::Error::msg("bad invocation"))
        }

        /// Parse command-line arguments and execute them
        pub fn execute_from_args(config: &Config) -> anyhow::Result<()> {
            let mut args = env::args_os();
            let name = args.next();
            let name = match name.as_ref() {
                Some(name) => name.to_string_lossy(),
                None => usage("")?,
            };
            let cmd = args.next();
            let cmd = match cmd.as_ref() {
                Some(cmd) => cmd.to_string_lossy(),
                None => usage(&name)?,
            };
            let options = args.next();
            let options = options
                .as_ref()
                .map(|oss| oss.to_string_lossy())
                .unwrap_or(Cow::Borrowed("{}"));

            if args.next().is_some() {
                usage(&name)?
            }

            match cmd.as_ref() {
                $(stringify!($cmd_name) => {
                    let opts: <$type_name as Command>::Options = serde_json::from_str(&options)
                        .with_context(|| format!(
                            "deserializing options for {}",
                             stringify!($cmd_name),
                        ))?;
                    $type_name::execute(opts, config)?;
                }),*
                _ => usage(&name)?,
            }
            Ok(())
        }
    }
}

register_commands! {
    list, List, "";
    getpublickeys, GetPublicKeys, "{ \"serial\": string (optional), \"testnet\": bool (optional), \"account\": int (optional), \"known_wallets\": { id: xpub } (optional) }";
    signtransaction, SignTransaction, "{ \"serial\": string (optional), \"inputs\": [...], \"recipients\": [...], ... }";
}

/// Picks the device to talk to, by serial number if one is given
fn open_device(config: &Config, serial: Option<&str>) -> anyhow::Result<LedgerDevice> {
    let mut devices = LedgerDevice::enumerate(config).context("listing devices")?;
    let index = match serial {
        Some(serial) => devices
            .iter()
            .position(|dev| dev.key().serial == serial)
            .with_context(|| format!("no device with serial {}", serial))?,
        None => match devices.len() {
            0 => return Err(anyhow::Error::msg("no device found, is it plugged in and unlocked?")),
            1 => 0,
            n => {
                return Err(anyhow::Error::msg(format!(
                    "{} devices found, please pick one with \"serial\"",
                    n
                )))
            }
        },
    };
    let device = devices.swap_remove(index);
    log::info!("using device {} ({})", device.key().serial, device.key().product);
    Ok(device)
}

/// Tells the user what the device is waiting for
fn print_progress(progress: Progress) {
    match progress {
        Progress::ConfirmOnDevice => eprintln!("Please confirm the outputs on your device."),
        Progress::UploadingTransaction => eprintln!("Uploading transaction..."),
        Progress::AwaitingSignature => eprintln!("Waiting for signatures..."),
        Progress::Finished => eprintln!("Done."),
    }
}

/// Turns a failed request into an error for the user
fn device_error((category, detail): (ErrorCategory, String)) -> anyhow::Error {
    anyhow::Error::msg(format!("{}: {}", category, detail))
}
