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

//! # Nanosign Library
//!
//! Nanosign drives the Bitcoin app of a Ledger Nano S or Nano X over USB HID
//! to obtain extended public keys and ECDSA signatures for legacy and segwit
//! transactions. Transaction assembly and broadcast are left to the caller.
//!

// Coding conventions
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(missing_docs)]

pub mod config;
pub mod constants;
pub mod device;
pub mod dongle;
mod error;
pub mod signer;
mod util;

pub use config::Config;
pub use device::{DeviceKey, DeviceType, Event, EventReceiver, HwDevice, LedgerDevice, WalletInfo};
pub use dongle::ledger;
pub use dongle::Dongle;
pub use error::{Error, ErrorCategory};
pub use signer::{Progress, SignatureResult, SignedInputs, SigningRequest, SpendInput};
pub use util::{fingerprint, parse_ledger_signature};

// Re-export all the hidapi types because the double `hidapi::HidDevice`
// naming bugs me
/// Re-exports of types from `hidapi` with nicer names
pub mod hid {
    pub use hidapi::HidApi as Api;
    pub use hidapi::HidDevice as Device;
    pub use hidapi::HidError as Error;
}
