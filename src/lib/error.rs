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

//! # Error Handling

use crate::constants::apdu::ledger::{sw, Instruction};
use miniscript::bitcoin;
use serde::{Deserialize, Serialize};
use std::{fmt, io, ops};
use thiserror::Error;

/// Nanosign error
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("incorrect channel for APDU (expected {expected:?}, found {found:?})")]
    ApduWrongChannel { expected: u16, found: u16 },
    #[error("incorrect tag for APDU (expected {expected:?}, found {found:?})")]
    ApduWrongTag { expected: u8, found: u8 },
    #[error("incorrect sequence no for APDU (expected {expected:?}, found {found:?})")]
    ApduWrongSequence { expected: u16, found: u16 },
    #[error("APDU payload of {0} bytes does not fit a one-byte length")]
    ApduTooLong(usize),
    #[error("device kept reporting a bogus sequence number after {0} reopens")]
    SequenceRetriesExhausted(u32),
    #[error("operation cancelled")]
    Cancelled,
    #[error("config")]
    Config(#[from] serde_json::Error),
    #[error("no dongle with serial {0:?} detected")]
    DongleNotFound(String),
    #[error("device session is closed")]
    SessionClosed,
    #[error("hidapi")]
    Hid(#[from] hidapi::HidError),
    #[error("io")]
    Io(#[from] io::Error),
    #[error("write to device failed after {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("timed out waiting for the device")]
    Timeout,
    #[error("device replied to {apdu} with bad status code {status:04X}")]
    ResponseBadStatus { apdu: Instruction, status: u16 },
    #[error("incorrect length for {apdu} response (expected {expected:?}, found {found:?})")]
    ResponseWrongLength {
        apdu: Instruction,
        expected: ops::Range<usize>,
        found: usize,
    },
    #[error("secp256k1")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    #[error("unexpected end-of-data")]
    UnexpectedEof,
    #[error("derivation path {0} must have between 1 and 10 elements")]
    BadDerivationPath(bitcoin::bip32::DerivationPath),
    #[error("script of {0} bytes is too large to upload")]
    ScriptTooLarge(usize),
    #[error("signing request has no inputs")]
    NoInputs,
    #[error("signing request has no recipients")]
    NoRecipients,
    #[error("outpoint {0} is spent twice")]
    DuplicateInput(bitcoin::OutPoint),
    #[error("script {script} is claimed by more than one derivation path")]
    ConflictingPaths { script: bitcoin::ScriptBuf },
    #[error("cannot mix legacy and segwit inputs in one signing request")]
    MixedInputTypes,
    #[error("input {0} spends an output type we cannot sign")]
    UnsupportedInput(usize),
    #[error("supporting tx {0} not provided")]
    TxNotFound(bitcoin::Txid),
    #[error("supporting tx does not match the spent output {0}")]
    TxoMismatch(bitcoin::OutPoint),
    #[error("reconstructed script for input {index} does not match its UTXO script")]
    ScriptMismatch { index: usize },
}

/// Caller-visible classification of an [`Error`]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// No matching device is connected, or it could not be opened
    NoDevice,
    /// The request itself was malformed
    NoInputData,
    /// The user refused on the device, or the operation was cancelled
    CancelledByUser,
    /// The device is locked or the Bitcoin app is not open
    NoEnvironment,
    /// The device wedged itself and needs to be replugged
    ReconnectDevice,
    /// Anything else
    InternalError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ErrorCategory::NoDevice => "No device found",
            ErrorCategory::NoInputData => "Invalid signing request",
            ErrorCategory::CancelledByUser => "Cancelled by user",
            ErrorCategory::NoEnvironment => "Please make sure your device is ready for use",
            ErrorCategory::ReconnectDevice => {
                "Internal device error, please reconnect the device to the system"
            }
            ErrorCategory::InternalError => "Internal error",
        })
    }
}

impl Error {
    /// Classifies the error for display to the user
    pub fn category(&self) -> ErrorCategory {
        match *self {
            Error::DongleNotFound(..) | Error::Hid(..) | Error::SessionClosed => {
                ErrorCategory::NoDevice
            }
            Error::ResponseBadStatus { status, .. } => match status {
                sw::CANCELED_BY_USER => ErrorCategory::CancelledByUser,
                sw::NO_ENVIRONMENT => ErrorCategory::NoEnvironment,
                sw::RECONNECT_DEVICE => ErrorCategory::ReconnectDevice,
                _ => ErrorCategory::InternalError,
            },
            Error::SequenceRetriesExhausted(..) => ErrorCategory::ReconnectDevice,
            Error::Cancelled => ErrorCategory::CancelledByUser,
            Error::BadDerivationPath(..)
            | Error::ScriptTooLarge(..)
            | Error::NoInputs
            | Error::NoRecipients
            | Error::DuplicateInput(..)
            | Error::ConflictingPaths { .. }
            | Error::MixedInputTypes
            | Error::UnsupportedInput(..)
            | Error::TxNotFound(..)
            | Error::TxoMismatch(..)
            | Error::ScriptMismatch { .. } => ErrorCategory::NoInputData,
            _ => ErrorCategory::InternalError,
        }
    }
}
