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

//! # Signer
//!
//! Turns a signing request into per-input signatures by driving the device
//! through the legacy or the segwit signing protocol.
//!

use std::collections::{HashMap, HashSet};

use miniscript::bitcoin::{self, absolute, bip32, secp256k1};
use serde::{Deserialize, Serialize};

use crate::constants::tx;
use crate::dongle::Dongle;
use crate::util::parse_ledger_signature;
use crate::Error;

pub mod legacy;
pub mod segwit;

/// Progress notifications emitted while a request is processed
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Progress {
    /// The user must confirm something on the device
    ConfirmOnDevice,
    /// The transaction is being uploaded to the device
    UploadingTransaction,
    /// The device is producing signatures
    AwaitingSignature,
    /// All device work is done
    Finished,
}

/// How an input is spent, as decided from its UTXO script
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InputKind {
    /// P2PKH
    Legacy,
    /// P2SH with an explicit redeem script
    LegacyP2sh,
    /// P2WPKH
    NativeSegwit,
    /// P2SH-wrapped P2WPKH
    NestedSegwit,
}

impl InputKind {
    /// Whether the input is signed through the segwit protocol
    pub fn is_segwit(self) -> bool {
        matches!(self, InputKind::NativeSegwit | InputKind::NestedSegwit)
    }
}

/// A spendable output and the key that controls it
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpendInput {
    /// The output being spent
    pub outpoint: bitcoin::OutPoint,
    /// Its value
    pub value: bitcoin::Amount,
    /// Its script
    pub script_pubkey: bitcoin::ScriptBuf,
    /// Redeem script of a legacy P2SH output
    pub redeem_script: Option<bitcoin::ScriptBuf>,
    /// Derivation path of the signing key
    pub path: bip32::DerivationPath,
}

impl SpendInput {
    /// Classifies the input
    pub fn kind(&self) -> Option<InputKind> {
        let spk = &self.script_pubkey;
        match self.redeem_script {
            None if spk.is_p2pkh() => Some(InputKind::Legacy),
            None if spk.is_p2wpkh() => Some(InputKind::NativeSegwit),
            None if spk.is_p2sh() => Some(InputKind::NestedSegwit),
            Some(_) if spk.is_p2sh() => Some(InputKind::LegacyP2sh),
            _ => None,
        }
    }

    /// The script revealed to the device when signing this input
    /// through the legacy protocol
    pub fn legacy_script(&self) -> &bitcoin::ScriptBuf {
        self.redeem_script.as_ref().unwrap_or(&self.script_pubkey)
    }
}

/// Everything needed to sign a transaction
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SigningRequest {
    /// Network the keys live on
    pub network: bitcoin::Network,
    /// Inputs, in transaction order
    pub inputs: Vec<SpendInput>,
    /// The complete output list, change included
    pub recipients: Vec<bitcoin::TxOut>,
    /// Derivation path of the change output, if there is one
    pub change_path: Option<bip32::DerivationPath>,
    /// Whether to signal replace-by-fee
    pub rbf: bool,
    /// Transaction version
    pub version: u32,
    /// Transaction lock time
    pub lock_time: absolute::LockTime,
    /// Transactions spent by legacy inputs, by txid
    pub supporting_txs: HashMap<bitcoin::Txid, bitcoin::Transaction>,
}

impl Default for SigningRequest {
    fn default() -> Self {
        SigningRequest {
            network: bitcoin::Network::Bitcoin,
            inputs: vec![],
            recipients: vec![],
            change_path: None,
            rbf: false,
            version: tx::DEFAULT_VERSION,
            lock_time: absolute::LockTime::ZERO,
            supporting_txs: HashMap::new(),
        }
    }
}

fn check_path(path: &bip32::DerivationPath) -> Result<(), Error> {
    let len = path.as_ref().len();
    if len == 0 || len > tx::MAX_PATH_LEN {
        Err(Error::BadDerivationPath(path.clone()))
    } else {
        Ok(())
    }
}

fn check_script_len(script: &bitcoin::Script) -> Result<(), Error> {
    if script.len() > tx::MAX_SCRIPT_SIZE {
        Err(Error::ScriptTooLarge(script.len()))
    } else {
        Ok(())
    }
}

impl SigningRequest {
    /// Checks everything that can be checked without the device
    ///
    /// Returns the kind of every input.
    pub fn validate(&self) -> Result<Vec<InputKind>, Error> {
        if self.inputs.is_empty() {
            return Err(Error::NoInputs);
        }
        if self.recipients.is_empty() {
            return Err(Error::NoRecipients);
        }
        if let Some(ref change_path) = self.change_path {
            check_path(change_path)?;
        }

        let mut outpoints = HashSet::with_capacity(self.inputs.len());
        let mut spenders: HashMap<&bitcoin::ScriptBuf, &bip32::DerivationPath> = HashMap::new();
        let mut kinds = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            check_path(&input.path)?;
            if !outpoints.insert(input.outpoint) {
                return Err(Error::DuplicateInput(input.outpoint));
            }
            if let Some(path) = spenders.insert(&input.script_pubkey, &input.path) {
                if *path != input.path {
                    return Err(Error::ConflictingPaths {
                        script: input.script_pubkey.clone(),
                    });
                }
            }

            let kind = input.kind().ok_or(Error::UnsupportedInput(index))?;
            if let Some(ref redeem_script) = input.redeem_script {
                check_script_len(redeem_script)?;
                let p2sh = bitcoin::ScriptBuf::new_p2sh(&redeem_script.script_hash());
                if p2sh != input.script_pubkey {
                    return Err(Error::ScriptMismatch { index });
                }
            }
            kinds.push(kind);
        }

        let n_segwit = kinds.iter().filter(|kind| kind.is_segwit()).count();
        if n_segwit != 0 && n_segwit != kinds.len() {
            return Err(Error::MixedInputTypes);
        }
        if n_segwit == 0 {
            for input in &self.inputs {
                check_script_len(input.legacy_script())?;
                self.check_supporting_tx(input)?;
            }
        }
        Ok(kinds)
    }

    /// Checks that the transaction spent by a legacy input is present, is
    /// small enough to upload, and contains the output being spent
    fn check_supporting_tx(&self, input: &SpendInput) -> Result<(), Error> {
        let txid = input.outpoint.txid;
        let tx = self
            .supporting_txs
            .get(&txid)
            .ok_or(Error::TxNotFound(txid))?;
        if tx.txid() != txid {
            return Err(Error::TxoMismatch(input.outpoint));
        }
        match tx.output.get(input.outpoint.vout as usize) {
            Some(txo) if txo.value == input.value && txo.script_pubkey == input.script_pubkey => {}
            _ => return Err(Error::TxoMismatch(input.outpoint)),
        }
        for txin in &tx.input {
            check_script_len(&txin.script_sig)?;
        }
        for txo in &tx.output {
            check_script_len(&txo.script_pubkey)?;
        }
        Ok(())
    }
}

/// Signature of a single input
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignatureResult {
    /// Index of the input in the transaction
    pub input_index: usize,
    /// DER signature followed by the sighash byte
    pub der_signature: Vec<u8>,
}

impl SignatureResult {
    /// Parses the DER part of the signature
    pub fn signature(&self) -> Result<secp256k1::ecdsa::Signature, Error> {
        let mut sig = self.der_signature.clone();
        Ok(parse_ledger_signature(&mut sig)?)
    }
}

/// Everything the transaction assembly layer needs to finish the transaction
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignedInputs {
    /// One signature per input, in input order
    pub signatures: Vec<SignatureResult>,
    /// The key node used for every input, in input order
    pub public_keys: Vec<bip32::Xpub>,
    /// The redeem script to place in the scriptSig of P2SH inputs
    pub redeem_scripts: Vec<Option<bitcoin::ScriptBuf>>,
}

/// Validates `request` and signs it through the protocol its inputs require
pub fn sign<D: Dongle>(
    dongle: &mut D,
    request: &SigningRequest,
    notify: &mut dyn FnMut(Progress),
) -> Result<SignedInputs, Error> {
    let kinds = request.validate()?;
    if kinds.iter().all(|kind| kind.is_segwit()) {
        segwit::sign(dongle, request, &kinds, notify)
    } else {
        legacy::sign(dongle, request, notify)
    }
}

#[cfg(test)]
pub mod test_support {
    //! Request builders shared by the orchestrator tests

    use std::str::FromStr;

    use miniscript::bitcoin::hashes::{hash160, Hash};
    use miniscript::bitcoin::{self, bip32, secp256k1};

    /// A recipient output
    pub fn recipient(sat: u64) -> bitcoin::TxOut {
        bitcoin::TxOut {
            value: bitcoin::Amount::from_sat(sat),
            script_pubkey: bitcoin::ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::from_byte_array(
                [0x77; 20],
            )),
        }
    }

    /// Parses a derivation path
    pub fn path(s: &str) -> bip32::DerivationPath {
        bip32::DerivationPath::from_str(s).unwrap()
    }

    /// The hash160 of a key
    pub fn key_hash(pk: &secp256k1::PublicKey) -> hash160::Hash {
        hash160::Hash::hash(&pk.serialize())
    }
}
