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

//! `signtransaction`
//!
//! Asks the device to sign every input of a transaction and prints the
//! signatures, public keys and redeem scripts needed to assemble it.
//!

use anyhow::Context;
use miniscript::bitcoin::{self, absolute, bip32, consensus};
use nanosign::{Config, HwDevice, SigningRequest, SpendInput};
use serde::{Deserialize, Serialize};

/// Signs a transaction
pub struct SignTransaction;

/// An output being spent
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    /// Outpoint, as `txid:vout`
    outpoint: bitcoin::OutPoint,
    /// Value in satoshi
    value: u64,
    /// Hex-encoded script of the output
    script_pubkey: String,
    /// Hex-encoded P2SH redeem script, for legacy P2SH outputs only
    #[serde(default)]
    redeem_script: Option<String>,
    /// Derivation path of the signing key
    path: bip32::DerivationPath,
}

/// An output of the transaction being signed
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipient {
    /// Value in satoshi
    value: u64,
    /// Hex-encoded output script
    script_pubkey: String,
}

/// Signs a transaction
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// Serial number of the device, needed when several are connected
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    testnet: bool,
    inputs: Vec<Input>,
    /// Every output, change included
    recipients: Vec<Recipient>,
    /// Derivation path of the change output, so the device can hide it
    #[serde(default)]
    change_path: Option<bip32::DerivationPath>,
    #[serde(default)]
    rbf: bool,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    lock_time: u32,
    /// Hex-encoded transactions whose outputs are spent, for legacy inputs
    #[serde(default)]
    supporting_txs: Vec<String>,
}

/// One signature, ready for the scriptSig or witness
#[derive(Serialize)]
struct SignatureOutput {
    input: usize,
    signature: String,
    public_key: String,
    xpub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redeem_script: Option<String>,
}

fn script_from_hex(s: &str) -> anyhow::Result<bitcoin::ScriptBuf> {
    let bytes = hex::decode(s).with_context(|| format!("hex-decoding script {}", s))?;
    Ok(bitcoin::ScriptBuf::from_bytes(bytes))
}

impl Options {
    fn into_request(self) -> anyhow::Result<SigningRequest> {
        let mut request = SigningRequest {
            network: if self.testnet {
                bitcoin::Network::Testnet
            } else {
                bitcoin::Network::Bitcoin
            },
            change_path: self.change_path,
            rbf: self.rbf,
            lock_time: absolute::LockTime::from_consensus(self.lock_time),
            ..Default::default()
        };
        if let Some(version) = self.version {
            request.version = version;
        }
        for input in self.inputs {
            request.inputs.push(SpendInput {
                outpoint: input.outpoint,
                value: bitcoin::Amount::from_sat(input.value),
                script_pubkey: script_from_hex(&input.script_pubkey)?,
                redeem_script: input
                    .redeem_script
                    .as_deref()
                    .map(script_from_hex)
                    .transpose()?,
                path: input.path,
            });
        }
        for recipient in self.recipients {
            request.recipients.push(bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(recipient.value),
                script_pubkey: script_from_hex(&recipient.script_pubkey)?,
            });
        }
        for rawtx in self.supporting_txs {
            let bytes = hex::decode(&rawtx).context("hex-decoding supporting transaction")?;
            let tx: bitcoin::Transaction =
                consensus::deserialize(&bytes).context("decoding supporting transaction")?;
            request.supporting_txs.insert(tx.txid(), tx);
        }
        Ok(request)
    }
}

impl super::Command for SignTransaction {
    type Options = Options;

    fn execute(options: Self::Options, config: &Config) -> anyhow::Result<()> {
        let serial = options.serial.clone();
        let request = options.into_request()?;
        let device = super::open_device(config, serial.as_deref())?;
        let signed = device
            .sign_transaction(request)
            .wait(super::print_progress)
            .map_err(super::device_error)?;

        let out: Vec<SignatureOutput> = signed
            .signatures
            .iter()
            .zip(&signed.public_keys)
            .zip(&signed.redeem_scripts)
            .map(|((sig, xpub), redeem)| SignatureOutput {
                input: sig.input_index,
                signature: hex::encode(&sig.der_signature),
                public_key: xpub.public_key.to_string(),
                xpub: xpub.to_string(),
                redeem_script: redeem.as_ref().map(|script| hex::encode(script.as_bytes())),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        Ok(())
    }
}
