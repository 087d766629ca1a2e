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

//! # Dongle
//!
//! Abstract API for communicating with the device
//!

use miniscript::bitcoin::hashes::Hash as _;
use miniscript::bitcoin::{self, bip32};

use crate::constants::apdu::ledger::sw;
use crate::constants::tx;
use crate::util::fingerprint;
use crate::Error;
use self::message::{Apdu, Command, InputStart};

pub mod chunk;
pub mod encode;
pub mod ledger;
pub mod message;

/// An input as staged on the device for signing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedInput {
    /// Device-issued trusted input, or the locally built segwit equivalent
    pub blob: Vec<u8>,
    /// Whether the blob is a segwit input, which is sent without length prefix
    pub segwit: bool,
    /// Script revealed to the device while this input is being signed
    pub script: bitcoin::ScriptBuf,
}

impl TrustedInput {
    /// Wraps a blob returned by GET TRUSTED INPUT
    pub fn trusted(blob: Vec<u8>, script: bitcoin::ScriptBuf) -> Self {
        TrustedInput {
            blob,
            segwit: false,
            script,
        }
    }

    /// Builds a segwit input: `[txid:32][vout:4 LE][value:8 LE]`
    pub fn segwit(
        outpoint: bitcoin::OutPoint,
        value: bitcoin::Amount,
        script: bitcoin::ScriptBuf,
    ) -> Self {
        let mut blob = Vec::with_capacity(tx::PREVOUT_SIZE + 8);
        blob.extend(outpoint.txid.to_byte_array());
        blob.extend(outpoint.vout.to_le_bytes());
        blob.extend(value.to_sat().to_le_bytes());
        TrustedInput {
            blob,
            segwit: true,
            script,
        }
    }
}

/// Trait representing an abstract hardware wallet
pub trait Dongle {
    /// Sends a single APDU to the device and returns the response payload.
    /// A status word other than 0x9000 is returned as an error. Generally
    /// this function is never used directly.
    fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>, Error>;

    /// Sends every APDU of a command in turn and assembles the reply
    fn send<C: Command>(&mut self, mut cmd: C) -> Result<C::Reply, Error>
    where
        Self: Sized,
    {
        while let Some(apdu) = cmd.encode_next() {
            let reply = self.exchange(&apdu)?;
            cmd.decode_reply(reply)?;
        }
        cmd.into_reply()
    }

    /// Queries the device for the public key and chain code at a BIP32 path
    fn get_public_key(
        &mut self,
        bip32_path: &bip32::DerivationPath,
    ) -> Result<message::WalletPublicKey, Error>
    where
        Self: Sized,
    {
        self.send(message::GetWalletPublicKey::new(bip32_path)?)
    }

    /// Obtains the extended public key at a path, without its parent fingerprint
    fn get_node(
        &mut self,
        network: bitcoin::Network,
        bip32_path: &bip32::DerivationPath,
    ) -> Result<bip32::Xpub, Error>
    where
        Self: Sized,
    {
        let wpk = self.get_public_key(bip32_path)?;
        let cnums: &[bip32::ChildNumber] = bip32_path.as_ref();
        Ok(bip32::Xpub {
            network,
            depth: cnums.len() as u8,
            parent_fingerprint: Default::default(),
            child_number: cnums
                .last()
                .copied()
                .unwrap_or(bip32::ChildNumber::Normal { index: 0 }),
            public_key: wpk.public_key,
            chain_code: wpk.chain_code,
        })
    }

    /// Obtains the extended public key at a path, complete with the
    /// fingerprint of its parent
    ///
    /// The device does not report fingerprints, so for paths longer than one
    /// element the parent key is queried first.
    fn get_node_with_fingerprint(
        &mut self,
        network: bitcoin::Network,
        bip32_path: &bip32::DerivationPath,
    ) -> Result<bip32::Xpub, Error>
    where
        Self: Sized,
    {
        let cnums: &[bip32::ChildNumber] = bip32_path.as_ref();
        let parent_fingerprint = if cnums.len() > 1 {
            let parent_path = bip32::DerivationPath::from(&cnums[..cnums.len() - 1]);
            let parent = self.get_public_key(&parent_path)?;
            fingerprint(&parent.public_key)
        } else {
            Default::default()
        };

        let mut node = self.get_node(network, bip32_path)?;
        node.parent_fingerprint = parent_fingerprint;
        Ok(node)
    }

    /// Uploads a supporting transaction and obtains the trusted input for one
    /// of its outputs
    fn get_trusted_input(
        &mut self,
        tx: &bitcoin::Transaction,
        vout: u32,
    ) -> Result<Vec<u8>, Error>
    where
        Self: Sized,
    {
        self.send(message::GetTrustedInput::new(tx, vout)?)
    }

    /// Stages the inputs of the transaction being signed
    ///
    /// Only the input at `focus`, if any, has its script revealed.
    fn start_untrusted_transaction(
        &mut self,
        version: u32,
        inputs: &[TrustedInput],
        focus: Option<usize>,
        start: InputStart,
        rbf: bool,
    ) -> Result<(), Error>
    where
        Self: Sized,
    {
        self.send(message::UntrustedHashTransactionInputStart::new(
            version, inputs, focus, start, rbf,
        )?)
    }

    /// Uploads the outputs of the transaction being signed, after which the
    /// device asks the user to confirm them
    fn finalize_input_full(
        &mut self,
        outputs: &[bitcoin::TxOut],
        change_path: Option<&bip32::DerivationPath>,
    ) -> Result<(), Error>
    where
        Self: Sized,
    {
        self.send(message::UntrustedHashTransactionInputFinalizeFull::new(
            outputs,
            change_path,
        )?)
    }

    /// Asks the device to sign the staged input with the key at `bip32_path`
    ///
    /// Returns the DER signature, its first byte normalized, followed by the
    /// sighash byte.
    fn hash_sign(
        &mut self,
        bip32_path: &bip32::DerivationPath,
        lock_time: u32,
    ) -> Result<Vec<u8>, Error>
    where
        Self: Sized,
    {
        self.send(message::UntrustedHashSign::new(bip32_path, lock_time)?)
    }
}

/// Checks the status word of a response
pub fn check_status(apdu: &Apdu, status: u16) -> Result<(), Error> {
    if status == sw::OK {
        Ok(())
    } else {
        if status == sw::INS_NOT_SUPPORTED {
            log::warn!("device does not know {}, is the Bitcoin app open?", apdu.ins);
        }
        Err(Error::ResponseBadStatus {
            apdu: apdu.ins,
            status,
        })
    }
}

#[cfg(test)]
pub mod test_support {
    //! In-memory dongle used by unit tests across the crate

    use std::collections::HashSet;

    use miniscript::bitcoin::{bip32, secp256k1, Network};

    use super::message::Apdu;
    use super::Dongle;
    use crate::constants::apdu::ledger::{sw, Instruction};
    use crate::Error;

    /// Answers GET WALLET PUBLIC KEY from a BIP32 master key, HASH SIGN with
    /// a fixed signature, everything else with an empty payload
    pub struct MockDongle {
        secp: secp256k1::Secp256k1<secp256k1::All>,
        master: bip32::Xpriv,
        /// Every APDU received, in order
        pub log: Vec<Apdu>,
        refused: HashSet<Instruction>,
    }

    impl MockDongle {
        /// Creates a mock dongle with a fixed master key
        pub fn new() -> Self {
            MockDongle {
                secp: secp256k1::Secp256k1::new(),
                master: bip32::Xpriv::new_master(Network::Bitcoin, &[0x17; 32]).unwrap(),
                log: vec![],
                refused: HashSet::new(),
            }
        }

        /// Makes the user refuse every APDU of an instruction
        pub fn refuse(&mut self, ins: Instruction) {
            self.refused.insert(ins);
        }

        /// The public key the device holds at `path`
        pub fn public_key(&self, path: &bip32::DerivationPath) -> secp256k1::PublicKey {
            let xpriv = self.master.derive_priv(&self.secp, path).unwrap();
            secp256k1::PublicKey::from_secret_key(&self.secp, &xpriv.private_key)
        }

        /// Number of APDUs received for an instruction
        pub fn count(&self, ins: Instruction) -> usize {
            self.log.iter().filter(|apdu| apdu.ins == ins).count()
        }

        /// APDUs received for an instruction
        pub fn sent(&self, ins: Instruction) -> Vec<&Apdu> {
            self.log.iter().filter(|apdu| apdu.ins == ins).collect()
        }
    }

    impl Dongle for MockDongle {
        fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>, Error> {
            self.log.push(apdu.clone());
            if self.refused.contains(&apdu.ins) {
                return Err(Error::ResponseBadStatus {
                    apdu: apdu.ins,
                    status: sw::CANCELED_BY_USER,
                });
            }
            match apdu.ins {
                Instruction::GetWalletPublicKey => {
                    let data = apdu.data();
                    let path: Vec<bip32::ChildNumber> = data[1..]
                        .chunks(4)
                        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]).into())
                        .collect();
                    let path = bip32::DerivationPath::from(path);
                    let pk = self.public_key(&path);
                    let xpriv = self.master.derive_priv(&self.secp, &path).unwrap();

                    let mut ret = vec![65];
                    ret.extend(pk.serialize_uncompressed());
                    ret.push(3);
                    ret.extend(b"xyz");
                    ret.extend(&xpriv.chain_code[..]);
                    Ok(ret)
                }
                Instruction::GetTrustedInput => {
                    // only the lock time APDU yields the blob
                    if apdu.data().len() == 4 {
                        Ok(vec![0x32; 56])
                    } else {
                        Ok(vec![])
                    }
                }
                Instruction::UntrustedHashSign => {
                    // DER (r = 1, s = 1) with odd parity marker and sighash byte
                    Ok(vec![0x31, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01])
                }
                _ => Ok(vec![]),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockDongle;
    use super::*;
    use crate::constants::apdu::ledger::Instruction;
    use std::str::FromStr;

    #[test]
    fn node_with_fingerprint() {
        let mut dongle = MockDongle::new();
        let path = bip32::DerivationPath::from_str("m/84'/0'/0'").unwrap();
        let node = dongle
            .get_node_with_fingerprint(bitcoin::Network::Bitcoin, &path)
            .unwrap();

        let parent = bip32::DerivationPath::from_str("m/84'/0'").unwrap();
        assert_eq!(node.depth, 3);
        assert_eq!(node.child_number, bip32::ChildNumber::from_hardened_idx(0).unwrap());
        assert_eq!(node.public_key, dongle.public_key(&path));
        assert_eq!(node.parent_fingerprint, fingerprint(&dongle.public_key(&parent)));
        // parent first, then the node itself
        let sent = dongle.sent(Instruction::GetWalletPublicKey);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data()[0], 2);
        assert_eq!(sent[1].data()[0], 3);
    }

    #[test]
    fn single_element_path_has_zero_fingerprint() {
        let mut dongle = MockDongle::new();
        let path = bip32::DerivationPath::from_str("m/0'").unwrap();
        let node = dongle
            .get_node_with_fingerprint(bitcoin::Network::Bitcoin, &path)
            .unwrap();
        assert_eq!(node.parent_fingerprint, bip32::Fingerprint::default());
        assert_eq!(dongle.count(Instruction::GetWalletPublicKey), 1);
    }

    #[test]
    fn bad_status_is_an_error() {
        let apdu = Apdu::new(Instruction::UntrustedHashSign, 0, 0, vec![]).unwrap();
        assert!(check_status(&apdu, 0x9000).is_ok());
        match check_status(&apdu, 0x6985) {
            Err(e) => assert_eq!(e.category(), crate::ErrorCategory::CancelledByUser),
            Ok(()) => panic!("accepted bad status"),
        }
    }

    #[test]
    fn trusted_input_only_keeps_last_reply() {
        let mut dongle = MockDongle::new();
        let tx = bitcoin::Transaction {
            version: bitcoin::transaction::Version(1),
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(10_000),
                script_pubkey: bitcoin::ScriptBuf::from(vec![0x51]),
            }],
        };
        let blob = dongle.get_trusted_input(&tx, 0).unwrap();
        assert_eq!(blob, vec![0x32; 56]);
        let sent = dongle.sent(Instruction::GetTrustedInput);
        assert_eq!(sent.len(), 1 + 1 + 2 + 1);
        assert_eq!(sent[0].p1, 0x00);
        assert!(sent[1..].iter().all(|apdu| apdu.p1 == 0x80));
    }
}
