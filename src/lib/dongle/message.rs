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

//! # Messages
//!
//! Structured versions of the APDU messages used for signing.
//! These are documented in the [btchip documentation](https://ledgerhq.github.io/btchip-doc/bitcoin-technical-beta.html)
//!

use std::collections::VecDeque;
use std::fmt;

use miniscript::bitcoin::{self, bip32};

use super::encode;
use super::TrustedInput;
use crate::constants::apdu::ledger::{self, Instruction};
use crate::constants::tx;
use crate::util::normalize_ledger_signature;
use crate::Error;

/// A single APDU command
#[derive(Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Class byte
    pub cla: u8,
    /// Instruction
    pub ins: Instruction,
    /// First parameter
    pub p1: u8,
    /// Second parameter
    pub p2: u8,
    data: Vec<u8>,
}

impl Apdu {
    /// Constructs a command in the BTChip class
    ///
    /// Fails if the payload does not fit a one-byte length field.
    pub fn new(ins: Instruction, p1: u8, p2: u8, data: Vec<u8>) -> Result<Apdu, Error> {
        if data.len() > ledger::MAX_PAYLOAD_SIZE {
            return Err(Error::ApduTooLong(data.len()));
        }
        Ok(Apdu {
            cla: ledger::BTCHIP_CLA,
            ins,
            p1,
            p2,
            data,
        })
    }

    /// The four header bytes
    pub fn header(&self) -> [u8; 4] {
        [self.cla, self.ins.into_u8(), self.p1, self.p2]
    }

    /// The payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the command as it is sent on the wire
    pub fn encode(&self) -> Vec<u8> {
        let mut ret = Vec::with_capacity(5 + self.data.len());
        ret.extend(self.header());
        // length checked at construction
        ret.push(self.data.len() as u8);
        ret.extend(&self.data);
        ret
    }
}

impl fmt::Debug for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{:02x} {:02x}] {}",
            self.ins,
            self.p1,
            self.p2,
            hex::encode(&self.data)
        )
    }
}

/// A message that can be sent to the dongle
///
/// A command may span several APDUs. Each one is sent in turn and its reply,
/// status word already checked, is handed back to the command.
pub trait Command {
    /// The assembled reply
    type Reply;

    /// The next APDU to send, or None if there are no remaining APDUs
    fn encode_next(&mut self) -> Option<Apdu>;

    /// Used to update a (potentially multipart) reply
    fn decode_reply(&mut self, data: Vec<u8>) -> Result<(), Error>;

    /// Pull the command apart into the full assembled reply
    fn into_reply(self) -> Result<Self::Reply, Error>;
}

/// A command whose APDUs are all known in advance
///
/// Only the reply to the last APDU is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Batch {
    apdus: VecDeque<Apdu>,
    reply: Vec<u8>,
}

impl Batch {
    fn new(apdus: Vec<Apdu>) -> Self {
        Batch {
            apdus: apdus.into(),
            reply: vec![],
        }
    }

    fn encode_next(&mut self) -> Option<Apdu> {
        self.apdus.pop_front()
    }

    fn decode_reply(&mut self, data: Vec<u8>) {
        self.reply = data;
    }
}

/// GET WALLET PUBLIC KEY message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetWalletPublicKey {
    batch: Batch,
}

impl GetWalletPublicKey {
    /// Constructor; the key is not displayed on the device
    pub fn new(bip32_path: &bip32::DerivationPath) -> Result<Self, Error> {
        let payload = encode::path(bip32_path)?;
        Ok(GetWalletPublicKey {
            batch: Batch::new(vec![Apdu::new(
                Instruction::GetWalletPublicKey,
                0x00,
                0x00,
                payload,
            )?]),
        })
    }
}

impl Command for GetWalletPublicKey {
    type Reply = WalletPublicKey;

    fn encode_next(&mut self) -> Option<Apdu> {
        self.batch.encode_next()
    }

    fn decode_reply(&mut self, data: Vec<u8>) -> Result<(), Error> {
        self.batch.decode_reply(data);
        Ok(())
    }

    fn into_reply(self) -> Result<WalletPublicKey, Error> {
        WalletPublicKey::decode(&self.batch.reply)
    }
}

/// Response to the GET WALLET PUBLIC KEY message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletPublicKey {
    /// The EC public key
    pub public_key: bitcoin::secp256k1::PublicKey,
    /// The address corresponding to the public key, as rendered by the device
    pub address: String,
    /// The BIP32 chain code associated to this key
    pub chain_code: bip32::ChainCode,
}

impl WalletPublicKey {
    /// Decodes `[pkLen][pk][addrLen][addr][chaincode:32]`
    ///
    /// Fields are located through their length prefixes. Firmware versions
    /// disagree on what follows the chain code, so trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<WalletPublicKey, Error> {
        let pk_len = usize::from(*data.first().ok_or(Error::UnexpectedEof)?);
        let addr_pos = 1 + pk_len;
        let addr_len = usize::from(*data.get(addr_pos).ok_or(Error::UnexpectedEof)?);
        let cc_pos = addr_pos + 1 + addr_len;
        let expected_len = cc_pos + 32;
        if data.len() < expected_len {
            return Err(Error::ResponseWrongLength {
                apdu: Instruction::GetWalletPublicKey,
                expected: expected_len..usize::MAX,
                found: data.len(),
            });
        }
        if data.len() > expected_len {
            log::debug!(
                "ignoring {} trailing bytes in public key response",
                data.len() - expected_len
            );
        }

        // The ledger will return an uncompressed public key; it is
        // parsed as a secp pubkey and serialized compressed from then on.
        let public_key = bitcoin::secp256k1::PublicKey::from_slice(&data[1..addr_pos])?;
        let address = String::from_utf8_lossy(&data[addr_pos + 1..cc_pos]).into_owned();
        let mut cc_bytes = [0u8; 32];
        cc_bytes.copy_from_slice(&data[cc_pos..expected_len]);

        Ok(WalletPublicKey {
            public_key,
            address,
            chain_code: bip32::ChainCode::from(cc_bytes),
        })
    }
}

/// GET TRUSTED INPUT message
///
/// Uploads a whole supporting transaction, one field group per APDU. The
/// reply to the final (lock time) APDU is the trusted input blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTrustedInput {
    batch: Batch,
}

impl GetTrustedInput {
    /// Constructor
    pub fn new(tx: &bitcoin::Transaction, vout: u32) -> Result<GetTrustedInput, Error> {
        let apdus = encode::trusted_input(tx, vout)?
            .into_iter()
            .enumerate()
            .map(|(n, payload)| {
                let p1 = if n == 0 { 0x00 } else { 0x80 };
                Apdu::new(Instruction::GetTrustedInput, p1, 0x00, payload)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GetTrustedInput {
            batch: Batch::new(apdus),
        })
    }
}

impl Command for GetTrustedInput {
    type Reply = Vec<u8>;

    fn encode_next(&mut self) -> Option<Apdu> {
        self.batch.encode_next()
    }

    fn decode_reply(&mut self, data: Vec<u8>) -> Result<(), Error> {
        // Note that only the last reply is nonempty for this one
        self.batch.decode_reply(data);
        Ok(())
    }

    fn into_reply(self) -> Result<Vec<u8>, Error> {
        if self.batch.reply.is_empty() {
            return Err(Error::ResponseWrongLength {
                apdu: Instruction::GetTrustedInput,
                expected: 1..ledger::MAX_PAYLOAD_SIZE + 1,
                found: 0,
            });
        }
        Ok(self.batch.reply)
    }
}

/// Whether an UNTRUSTED HASH TRANSACTION INPUT START opens a new transaction
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InputStart {
    /// First staging of a new transaction
    New,
    /// Restaging of a transaction the device already knows
    Continue,
}

/// UNTRUSTED HASH TRANSACTION INPUT START message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedHashTransactionInputStart {
    batch: Batch,
}

impl UntrustedHashTransactionInputStart {
    /// Constructor
    ///
    /// Stages `inputs`, revealing only the script of the input at `focus`.
    /// All inputs must be of the same kind (trusted or segwit), which decides
    /// the framing of the init APDU.
    pub fn new(
        version: u32,
        inputs: &[TrustedInput],
        focus: Option<usize>,
        start: InputStart,
        rbf: bool,
    ) -> Result<UntrustedHashTransactionInputStart, Error> {
        let segwit = inputs.iter().any(|input| input.segwit);
        let p2 = match (start, segwit) {
            (InputStart::New, false) => 0x00,
            (InputStart::New, true) => 0x02,
            (InputStart::Continue, _) => 0x80,
        };
        let sequence = if rbf {
            tx::DEFAULT_SEQUENCE - tx::RBF_SEQUENCE_OFFSET
        } else {
            tx::DEFAULT_SEQUENCE
        };

        let mut apdus = Vec::with_capacity(1 + 2 * inputs.len());
        apdus.push(Apdu::new(
            Instruction::UntrustedHashTransactionInputStart,
            0x00,
            p2,
            encode::untrusted_init(version, inputs.len()),
        )?);
        for (n, input) in inputs.iter().enumerate() {
            let (first, second) = encode::untrusted_input(input, focus == Some(n), sequence)?;
            apdus.push(Apdu::new(
                Instruction::UntrustedHashTransactionInputStart,
                0x80,
                0x00,
                first,
            )?);
            apdus.push(Apdu::new(
                Instruction::UntrustedHashTransactionInputStart,
                0x80,
                0x00,
                second,
            )?);
        }
        Ok(UntrustedHashTransactionInputStart {
            batch: Batch::new(apdus),
        })
    }
}

impl Command for UntrustedHashTransactionInputStart {
    type Reply = ();

    fn encode_next(&mut self) -> Option<Apdu> {
        self.batch.encode_next()
    }

    fn decode_reply(&mut self, data: Vec<u8>) -> Result<(), Error> {
        if !data.is_empty() {
            log::debug!("ignoring unexpected input start reply {}", hex::encode(&data));
        }
        Ok(())
    }

    // no reply to this message
    fn into_reply(self) -> Result<(), Error> {
        Ok(())
    }
}

/// UNTRUSTED HASH TRANSACTION INPUT FINALIZE FULL message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedHashTransactionInputFinalizeFull {
    batch: Batch,
}

impl UntrustedHashTransactionInputFinalizeFull {
    /// Constructor
    ///
    /// `outputs` is the complete output list. If `change_path` is given it is
    /// announced first so the device can recognize the change output.
    pub fn new(
        outputs: &[bitcoin::TxOut],
        change_path: Option<&bip32::DerivationPath>,
    ) -> Result<UntrustedHashTransactionInputFinalizeFull, Error> {
        let mut apdus = vec![];
        if let Some(path) = change_path {
            apdus.push(Apdu::new(
                Instruction::UntrustedHashTransactionInputFinalizeFull,
                0xff,
                0x00,
                encode::path(path)?,
            )?);
        }

        let ser_outputs = encode::outputs(outputs);
        let n_chunks = (ser_outputs.len() + tx::OUT_CHUNK_SIZE - 1) / tx::OUT_CHUNK_SIZE;
        for (n, chunk) in ser_outputs.chunks(tx::OUT_CHUNK_SIZE).enumerate() {
            // 0x80 marks the last chunk
            let p1 = if n + 1 == n_chunks { 0x80 } else { 0x00 };
            apdus.push(Apdu::new(
                Instruction::UntrustedHashTransactionInputFinalizeFull,
                p1,
                0x00,
                chunk.to_vec(),
            )?);
        }
        Ok(UntrustedHashTransactionInputFinalizeFull {
            batch: Batch::new(apdus),
        })
    }
}

impl Command for UntrustedHashTransactionInputFinalizeFull {
    type Reply = ();

    fn encode_next(&mut self) -> Option<Apdu> {
        self.batch.encode_next()
    }

    fn decode_reply(&mut self, data: Vec<u8>) -> Result<(), Error> {
        // On the Nano S we only ever receive some variable number of zeros,
        // at most 2 of them, so check the length as a simple sanity check
        if data.len() > 2 {
            return Err(Error::ResponseWrongLength {
                apdu: Instruction::UntrustedHashTransactionInputFinalizeFull,
                expected: 0..3,
                found: data.len(),
            });
        }
        Ok(())
    }

    // no reply to this message
    fn into_reply(self) -> Result<(), Error> {
        Ok(())
    }
}

/// UNTRUSTED HASH SIGN message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedHashSign {
    batch: Batch,
}

impl UntrustedHashSign {
    /// Constructor; signs with SIGHASH_ALL
    pub fn new(bip32_path: &bip32::DerivationPath, tx_locktime: u32) -> Result<Self, Error> {
        let payload = encode::hash_sign(bip32_path, tx_locktime, tx::SIGHASH_ALL)?;
        Ok(UntrustedHashSign {
            batch: Batch::new(vec![Apdu::new(
                Instruction::UntrustedHashSign,
                0x00,
                0x00,
                payload,
            )?]),
        })
    }
}

impl Command for UntrustedHashSign {
    /// DER signature followed by the sighash byte
    type Reply = Vec<u8>;

    fn encode_next(&mut self) -> Option<Apdu> {
        self.batch.encode_next()
    }

    fn decode_reply(&mut self, data: Vec<u8>) -> Result<(), Error> {
        self.batch.decode_reply(data);
        Ok(())
    }

    fn into_reply(mut self) -> Result<Vec<u8>, Error> {
        if self.batch.reply.len() < 2 {
            return Err(Error::UnexpectedEof);
        }
        normalize_ledger_signature(&mut self.batch.reply);
        Ok(self.batch.reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniscript::bitcoin::hashes::Hash;
    use std::str::FromStr;

    fn drain<C: Command>(mut cmd: C) -> Vec<Apdu> {
        let mut ret = vec![];
        while let Some(apdu) = cmd.encode_next() {
            ret.push(apdu);
        }
        ret
    }

    #[test]
    fn apdu_encoding() {
        let apdu = Apdu::new(Instruction::UntrustedHashSign, 0x12, 0x34, vec![0xaa, 0xbb]).unwrap();
        assert_eq!(apdu.header(), [0xe0, 0x48, 0x12, 0x34]);
        assert_eq!(apdu.encode(), vec![0xe0, 0x48, 0x12, 0x34, 0x02, 0xaa, 0xbb]);

        assert!(Apdu::new(Instruction::GetTrustedInput, 0, 0, vec![0; 255]).is_ok());
        assert!(matches!(
            Apdu::new(Instruction::GetTrustedInput, 0, 0, vec![0; 256]),
            Err(Error::ApduTooLong(256))
        ));
    }

    #[test]
    fn get_wallet_public_key_payload() {
        let path = bip32::DerivationPath::from_str("m/84'/0'/0'").unwrap();
        let apdus = drain(GetWalletPublicKey::new(&path).unwrap());
        assert_eq!(apdus.len(), 1);
        assert_eq!(apdus[0].header(), [0xe0, 0x40, 0x00, 0x00]);
        assert_eq!(
            apdus[0].data(),
            &[3, 0x80, 0, 0, 84, 0x80, 0, 0, 0, 0x80, 0, 0, 0][..]
        );
    }

    #[test]
    fn wallet_public_key_decode() {
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let sk = bitcoin::secp256k1::SecretKey::from_slice(&[0x11; 32]).unwrap();
        let pk = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &sk);

        let mut data = vec![65];
        data.extend(pk.serialize_uncompressed());
        data.push(4);
        data.extend(b"1abc");
        data.extend([0x5a; 32]);

        let decoded = WalletPublicKey::decode(&data).unwrap();
        assert_eq!(decoded.public_key, pk);
        assert_eq!(decoded.address, "1abc");
        assert_eq!(decoded.chain_code, bip32::ChainCode::from([0x5a; 32]));

        // trailing bytes are ignored
        data.extend([0x01, 0x02]);
        assert_eq!(WalletPublicKey::decode(&data).unwrap(), decoded);

        // truncated chain code is not
        data.truncate(data.len() - 5);
        assert!(matches!(
            WalletPublicKey::decode(&data),
            Err(Error::ResponseWrongLength { .. })
        ));
        assert!(matches!(WalletPublicKey::decode(&[]), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn finalize_last_chunk_flag() {
        // 1 byte count + 3 * 43 byte outputs = 130 bytes: one chunk
        let out = bitcoin::TxOut {
            value: bitcoin::Amount::from_sat(1000),
            script_pubkey: bitcoin::ScriptBuf::new_p2wsh(&bitcoin::WScriptHash::all_zeros()),
        };
        let outs = vec![out.clone(), out.clone(), out.clone()];
        let apdus = drain(UntrustedHashTransactionInputFinalizeFull::new(&outs, None).unwrap());
        assert_eq!(apdus.len(), 1);
        assert_eq!(apdus[0].p1, 0x80);

        // 1 + 6 * 43 = 259 bytes: two chunks, the flag only on the last one
        let outs = vec![out; 6];
        let path = bip32::DerivationPath::from_str("m/84'/0'/0'/1/7").unwrap();
        let apdus =
            drain(UntrustedHashTransactionInputFinalizeFull::new(&outs, Some(&path)).unwrap());
        assert_eq!(apdus.len(), 3);
        assert_eq!((apdus[0].p1, apdus[0].p2), (0xff, 0x00));
        assert_eq!(apdus[0].data()[0], 5);
        assert_eq!((apdus[1].p1, apdus[1].data().len()), (0x00, 255));
        assert_eq!((apdus[2].p1, apdus[2].data().len()), (0x80, 4));
    }

    #[test]
    fn finalize_exact_multiple_of_chunk_size() {
        // 1 + 254 = 255 bytes exactly: a single chunk which must carry the flag
        let out = bitcoin::TxOut {
            value: bitcoin::Amount::from_sat(1),
            script_pubkey: bitcoin::ScriptBuf::from(vec![0x6a; 245]),
        };
        assert_eq!(bitcoin::consensus::serialize(&out).len(), 254);
        let apdus = drain(UntrustedHashTransactionInputFinalizeFull::new(&[out], None).unwrap());
        assert_eq!(apdus.len(), 1);
        assert_eq!(apdus[0].data().len(), 255);
        assert_eq!(apdus[0].p1, 0x80);
    }

    #[test]
    fn hash_sign_payload_and_reply() {
        let path = bip32::DerivationPath::from_str("m/44'/0'/0'/0/3").unwrap();
        let mut cmd = UntrustedHashSign::new(&path, 0x0102_0304).unwrap();
        let apdu = cmd.encode_next().unwrap();
        assert_eq!(apdu.header(), [0xe0, 0x48, 0x00, 0x00]);
        let data = apdu.data();
        assert_eq!(data.len(), 1 + 20 + 1 + 4 + 1);
        assert_eq!(data[0], 5);
        assert_eq!(data[17..21], [0, 0, 0, 3]);
        assert_eq!(data[21], 0x00);
        assert_eq!(data[22..26], [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(data[26], 0x01);
        assert!(cmd.encode_next().is_none());

        cmd.decode_reply(vec![0x31, 0x02, 0xaa, 0xbb, 0x01]).unwrap();
        assert_eq!(cmd.into_reply().unwrap(), vec![0x30, 0x02, 0xaa, 0xbb, 0x01]);
    }

    #[test]
    fn input_start_framing() {
        let blob = vec![0x42; 56];
        let inputs = vec![
            TrustedInput::trusted(blob.clone(), bitcoin::ScriptBuf::from(vec![0x51; 3])),
            TrustedInput::trusted(blob, bitcoin::ScriptBuf::from(vec![0x52; 4])),
        ];
        let apdus = drain(
            UntrustedHashTransactionInputStart::new(1, &inputs, Some(1), InputStart::New, true)
                .unwrap(),
        );
        assert_eq!(apdus.len(), 5);
        assert_eq!((apdus[0].p1, apdus[0].p2), (0x00, 0x00));
        assert_eq!(apdus[0].data(), &[1, 0, 0, 0, 2][..]);
        for apdu in &apdus[1..] {
            assert_eq!((apdu.p1, apdu.p2), (0x80, 0x00));
        }
        // unfocused: no script, zero length
        assert_eq!(apdus[1].data()[..2], [0x01, 56]);
        assert_eq!(*apdus[1].data().last().unwrap(), 0);
        assert_eq!(apdus[2].data(), &[0xfd, 0xff, 0xff, 0xff][..]);
        // focused: script revealed, RBF sequence
        assert_eq!(*apdus[3].data().last().unwrap(), 4);
        assert_eq!(apdus[4].data(), &[0x52, 0x52, 0x52, 0x52, 0xfd, 0xff, 0xff, 0xff][..]);

        let apdus = drain(
            UntrustedHashTransactionInputStart::new(2, &inputs[..1], None, InputStart::Continue, false)
                .unwrap(),
        );
        assert_eq!(apdus[0].p2, 0x80);
        assert_eq!(apdus[2].data(), &[0xff, 0xff, 0xff, 0xff][..]);
    }
}
