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

//! Transaction Encodings
//!
//! Builds the APDU payloads used to send transactions to the Ledger,
//! split only at the locations the Bitcoin app accepts. Device framing
//! fields (path elements, the trusted input index, the signing lock time)
//! are big-endian; Bitcoin fields are little-endian.
//!

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use miniscript::bitcoin::{self, bip32, consensus};

use super::TrustedInput;
use crate::constants::tx;
use crate::util::varint;
use crate::Error;

/// Appends a 32-bit integer in byte order `B`
fn put_u32<B: ByteOrder>(buf: &mut Vec<u8>, n: u32) {
    let mut bytes = [0; 4];
    B::write_u32(&mut bytes, n);
    buf.extend(bytes);
}

/// Appends a 64-bit integer in byte order `B`
fn put_u64<B: ByteOrder>(buf: &mut Vec<u8>, n: u64) {
    let mut bytes = [0; 8];
    B::write_u64(&mut bytes, n);
    buf.extend(bytes);
}

/// Checks that a script fits in a single APDU alongside its neighbours
fn check_script(script: &bitcoin::Script) -> Result<(), Error> {
    if script.len() > tx::MAX_SCRIPT_SIZE {
        Err(Error::ScriptTooLarge(script.len()))
    } else {
        Ok(())
    }
}

/// Encodes a BIP32 path as `[n][element:4 BE]*n`
pub fn path(bip32_path: &bip32::DerivationPath) -> Result<Vec<u8>, Error> {
    let cnums: &[bip32::ChildNumber] = bip32_path.as_ref();
    if cnums.len() > tx::MAX_PATH_LEN {
        return Err(Error::BadDerivationPath(bip32_path.clone()));
    }

    let mut ret = Vec::with_capacity(1 + 4 * cnums.len());
    ret.push(cnums.len() as u8);
    for &childnum in cnums {
        put_u32::<BigEndian>(&mut ret, u32::from(childnum));
    }
    Ok(ret)
}

/// Encodes a supporting transaction for GET TRUSTED INPUT, one payload per APDU
pub fn trusted_input(tx: &bitcoin::Transaction, vout: u32) -> Result<Vec<Vec<u8>>, Error> {
    let mut ret = Vec::with_capacity(3 + 2 * (tx.input.len() + tx.output.len()));

    let mut header = Vec::with_capacity(17);
    put_u32::<BigEndian>(&mut header, vout);
    put_u32::<LittleEndian>(&mut header, tx.version.0 as u32);
    header.extend(varint(tx.input.len()));
    ret.push(header);

    for input in &tx.input {
        check_script(&input.script_sig)?;

        // We are not allowed to split within the outpoint or before the
        // scriptSig length, so those go together.
        let mut prevout = consensus::serialize(&input.previous_output);
        prevout.extend(varint(input.script_sig.len()));
        ret.push(prevout);

        let mut script_sig = input.script_sig.to_bytes();
        put_u32::<LittleEndian>(&mut script_sig, input.sequence.0);
        ret.push(script_sig);
    }

    ret.push(varint(tx.output.len()));
    for output in &tx.output {
        check_script(&output.script_pubkey)?;

        let mut value = Vec::with_capacity(17);
        put_u64::<LittleEndian>(&mut value, output.value.to_sat());
        value.extend(varint(output.script_pubkey.len()));
        ret.push(value);
        ret.push(output.script_pubkey.to_bytes());
    }

    let mut lock_time = Vec::with_capacity(4);
    put_u32::<LittleEndian>(&mut lock_time, tx.lock_time.to_consensus_u32());
    ret.push(lock_time);
    Ok(ret)
}

/// Encodes the UNTRUSTED HASH TRANSACTION INPUT START init payload
pub fn untrusted_init(version: u32, n_inputs: usize) -> Vec<u8> {
    let mut ret = Vec::with_capacity(13);
    put_u32::<LittleEndian>(&mut ret, version);
    ret.extend(varint(n_inputs));
    ret
}

/// Encodes the two payloads staging a single input
///
/// The first carries the input marker, its blob and the length of the
/// revealed script, which is zero unless `reveal` is set. The second carries
/// the script itself, if revealed, and the sequence number.
pub fn untrusted_input(
    input: &TrustedInput,
    reveal: bool,
    sequence: u32,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let script: &[u8] = if reveal {
        check_script(&input.script)?;
        input.script.as_bytes()
    } else {
        &[]
    };

    let mut first = Vec::with_capacity(2 + input.blob.len() + 1);
    if input.segwit {
        first.push(tx::SEGWIT_INPUT_FLAG);
    } else {
        first.push(tx::TRUSTED_INPUT_FLAG);
        first.push(input.blob.len() as u8);
    }
    first.extend(&input.blob);
    first.extend(varint(script.len()));

    let mut second = Vec::with_capacity(script.len() + 4);
    second.extend(script);
    put_u32::<LittleEndian>(&mut second, sequence);
    Ok((first, second))
}

/// Encodes the complete output list as `[varint n][TxOut]*n`
pub fn outputs(outputs: &[bitcoin::TxOut]) -> Vec<u8> {
    let mut ret = varint(outputs.len());
    for output in outputs {
        ret.extend(consensus::serialize(output));
    }
    ret
}

/// Encodes the UNTRUSTED HASH SIGN payload
pub fn hash_sign(
    bip32_path: &bip32::DerivationPath,
    lock_time: u32,
    sighash: u8,
) -> Result<Vec<u8>, Error> {
    let mut ret = path(bip32_path)?;
    ret.push(0x00); // user validation code
    put_u32::<BigEndian>(&mut ret, lock_time);
    ret.push(sighash);
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniscript::bitcoin::absolute::LockTime;
    use miniscript::bitcoin::hashes::Hash;
    use miniscript::bitcoin::transaction::Version;
    use miniscript::bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};
    use std::str::FromStr;

    #[test]
    fn integer_writers_append() {
        let mut buf = vec![0xee];
        put_u32::<BigEndian>(&mut buf, 0x0102_0304);
        put_u32::<LittleEndian>(&mut buf, 0x0102_0304);
        put_u64::<LittleEndian>(&mut buf, 0x0102);
        assert_eq!(
            buf,
            [0xee, 1, 2, 3, 4, 4, 3, 2, 1, 2, 1, 0, 0, 0, 0, 0, 0]
        );
    }

    fn supporting_tx() -> bitcoin::Transaction {
        bitcoin::Transaction {
            version: Version(2),
            lock_time: LockTime::from_consensus(0x0001_0203),
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([0x11; 32]),
                    vout: 3,
                },
                script_sig: ScriptBuf::from(vec![0xab; 5]),
                sequence: Sequence(0xffff_fffe),
                witness: Witness::new(),
            }],
            output: vec![
                TxOut {
                    value: Amount::from_sat(0x0102),
                    script_pubkey: ScriptBuf::from(vec![0x51]),
                },
                TxOut {
                    value: Amount::from_sat(5),
                    script_pubkey: ScriptBuf::new(),
                },
            ],
        }
    }

    #[test]
    fn path_is_big_endian() {
        let p = bip32::DerivationPath::from_str("m/49'/1'/0'/1/300").unwrap();
        assert_eq!(
            path(&p).unwrap(),
            vec![
                5, 0x80, 0, 0, 49, 0x80, 0, 0, 1, 0x80, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0x01, 0x2c
            ]
        );
        let long = bip32::DerivationPath::from(vec![bip32::ChildNumber::from(0); 11]);
        assert!(matches!(path(&long), Err(Error::BadDerivationPath(..))));
    }

    #[test]
    fn trusted_input_sequence() {
        let payloads = trusted_input(&supporting_tx(), 1).unwrap();
        // header, 2 per input, output count, 2 per output, lock time
        assert_eq!(payloads.len(), 1 + 2 + 1 + 4 + 1);

        assert_eq!(payloads[0], vec![0, 0, 0, 1, 2, 0, 0, 0, 1]);

        let mut prevout = vec![0x11; 32];
        prevout.extend([3, 0, 0, 0, 5]);
        assert_eq!(payloads[1], prevout);
        assert_eq!(payloads[2], vec![0xab, 0xab, 0xab, 0xab, 0xab, 0xfe, 0xff, 0xff, 0xff]);

        assert_eq!(payloads[3], vec![2]);
        assert_eq!(payloads[4], vec![0x02, 0x01, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(payloads[5], vec![0x51]);
        assert_eq!(payloads[6], vec![5, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(payloads[7].is_empty());

        assert_eq!(payloads[8], vec![0x03, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn trusted_input_rejects_large_scripts() {
        let mut tx = supporting_tx();
        tx.output[1].script_pubkey = ScriptBuf::from(vec![0x6a; 251]);
        assert!(matches!(trusted_input(&tx, 0), Err(Error::ScriptTooLarge(251))));
    }

    #[test]
    fn segwit_input_blob() {
        let outpoint = OutPoint {
            txid: Txid::from_byte_array([0x22; 32]),
            vout: 0x0102,
        };
        let input = TrustedInput::segwit(outpoint, Amount::from_sat(0x0a0b), ScriptBuf::new());
        let (first, second) = untrusted_input(&input, false, 0xffff_ffff).unwrap();

        let mut expected = vec![0x02];
        expected.extend([0x22; 32]);
        expected.extend([0x02, 0x01, 0, 0]);
        expected.extend([0x0b, 0x0a, 0, 0, 0, 0, 0, 0]);
        expected.push(0);
        assert_eq!(first, expected);
        assert_eq!(second, vec![0xff; 4]);
    }

    #[test]
    fn hash_sign_lock_time_is_big_endian() {
        let p = bip32::DerivationPath::from_str("m/0").unwrap();
        assert_eq!(
            hash_sign(&p, 0x0a0b_0c0d, 0x01).unwrap(),
            vec![1, 0, 0, 0, 0, 0x00, 0x0a, 0x0b, 0x0c, 0x0d, 0x01]
        );
    }

    #[test]
    fn init_payload() {
        assert_eq!(untrusted_init(2, 300), vec![2, 0, 0, 0, 0xfd, 0x2c, 0x01]);
    }
}
