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

//! # Miscellaneous Functions

use miniscript::bitcoin::{self, bip32, consensus, secp256k1};
use miniscript::bitcoin::hashes::{hash160, Hash};

/// Encodes `n` as a Bitcoin compact-size integer
pub fn varint(n: usize) -> Vec<u8> {
    consensus::serialize(&bitcoin::VarInt(n as u64))
}

/// Computes the BIP32 fingerprint of a key: the first four bytes of its hash160
pub fn fingerprint(key: &secp256k1::PublicKey) -> bip32::Fingerprint {
    let hash = hash160::Hash::hash(&key.serialize()).to_byte_array();
    bip32::Fingerprint::from([hash[0], hash[1], hash[2], hash[3]])
}

/// Forces the leading byte of a Ledger signature to the DER SEQUENCE tag
///
/// The Ledger signature format is a bit funny. It is ASN.1 according to
/// the docs, but the first byte, which is uniformly 0x30 (SEQUENCE OF) in
/// DER, is alternately 0x30 (SEQUENCE OF) or 0x31 (SET OF), the low bit
/// carrying the parity of the nonce point.
pub fn normalize_ledger_signature(sig: &mut [u8]) {
    if let Some(first) = sig.first_mut() {
        *first = 0x30;
    }
}

/// Parse a Ledger-encoded transaction signature
///
/// May edit the passed signature in place. Make a copy if you need to preserve
/// it for some reason.
///
/// The device appends the sighash byte after the DER sequence, so we cut the
/// data at the length announced by the sequence header before parsing it
/// with `from_der_lax`.
pub fn parse_ledger_signature(
    sig: &mut [u8],
) -> Result<secp256k1::ecdsa::Signature, secp256k1::Error> {
    normalize_ledger_signature(sig);
    let der_len = match sig.get(1) {
        Some(&len) if 2 + usize::from(len) <= sig.len() => 2 + usize::from(len),
        _ => sig.len(),
    };
    secp256k1::ecdsa::Signature::from_der_lax(&sig[..der_len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn compact_size() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(1), vec![0x01]);
        assert_eq!(varint(252), vec![0xfc]);
        assert_eq!(varint(253), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(varint(65535), vec![0xfd, 0xff, 0xff]);
        assert_eq!(varint(65536), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(
            varint(0x1_0000_0000),
            vec![0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn bip32_test_vector_fingerprint() {
        // Master key of BIP32 test vector 1
        let master = secp256k1::PublicKey::from_str(
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2",
        )
        .unwrap();
        assert_eq!(fingerprint(&master), bip32::Fingerprint::from([0x34, 0x42, 0x19, 0x3e]));
    }

    #[test]
    fn fingerprint_is_hash160_prefix() {
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[0x42; 32]).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        let hash = hash160::Hash::hash(&pk.serialize());
        assert_eq!(fingerprint(&pk).as_bytes()[..], hash[..4]);
    }

    #[test]
    fn ledger_signature_roundtrip() {
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[0xcd; 32]).unwrap();
        let msg = secp256k1::Message::from_digest_slice(&[0xab; 32]).unwrap();
        let sig = secp.sign_ecdsa(&msg, &sk);

        let mut ledger_sig = sig.serialize_der().to_vec();
        ledger_sig[0] = 0x31;
        ledger_sig.push(0x01); // sighash byte

        let parsed = parse_ledger_signature(&mut ledger_sig).unwrap();
        assert_eq!(parsed, sig);
        assert_eq!(ledger_sig[0], 0x30);
    }

    #[test]
    fn normalize_empty() {
        let mut sig: [u8; 0] = [];
        normalize_ledger_signature(&mut sig);
    }
}
