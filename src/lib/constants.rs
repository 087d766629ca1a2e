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

//! # Constants
//!
//! Various constants
//!

/// HID-related constants
pub mod hid {
    /// USB vendor ID used by the Nano S and newer Ledger firmware
    pub const VENDOR_ID_NANO_S: u16 = 0x2c97;
    /// USB vendor ID reported by some Nano X units
    pub const VENDOR_ID_NANO_X: u16 = 0x2581;
    /// Interface number of the APDU endpoint (Linux, Windows)
    pub const INTERFACE_NUMBER: i32 = 0;
    /// Usage page of the APDU endpoint (macOS)
    pub const USAGE_PAGE: u16 = 0xffa0;
    /// Leading report ID prepended to every frame we write
    pub const REPORT_ID: u8 = 0x00;
}

/// Communication constants
pub mod apdu {
    /// Ledger-specific APDU constants
    #[allow(missing_docs)]
    pub mod ledger {
        use core::fmt;

        pub const DEFAULT_CHANNEL: u16 = 0x0101;
        pub const TAG_APDU: u8 = 0x05;
        /// Size of an individual HID frame, excluding the report ID
        pub const PACKET_SIZE: usize = 64;
        /// Header length of the first frame: channel, tag, sequence, length
        pub const FIRST_HEADER_LEN: usize = 7;
        /// Header length of every following frame: channel, tag, sequence
        pub const NEXT_HEADER_LEN: usize = 5;
        /// Payload carried by the first frame
        pub const FIRST_BLOCK_SIZE: usize = PACKET_SIZE - FIRST_HEADER_LEN;
        /// Payload carried by every following frame
        pub const NEXT_BLOCK_SIZE: usize = PACKET_SIZE - NEXT_HEADER_LEN;
        /// Maximum payload of a single APDU (one-byte length field)
        pub const MAX_PAYLOAD_SIZE: usize = 255;

        pub const BTCHIP_CLA: u8 = 0xe0;

        /// Instructions
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub enum Instruction {
            GetWalletPublicKey,
            GetTrustedInput,
            UntrustedHashTransactionInputStart,
            UntrustedHashSign,
            UntrustedHashTransactionInputFinalizeFull,
        }

        impl Instruction {
            /// The INS byte of the instruction
            pub fn into_u8(self) -> u8 {
                match self {
                    Instruction::GetWalletPublicKey => 0x40,
                    Instruction::GetTrustedInput => 0x42,
                    Instruction::UntrustedHashTransactionInputStart => 0x44,
                    Instruction::UntrustedHashSign => 0x48,
                    Instruction::UntrustedHashTransactionInputFinalizeFull => 0x4a,
                }
            }

            /// Looks up an instruction by its INS byte
            pub fn from_u8(ins: u8) -> Option<Self> {
                match ins {
                    0x40 => Some(Instruction::GetWalletPublicKey),
                    0x42 => Some(Instruction::GetTrustedInput),
                    0x44 => Some(Instruction::UntrustedHashTransactionInputStart),
                    0x48 => Some(Instruction::UntrustedHashSign),
                    0x4a => Some(Instruction::UntrustedHashTransactionInputFinalizeFull),
                    _ => None,
                }
            }
        }

        impl fmt::Display for Instruction {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let name = match *self {
                    Instruction::GetWalletPublicKey => "GET WALLET PUBLIC KEY",
                    Instruction::GetTrustedInput => "GET TRUSTED INPUT",
                    Instruction::UntrustedHashTransactionInputStart => {
                        "UNTRUSTED HASH TRANSACTION INPUT START"
                    }
                    Instruction::UntrustedHashSign => "UNTRUSTED HASH SIGN",
                    Instruction::UntrustedHashTransactionInputFinalizeFull => {
                        "UNTRUSTED HASH TRANSACTION INPUT FINALIZE FULL"
                    }
                };
                f.write_str(name)
            }
        }

        /// Status Words
        pub mod sw {
            pub const OK: u16 = 0x9000;
            pub const INS_NOT_SUPPORTED: u16 = 0x6d00;
            pub const NO_ENVIRONMENT: u16 = 0x6982;
            pub const CANCELED_BY_USER: u16 = 0x6985;
            pub const RECONNECT_DEVICE: u16 = 0x6faa;
        }
    }
}

/// Bitcoin transaction protocol constants, as the Ledger BTC app expects them
pub mod tx {
    /// Transaction version used when the request does not name one
    pub const DEFAULT_VERSION: u32 = 1;
    /// Input sequence number of a final (non-RBF) input
    pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;
    /// Amount subtracted from [`DEFAULT_SEQUENCE`] to signal replace-by-fee
    pub const RBF_SEQUENCE_OFFSET: u32 = 2;
    /// Marker preceding a device-issued trusted input blob
    pub const TRUSTED_INPUT_FLAG: u8 = 0x01;
    /// Marker preceding a locally built segwit input
    pub const SEGWIT_INPUT_FLAG: u8 = 0x02;
    /// Size of a serialized outpoint
    pub const PREVOUT_SIZE: usize = 36;
    /// Chunk size used when uploading the serialized outputs
    pub const OUT_CHUNK_SIZE: usize = 255;
    /// Largest script we can upload in a single APDU alongside a sequence number
    pub const MAX_SCRIPT_SIZE: usize = 250;
    /// Longest BIP32 path the device accepts
    pub const MAX_PATH_LEN: usize = 10;
    /// SIGHASH_ALL
    pub const SIGHASH_ALL: u8 = 0x01;
}

/// BIP44-style purposes the wallet layer tracks
pub mod purpose {
    /// Legacy P2PKH accounts
    pub const LEGACY: u32 = 44;
    /// P2SH-wrapped P2WPKH accounts
    pub const NESTED_SEGWIT: u32 = 49;
    /// Native P2WPKH accounts
    pub const NATIVE_SEGWIT: u32 = 84;
}
