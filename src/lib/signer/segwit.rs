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

//! # Segwit Signing
//!
//! Segwit inputs commit to their own value, so no supporting transaction is
//! uploaded. The whole input set is staged once, the outputs are confirmed,
//! then every input is restaged alone with its script code and signed.
//!

use core::slice;

use miniscript::bitcoin::hashes::{hash160, Hash};
use miniscript::bitcoin::{PubkeyHash, ScriptBuf, WPubkeyHash};

use crate::dongle::message::InputStart;
use crate::dongle::{Dongle, TrustedInput};
use crate::signer::{InputKind, Progress, SignatureResult, SignedInputs, SigningRequest};
use crate::Error;

/// Signs every input of a validated segwit request
///
/// `kinds` gives the kind of every input, as returned by
/// [`SigningRequest::validate`].
pub fn sign<D: Dongle>(
    dongle: &mut D,
    request: &SigningRequest,
    kinds: &[InputKind],
    notify: &mut dyn FnMut(Progress),
) -> Result<SignedInputs, Error> {
    log::info!("signing {} segwit input(s)", request.inputs.len());

    let mut public_keys = Vec::with_capacity(request.inputs.len());
    let mut redeem_scripts = Vec::with_capacity(request.inputs.len());
    let mut staged = Vec::with_capacity(request.inputs.len());
    for (index, (input, kind)) in request.inputs.iter().zip(kinds).enumerate() {
        let node = dongle.get_node_with_fingerprint(request.network, &input.path)?;

        // Rebuild the scripts from the device's key and make sure they are
        // the ones being spent.
        let key_hash = hash160::Hash::hash(&node.public_key.serialize());
        let script_code = ScriptBuf::new_p2pkh(&PubkeyHash::from_raw_hash(key_hash));
        let witness_program = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_raw_hash(key_hash));
        let (expected, redeem_script) = match kind {
            InputKind::NativeSegwit => (witness_program, None),
            InputKind::NestedSegwit => (
                ScriptBuf::new_p2sh(&witness_program.script_hash()),
                Some(witness_program),
            ),
            InputKind::Legacy | InputKind::LegacyP2sh => return Err(Error::MixedInputTypes),
        };
        if expected != input.script_pubkey {
            log::warn!(
                "input {} script {} does not match device key script {}",
                index,
                input.script_pubkey,
                expected
            );
            return Err(Error::ScriptMismatch { index });
        }

        public_keys.push(node);
        redeem_scripts.push(redeem_script);
        staged.push(TrustedInput::segwit(input.outpoint, input.value, script_code));
    }

    notify(Progress::UploadingTransaction);
    dongle.start_untrusted_transaction(request.version, &staged, None, InputStart::New, request.rbf)?;
    notify(Progress::ConfirmOnDevice);
    dongle.finalize_input_full(&request.recipients, request.change_path.as_ref())?;
    notify(Progress::AwaitingSignature);

    let lock_time = request.lock_time.to_consensus_u32();
    let mut signatures = Vec::with_capacity(staged.len());
    for (index, (input, staged_input)) in request.inputs.iter().zip(&staged).enumerate() {
        dongle.start_untrusted_transaction(
            request.version,
            slice::from_ref(staged_input),
            Some(0),
            InputStart::Continue,
            request.rbf,
        )?;
        let der_signature = dongle.hash_sign(&input.path, lock_time)?;
        signatures.push(SignatureResult {
            input_index: index,
            der_signature,
        });
    }

    notify(Progress::Finished);
    Ok(SignedInputs {
        signatures,
        public_keys,
        redeem_scripts,
    })
}
