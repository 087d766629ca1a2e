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

//! # Legacy Signing
//!
//! Every input of a legacy transaction is signed in its own pass: the whole
//! input set is staged again with only that input's script revealed, the
//! outputs are uploaded again, and the device signs. The device rejects the
//! session if passes are merged, so this is quadratic in the input count.
//!

use crate::dongle::message::InputStart;
use crate::dongle::{Dongle, TrustedInput};
use crate::signer::{Progress, SignatureResult, SignedInputs, SigningRequest};
use crate::Error;

/// Signs every input of a validated legacy request
pub fn sign<D: Dongle>(
    dongle: &mut D,
    request: &SigningRequest,
    notify: &mut dyn FnMut(Progress),
) -> Result<SignedInputs, Error> {
    log::info!("signing {} legacy input(s)", request.inputs.len());

    let public_keys = request
        .inputs
        .iter()
        .map(|input| dongle.get_node_with_fingerprint(request.network, &input.path))
        .collect::<Result<Vec<_>, _>>()?;

    notify(Progress::UploadingTransaction);
    let mut trusted_inputs = Vec::with_capacity(request.inputs.len());
    for input in &request.inputs {
        let txid = input.outpoint.txid;
        let tx = request
            .supporting_txs
            .get(&txid)
            .ok_or(Error::TxNotFound(txid))?;
        let blob = dongle.get_trusted_input(tx, input.outpoint.vout)?;
        log::debug!("trusted input for {}: {}", input.outpoint, hex::encode(&blob));
        trusted_inputs.push(TrustedInput::trusted(blob, input.legacy_script().clone()));
    }

    let lock_time = request.lock_time.to_consensus_u32();
    let mut signatures = Vec::with_capacity(request.inputs.len());
    for (index, input) in request.inputs.iter().enumerate() {
        let start = if index == 0 {
            InputStart::New
        } else {
            InputStart::Continue
        };
        dongle.start_untrusted_transaction(
            request.version,
            &trusted_inputs,
            Some(index),
            start,
            request.rbf,
        )?;

        // Outputs are only shown to the user on the first pass
        if index == 0 {
            notify(Progress::ConfirmOnDevice);
        }
        dongle.finalize_input_full(&request.recipients, request.change_path.as_ref())?;
        if index == 0 {
            notify(Progress::AwaitingSignature);
        }

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
        redeem_scripts: request
            .inputs
            .iter()
            .map(|input| input.redeem_script.clone())
            .collect(),
    })
}
