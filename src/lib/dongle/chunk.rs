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

//! # HID Framing
//!
//! Splits an APDU into fixed-size HID frames and reassembles responses.
//! Every frame starts with `[channel:2 BE][tag:1][sequence:2 BE]`; the
//! first one additionally carries the big-endian total length.
//!

use core::cmp;
use core::convert::TryFrom as _;

use byteorder::{BigEndian, ByteOrder};

use crate::constants::apdu::ledger::{
    DEFAULT_CHANNEL, FIRST_HEADER_LEN, NEXT_HEADER_LEN, PACKET_SIZE, TAG_APDU,
};
use crate::constants::hid::REPORT_ID;
use crate::Error;

/// A single HID frame, excluding the report ID
pub type Frame = [u8; PACKET_SIZE];

/// Splits `data` into zero-padded frames
///
/// An empty message still produces one frame, announcing a zero length.
pub fn encode_chunks(mut data: &[u8]) -> Result<Vec<Frame>, Error> {
    let total_len = u16::try_from(data.len()).map_err(|_| Error::ApduTooLong(data.len()))?;

    let mut frames = vec![];
    let mut sequence_no = 0u16;
    loop {
        let mut frame = [0u8; PACKET_SIZE];
        BigEndian::write_u16(&mut frame[0..2], DEFAULT_CHANNEL);
        frame[2] = TAG_APDU;
        BigEndian::write_u16(&mut frame[3..5], sequence_no);

        // First packet's header includes a two-byte length
        let header_len = if sequence_no == 0 {
            BigEndian::write_u16(&mut frame[5..7], total_len);
            FIRST_HEADER_LEN
        } else {
            NEXT_HEADER_LEN
        };

        let take = cmp::min(data.len(), PACKET_SIZE - header_len);
        frame[header_len..header_len + take].copy_from_slice(&data[..take]);
        data = &data[take..];
        frames.push(frame);

        if data.is_empty() {
            return Ok(frames);
        }
        sequence_no += 1;
    }
}

/// Prepends the HID report ID, giving the buffer actually handed to the OS
pub fn with_report_id(frame: &Frame) -> [u8; PACKET_SIZE + 1] {
    let mut ret = [0u8; PACKET_SIZE + 1];
    ret[0] = REPORT_ID;
    ret[1..].copy_from_slice(frame);
    ret
}

/// Reads frames from `read_frame` until a full response is assembled
///
/// Returns the status word and the payload with the status word stripped.
/// The sequence number of every frame is checked against a running counter;
/// the caller decides whether a mismatch on the first frame is recoverable.
pub fn decode_response<F>(mut read_frame: F) -> Result<(u16, Vec<u8>), Error>
where
    F: FnMut() -> Result<Frame, Error>,
{
    let mut sequence_no = 0u16;
    let mut receive_len = 0;
    let mut ret = vec![];
    loop {
        let frame = read_frame()?;

        // Sanity check the frame
        let r_channel = BigEndian::read_u16(&frame[0..2]);
        if r_channel != DEFAULT_CHANNEL {
            return Err(Error::ApduWrongChannel {
                expected: DEFAULT_CHANNEL,
                found: r_channel,
            });
        }
        if frame[2] != TAG_APDU {
            return Err(Error::ApduWrongTag {
                expected: TAG_APDU,
                found: frame[2],
            });
        }
        let r_sequence_no = BigEndian::read_u16(&frame[3..5]);
        if r_sequence_no != sequence_no {
            return Err(Error::ApduWrongSequence {
                expected: sequence_no,
                found: r_sequence_no,
            });
        }

        // Extract the message
        let header_len = if sequence_no == 0 {
            receive_len = usize::from(BigEndian::read_u16(&frame[5..7]));
            ret = Vec::with_capacity(receive_len);
            FIRST_HEADER_LEN
        } else {
            NEXT_HEADER_LEN
        };
        let message_len = cmp::min(receive_len, PACKET_SIZE - header_len);
        ret.extend(&frame[header_len..header_len + message_len]);
        receive_len -= message_len;

        if receive_len == 0 {
            break;
        }
        sequence_no = sequence_no.wrapping_add(1);
    }

    match (ret.pop(), ret.pop()) {
        (Some(sw2), Some(sw1)) => Ok((u16::from_be_bytes([sw1, sw2]), ret)),
        _ => Err(Error::UnexpectedEof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::apdu::ledger::{FIRST_BLOCK_SIZE, NEXT_BLOCK_SIZE};

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    /// Feeds the frames of `data ++ status` back through the decoder
    fn readback(data: &[u8], status: u16) -> Result<(u16, Vec<u8>), Error> {
        let mut wire = data.to_vec();
        wire.extend(status.to_be_bytes());
        let mut frames = encode_chunks(&wire)?.into_iter();
        decode_response(|| frames.next().ok_or(Error::Timeout))
    }

    #[test]
    fn frame_counts() {
        let expected = [
            (0, 1),
            (1, 1),
            (FIRST_BLOCK_SIZE - 1, 1),
            (FIRST_BLOCK_SIZE, 1),
            (FIRST_BLOCK_SIZE + 1, 2),
            (FIRST_BLOCK_SIZE + NEXT_BLOCK_SIZE, 2),
            (FIRST_BLOCK_SIZE + NEXT_BLOCK_SIZE + 1, 3),
            (260, 5),
        ];
        for &(len, n_frames) in &expected {
            assert_eq!(encode_chunks(&payload(len)).unwrap().len(), n_frames, "len {}", len);
        }
    }

    #[test]
    fn header_layout() {
        let data = payload(FIRST_BLOCK_SIZE + 3);
        let frames = encode_chunks(&data).unwrap();
        assert_eq!(frames[0][..7], [0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x3c]);
        assert_eq!(frames[0][7..], data[..FIRST_BLOCK_SIZE]);
        assert_eq!(frames[1][..5], [0x01, 0x01, 0x05, 0x00, 0x01]);
        assert_eq!(frames[1][5..8], data[FIRST_BLOCK_SIZE..]);
        // zero padding
        assert!(frames[1][8..].iter().all(|&b| b == 0));

        let raw = with_report_id(&frames[0]);
        assert_eq!(raw.len(), 65);
        assert_eq!(raw[0], 0x00);
        assert_eq!(raw[1..], frames[0][..]);
    }

    #[test]
    fn roundtrip() {
        // sizes are those of the reassembled buffer, status word included
        for &len in &[
            0,
            1,
            FIRST_BLOCK_SIZE - 3,
            FIRST_BLOCK_SIZE - 2,
            FIRST_BLOCK_SIZE - 1,
            3 * NEXT_BLOCK_SIZE,
            3 * NEXT_BLOCK_SIZE + 17,
        ] {
            let data = payload(len);
            let (sw, decoded) = readback(&data, 0x9000).unwrap();
            assert_eq!(sw, 0x9000);
            assert_eq!(decoded, data, "len {}", len);
        }
    }

    #[test]
    fn status_word_stripped() {
        let (sw, decoded) = readback(&[], 0x6985).unwrap();
        assert_eq!(sw, 0x6985);
        assert!(decoded.is_empty());
    }

    #[test]
    fn out_of_order_sequence_is_fatal() {
        let mut frames = encode_chunks(&payload(200)).unwrap();
        frames[2][3..5].copy_from_slice(&7u16.to_be_bytes());
        let mut iter = frames.into_iter();
        match decode_response(|| iter.next().ok_or(Error::Timeout)) {
            Err(Error::ApduWrongSequence { expected: 2, found: 7 }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn wrong_channel_and_tag() {
        let mut frame = encode_chunks(&[0x90, 0x00]).unwrap()[0];
        frame[1] = 0x02;
        assert!(matches!(
            decode_response(|| Ok(frame)),
            Err(Error::ApduWrongChannel { expected: 0x0101, found: 0x0102 })
        ));

        let mut frame = encode_chunks(&[0x90, 0x00]).unwrap()[0];
        frame[2] = 0x02;
        assert!(matches!(
            decode_response(|| Ok(frame)),
            Err(Error::ApduWrongTag { expected: 0x05, found: 0x02 })
        ));
    }

    #[test]
    fn truncated_response() {
        let frame = encode_chunks(&[0x90]).unwrap()[0];
        assert!(matches!(decode_response(|| Ok(frame)), Err(Error::UnexpectedEof)));
    }
}
