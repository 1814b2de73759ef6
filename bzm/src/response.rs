/*!
Reply decoding and validation.
*/

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BzmError, Result};
use crate::header::HeaderWidth;
use crate::protocol::{NOOP_SIGNATURE, READRESULT_BYTES};

/// A decoded READRESULT reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    /// 12-bit engine id
    pub engine_id: u16,
    /// Low 4 bits; bit 3 flags a valid result
    pub status: u8,
    /// Raw nonce bytes in wire order
    pub nonce: [u8; 4],
    pub sequence_id: u8,
    pub time: u8,
}

impl ReadResult {
    /// Status bit marking a valid result
    pub const STATUS_VALID: u8 = 0x8;

    /// Split an 8-byte reply. The first two bytes are a big-endian word
    /// `(engine_id << 4) | status`.
    pub fn from_bytes(bytes: &[u8; READRESULT_BYTES]) -> Self {
        let eng_sts = u16::from_be_bytes([bytes[0], bytes[1]]);

        Self {
            engine_id: (eng_sts >> 4) & 0x0FFF,
            status: (eng_sts & 0x0F) as u8,
            nonce: [bytes[2], bytes[3], bytes[4], bytes[5]],
            sequence_id: bytes[6],
            time: bytes[7],
        }
    }

    /// Convert back to the 8 wire bytes
    pub fn to_bytes(&self) -> [u8; READRESULT_BYTES] {
        let eng_sts = ((self.engine_id & 0x0FFF) << 4) | (self.status & 0x0F) as u16;
        let [hi, lo] = eng_sts.to_be_bytes();
        [
            hi,
            lo,
            self.nonce[0],
            self.nonce[1],
            self.nonce[2],
            self.nonce[3],
            self.sequence_id,
            self.time,
        ]
    }

    /// Check if the engine reported a valid result
    pub fn is_valid(&self) -> bool {
        self.status & Self::STATUS_VALID != 0
    }
}

/// Strip the echoed header from a READREG reply and return the data bytes
pub fn decode_readreg(reply: &[u8], width: HeaderWidth, count: usize) -> Result<&[u8]> {
    let expected = width.echo_len() + count;
    if reply.len() != expected {
        return Err(BzmError::io(format!(
            "register reply must be {} bytes, got {}",
            expected,
            reply.len()
        )));
    }
    Ok(&reply[width.echo_len()..])
}

/// Check the NOOP self-test signature
pub fn verify_noop(reply: &[u8]) -> Result<()> {
    if reply != NOOP_SIGNATURE {
        warn!("NOOP signature mismatch: {}", hex::encode(reply));
        return Err(BzmError::io(format!(
            "NOOP reply {:02X?} does not match signature",
            reply
        )));
    }
    Ok(())
}

/// Check a LOOPBACK reply's length byte against what was sent.
///
/// `rlen` encodes count minus one. An empty send was announced as one byte,
/// so it expects `rlen == 0`. Returns how many echoed bytes to read next.
pub fn loopback_echo_len(rlen: u8, sent_len: usize) -> Result<usize> {
    let echoed = rlen as usize + 1;
    let announced = sent_len.max(1);
    if echoed != announced {
        warn!("Loopback length mismatch: sent {}, device echoed {}", announced, echoed);
        return Err(BzmError::io(format!(
            "loopback echoed {} bytes, sent {}",
            echoed, announced
        )));
    }
    // TODO: confirm on silicon whether an empty loopback echoes a data byte;
    // until then nothing further is read for it.
    Ok(sent_len)
}
