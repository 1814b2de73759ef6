/*!
Command header packing and unpacking.

Every frame on the bus starts with a header carrying a 4-bit opcode. Short
commands use a single byte with the opcode in the high nibble. Register and
job commands use a wide header laid out big-endian as

```text
[address(8)] | opcode(4) | engine-or-group(12) | offset(8)
```

where the leading address byte is only present in the 32-bit generation.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest engine or group id a wide header can carry
pub const MAX_ENGINE_ID: u16 = 0x0FFF;

/// Bus opcodes (4-bit values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    WriteJob = 0x0,
    ReadResult = 0x1,
    WriteReg = 0x2,
    ReadReg = 0x3,
    McastWrite = 0x4,
    DtsVs = 0xD,
    Loopback = 0xE,
    Noop = 0xF,
}

impl Opcode {
    /// Parse an opcode from the low nibble of a u8 value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & 0x0F {
            0x0 => Some(Self::WriteJob),
            0x1 => Some(Self::ReadResult),
            0x2 => Some(Self::WriteReg),
            0x3 => Some(Self::ReadReg),
            0x4 => Some(Self::McastWrite),
            0xD => Some(Self::DtsVs),
            0xE => Some(Self::Loopback),
            0xF => Some(Self::Noop),
            _ => None,
        }
    }

    /// Raw 4-bit value
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Check if this opcode is sent with the one-byte header
    pub fn is_narrow(self) -> bool {
        matches!(self, Self::ReadResult | Self::DtsVs | Self::Loopback | Self::Noop)
    }

    /// Check if the device answers this opcode
    pub fn expects_reply(self) -> bool {
        !matches!(self, Self::WriteJob | Self::WriteReg | Self::McastWrite)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = HeaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(HeaderError::InvalidOpcode(value & 0x0F))
    }
}

/// Header encodings used by the different protocol generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderWidth {
    /// One byte, opcode only
    Narrow,
    /// opcode | engine | offset, address carried by the transport only
    #[default]
    Wide24,
    /// address | opcode | engine | offset
    Wide32,
}

impl HeaderWidth {
    /// Size of the header in bytes
    pub fn len(self) -> usize {
        match self {
            Self::Narrow => 1,
            Self::Wide24 => 3,
            Self::Wide32 => 4,
        }
    }

    /// Check if this width carries engine and offset fields
    pub fn is_wide(self) -> bool {
        !matches!(self, Self::Narrow)
    }

    /// Header bytes echoed ahead of the data in a READREG reply.
    ///
    /// The 32-bit generation echoes the two-byte `address | opcode` header,
    /// the others echo a single opcode byte.
    pub fn echo_len(self) -> usize {
        match self {
            Self::Narrow | Self::Wide24 => 1,
            Self::Wide32 => 2,
        }
    }
}

impl std::str::FromStr for HeaderWidth {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "narrow" | "8" => Ok(Self::Narrow),
            "wide24" | "24" => Ok(Self::Wide24),
            "wide32" | "32" => Ok(Self::Wide32),
            _ => Err(HeaderError::UnknownWidth(s.to_string())),
        }
    }
}

/// Errors that can occur during header decoding
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Invalid header encoding: expected {expected} bytes, got {got}")]
    InvalidEncoding { expected: usize, got: usize },

    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("Unknown header width: {0}")]
    UnknownWidth(String),
}

/// A packed header, at most four bytes, kept on the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedHeader {
    bytes: [u8; 4],
    len: usize,
}

impl PackedHeader {
    /// The header bytes in wire order
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for PackedHeader {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Logical header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u8,
    pub engine: u16,
    pub offset: u8,
}

impl Header {
    pub fn new(opcode: Opcode, engine: u16, offset: u8) -> Self {
        Self {
            opcode: opcode.bits(),
            engine,
            offset,
        }
    }

    /// Pack into the given width. Fields beyond their bit-width are masked,
    /// so callers validate ranges first.
    pub fn pack(&self, address: u8, width: HeaderWidth) -> PackedHeader {
        match width {
            HeaderWidth::Narrow => pack_narrow(self.opcode),
            _ => pack_wide(address, self.opcode, self.engine, self.offset, width),
        }
    }

    /// Unpack from raw bytes. The narrow form only recovers the opcode.
    pub fn unpack(bytes: &[u8], width: HeaderWidth) -> Result<Self, HeaderError> {
        if bytes.len() < width.len() {
            return Err(HeaderError::InvalidEncoding {
                expected: width.len(),
                got: bytes.len(),
            });
        }

        let word = match width {
            HeaderWidth::Narrow => {
                return Ok(Self {
                    opcode: bytes[0] >> 4,
                    engine: 0,
                    offset: 0,
                })
            }
            HeaderWidth::Wide24 => {
                u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
            }
            // The leading address byte is transport-level and dropped here.
            HeaderWidth::Wide32 => {
                u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]])
            }
        };

        Ok(Self {
            opcode: ((word >> 20) & 0x0F) as u8,
            engine: ((word >> 8) & 0x0FFF) as u16,
            offset: (word & 0xFF) as u8,
        })
    }

    /// Decoded opcode, if it is one the bus defines
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}

/// One-byte header: opcode in bits 7..4, bits 3..0 zero
pub fn pack_narrow(opcode: u8) -> PackedHeader {
    PackedHeader {
        bytes: [(opcode & 0x0F) << 4, 0, 0, 0],
        len: 1,
    }
}

/// Wide header in 24-bit or 32-bit form. `Narrow` falls back to [`pack_narrow`].
pub fn pack_wide(
    address: u8,
    opcode: u8,
    engine: u16,
    offset: u8,
    width: HeaderWidth,
) -> PackedHeader {
    let word = ((address as u32) << 24)
        | (((opcode & 0x0F) as u32) << 20)
        | (((engine & MAX_ENGINE_ID) as u32) << 8)
        | offset as u32;
    let be = word.to_be_bytes();

    match width {
        HeaderWidth::Narrow => pack_narrow(opcode),
        HeaderWidth::Wide24 => PackedHeader {
            bytes: [be[1], be[2], be[3], 0],
            len: 3,
        },
        HeaderWidth::Wide32 => PackedHeader { bytes: be, len: 4 },
    }
}
