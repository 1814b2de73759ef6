/*!
# BZM Bus Protocol Codec

This crate turns typed commands for a chain of BZM hashing ASICs into the
exact bytes the silicon expects, and turns raw replies back into typed
values. Moving bytes over the wire is left to a caller-supplied
[`Transport`].

## Core Types

- [`Header`] / [`HeaderWidth`] - Header bit-packing for both generations
- [`Command`] - One variant per opcode, with frame encoding
- [`ReadResult`] - Decoded READRESULT record
- [`Bus`] - Runs one command against a borrowed transport

## Modules

- [`header`] - Header packing and unpacking
- [`command`] - Command validation and frame encoding
- [`response`] - Reply decoding and validation
- [`transport`] - Transport contract
- [`bus`] - Per-call command driver
- [`error`] - Common error types
*/

pub mod bus;
pub mod command;
pub mod error;
pub mod header;
pub mod response;
pub mod transport;

// Re-export commonly used types
pub use bus::Bus;
pub use command::{Command, JobDescriptor};
pub use error::{BzmError, Result};
pub use header::{Header, HeaderError, HeaderWidth, Opcode};
pub use response::ReadResult;
pub use transport::{Transport, TransportError};

/// Version information for the codec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Turnaround byte sent after a READREG count
    pub const TAR_BYTE: u8 = 0x08;

    /// Largest WRITEREG / MCASTWRITE payload
    pub const MAX_WRITE_BYTES: usize = 248;

    /// Largest LOOPBACK payload
    pub const MAX_LOOPBACK_BYTES: usize = 255;

    /// WRITEJOB midstate size
    pub const MIDSTATE_BYTES: usize = 32;

    /// WRITEJOB merkle root residue size
    pub const MERKLE_RESIDUE_BYTES: usize = 4;

    /// Largest DTS/VS reply accepted
    pub const MAX_DTS_VS_BYTES: usize = 256;

    /// READRESULT reply size
    pub const READRESULT_BYTES: usize = 8;

    /// NOOP self-test reply
    pub const NOOP_SIGNATURE: &[u8; 3] = b"2ZB";
}
