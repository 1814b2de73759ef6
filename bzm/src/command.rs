/*!
Command frame encoding.

Each [`Command`] variant maps to one opcode. Encoding validates every input
first and only then builds the frame, so an invalid command never produces
bytes for the transport.
*/

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BzmError, Result};
use crate::header::{pack_narrow, pack_wide, HeaderWidth, Opcode, MAX_ENGINE_ID};
use crate::protocol::{
    MAX_DTS_VS_BYTES, MAX_LOOPBACK_BYTES, MAX_WRITE_BYTES, MERKLE_RESIDUE_BYTES, MIDSTATE_BYTES,
    NOOP_SIGNATURE, READRESULT_BYTES, TAR_BYTE,
};

/// Everything WRITEJOB sends after its header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub midstate: [u8; MIDSTATE_BYTES],
    /// Copied to the wire verbatim, no byte swapping
    pub merkle_root_residue: [u8; MERKLE_RESIDUE_BYTES],
    pub sequence: u8,
    pub job_ctl: u8,
}

impl JobDescriptor {
    pub fn new(
        midstate: [u8; MIDSTATE_BYTES],
        merkle_root_residue: [u8; MERKLE_RESIDUE_BYTES],
        sequence: u8,
        job_ctl: u8,
    ) -> Self {
        Self {
            midstate,
            merkle_root_residue,
            sequence,
            job_ctl,
        }
    }

    /// Build from borrowed buffers, which must be exactly 32 and 4 bytes long
    pub fn from_slices(
        midstate: &[u8],
        merkle_root_residue: &[u8],
        sequence: u8,
        job_ctl: u8,
    ) -> Result<Self> {
        let midstate: [u8; MIDSTATE_BYTES] = midstate.try_into().map_err(|_| {
            BzmError::invalid_argument(format!(
                "midstate must be {} bytes, got {}",
                MIDSTATE_BYTES,
                midstate.len()
            ))
        })?;
        let merkle_root_residue: [u8; MERKLE_RESIDUE_BYTES] =
            merkle_root_residue.try_into().map_err(|_| {
                BzmError::invalid_argument(format!(
                    "merkle root residue must be {} bytes, got {}",
                    MERKLE_RESIDUE_BYTES,
                    merkle_root_residue.len()
                ))
            })?;

        Ok(Self::new(midstate, merkle_root_residue, sequence, job_ctl))
    }
}

/// A typed bus command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    WriteReg { engine: u16, offset: u8, values: Vec<u8> },
    ReadReg { engine: u16, offset: u8, count: usize },
    McastWrite { group: u16, offset: u8, values: Vec<u8> },
    WriteJob { engine: u16, job: JobDescriptor },
    ReadResult,
    DtsVs { len: usize },
    Loopback { data: Vec<u8>, tar_or_pad: u8 },
    Noop,
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::WriteReg { .. } => Opcode::WriteReg,
            Self::ReadReg { .. } => Opcode::ReadReg,
            Self::McastWrite { .. } => Opcode::McastWrite,
            Self::WriteJob { .. } => Opcode::WriteJob,
            Self::ReadResult => Opcode::ReadResult,
            Self::DtsVs { .. } => Opcode::DtsVs,
            Self::Loopback { .. } => Opcode::Loopback,
            Self::Noop => Opcode::Noop,
        }
    }

    /// Check inputs without building anything
    pub fn validate(&self, width: HeaderWidth) -> Result<()> {
        if !self.opcode().is_narrow() && !width.is_wide() {
            return Err(BzmError::invalid_argument(format!(
                "{:?} needs a wide header, got {:?}",
                self.opcode(),
                width
            )));
        }

        match self {
            Self::WriteReg { engine, values, .. } => {
                check_engine(*engine, "engine")?;
                check_write_len(values.len())
            }
            Self::McastWrite { group, values, .. } => {
                check_engine(*group, "group")?;
                check_write_len(values.len())
            }
            Self::ReadReg { engine, count, .. } => {
                check_engine(*engine, "engine")?;
                if !matches!(*count, 1 | 2 | 4) {
                    return Err(BzmError::invalid_argument(format!(
                        "register read count must be 1, 2 or 4, got {}",
                        count
                    )));
                }
                Ok(())
            }
            Self::WriteJob { engine, .. } => check_engine(*engine, "engine"),
            Self::DtsVs { len } => {
                if !(1..=MAX_DTS_VS_BYTES).contains(len) {
                    return Err(BzmError::invalid_argument(format!(
                        "DTS/VS reply length must be 1..={}, got {}",
                        MAX_DTS_VS_BYTES, len
                    )));
                }
                Ok(())
            }
            Self::Loopback { data, .. } => {
                if data.len() > MAX_LOOPBACK_BYTES {
                    return Err(BzmError::invalid_argument(format!(
                        "loopback data must be at most {} bytes, got {}",
                        MAX_LOOPBACK_BYTES,
                        data.len()
                    )));
                }
                Ok(())
            }
            Self::ReadResult | Self::Noop => Ok(()),
        }
    }

    /// Validate and serialize into the exact bytes handed to the transport.
    ///
    /// `address` only appears in the frame for [`HeaderWidth::Wide32`].
    pub fn encode(&self, address: u8, width: HeaderWidth) -> Result<Bytes> {
        self.validate(width)?;

        let opcode = self.opcode().bits();
        let mut frame = BytesMut::with_capacity(self.frame_len(width));

        match self {
            Self::WriteReg { engine, offset, values } => {
                frame.put_slice(pack_wide(address, opcode, *engine, *offset, width).as_bytes());
                frame.put_u8((values.len() - 1) as u8);
                frame.put_slice(values);
            }
            Self::McastWrite { group, offset, values } => {
                frame.put_slice(pack_wide(address, opcode, *group, *offset, width).as_bytes());
                frame.put_u8((values.len() - 1) as u8);
                frame.put_slice(values);
            }
            Self::ReadReg { engine, offset, count } => {
                frame.put_slice(pack_wide(address, opcode, *engine, *offset, width).as_bytes());
                frame.put_u8((*count - 1) as u8);
                frame.put_u8(TAR_BYTE);
            }
            Self::WriteJob { engine, job } => {
                frame.put_slice(pack_wide(address, opcode, *engine, 0, width).as_bytes());
                frame.put_slice(&job.midstate);
                frame.put_slice(&job.merkle_root_residue);
                frame.put_u8(job.sequence);
                frame.put_u8(job.job_ctl);
            }
            Self::Loopback { data, tar_or_pad } => {
                frame.put_slice(pack_narrow(opcode).as_bytes());
                // An empty payload still announces one byte
                frame.put_u8((data.len().max(1) - 1) as u8);
                frame.put_u8(*tar_or_pad);
                frame.put_slice(data);
            }
            Self::ReadResult | Self::DtsVs { .. } | Self::Noop => {
                frame.put_slice(pack_narrow(opcode).as_bytes());
            }
        }

        Ok(frame.freeze())
    }

    /// Length of the encoded frame
    pub fn frame_len(&self, width: HeaderWidth) -> usize {
        match self {
            Self::WriteReg { values, .. } | Self::McastWrite { values, .. } => {
                width.len() + 1 + values.len()
            }
            Self::ReadReg { .. } => width.len() + 2,
            Self::WriteJob { .. } => width.len() + MIDSTATE_BYTES + MERKLE_RESIDUE_BYTES + 2,
            Self::Loopback { data, .. } => 3 + data.len(),
            Self::ReadResult | Self::DtsVs { .. } | Self::Noop => 1,
        }
    }

    /// Bytes the device sends back, or `None` for write-only commands.
    ///
    /// For LOOPBACK this is the total when the echo matches: one length byte
    /// plus the echoed data.
    pub fn reply_len(&self, width: HeaderWidth) -> Option<usize> {
        match self {
            Self::ReadReg { count, .. } => Some(width.echo_len() + count),
            Self::ReadResult => Some(READRESULT_BYTES),
            Self::DtsVs { len } => Some(*len),
            Self::Loopback { data, .. } => Some(1 + data.len()),
            Self::Noop => Some(NOOP_SIGNATURE.len()),
            Self::WriteReg { .. } | Self::McastWrite { .. } | Self::WriteJob { .. } => None,
        }
    }
}

fn check_engine(engine: u16, what: &str) -> Result<()> {
    if engine > MAX_ENGINE_ID {
        return Err(BzmError::invalid_argument(format!(
            "{} id {:#x} exceeds 12 bits",
            what, engine
        )));
    }
    Ok(())
}

fn check_write_len(len: usize) -> Result<()> {
    if !(1..=MAX_WRITE_BYTES).contains(&len) {
        return Err(BzmError::invalid_argument(format!(
            "write length must be 1..={}, got {}",
            MAX_WRITE_BYTES, len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_reg(len: usize) -> Command {
        Command::WriteReg {
            engine: 0x234,
            offset: 0x56,
            values: vec![0xA5; len],
        }
    }

    #[test]
    fn test_writereg_frame_wide32() {
        let cmd = Command::WriteReg {
            engine: 0x234,
            offset: 0x56,
            values: vec![0xDE, 0xAD, 0xBE],
        };
        let frame = cmd.encode(0x01, HeaderWidth::Wide32).unwrap();
        assert_eq!(&frame[..], &[0x01, 0x22, 0x34, 0x56, 0x02, 0xDE, 0xAD, 0xBE]);
    }

    #[test]
    fn test_writereg_frame_wide24() {
        let cmd = Command::WriteReg {
            engine: 0x234,
            offset: 0x56,
            values: vec![0xDE, 0xAD, 0xBE],
        };
        let frame = cmd.encode(0x01, HeaderWidth::Wide24).unwrap();
        assert_eq!(&frame[..], &[0x22, 0x34, 0x56, 0x02, 0xDE, 0xAD, 0xBE]);
    }

    #[test]
    fn test_writereg_bounds() {
        for width in [HeaderWidth::Wide24, HeaderWidth::Wide32] {
            assert!(matches!(write_reg(0).encode(1, width), Err(BzmError::InvalidArgument(_))));
            assert!(matches!(write_reg(249).encode(1, width), Err(BzmError::InvalidArgument(_))));

            let frame = write_reg(1).encode(1, width).unwrap();
            assert_eq!(frame.len(), width.len() + 1 + 1);
            assert_eq!(frame[width.len()], 0);

            let frame = write_reg(248).encode(1, width).unwrap();
            assert_eq!(frame.len(), width.len() + 1 + 248);
            assert_eq!(frame[width.len()], 247);
        }
    }

    #[test]
    fn test_mcast_write_bounds() {
        let mcast = |len: usize| Command::McastWrite {
            group: 0x00A,
            offset: 0x20,
            values: vec![0x5A; len],
        };

        for width in [HeaderWidth::Wide24, HeaderWidth::Wide32] {
            assert!(matches!(mcast(0).encode(1, width), Err(BzmError::InvalidArgument(_))));
            assert!(matches!(mcast(249).encode(1, width), Err(BzmError::InvalidArgument(_))));

            let frame = mcast(1).encode(1, width).unwrap();
            assert_eq!(frame.len(), width.len() + 1 + 1);
            assert_eq!(frame[width.len()], 0);

            let frame = mcast(248).encode(1, width).unwrap();
            assert_eq!(frame.len(), width.len() + 1 + 248);
            assert_eq!(frame[width.len()], 247);
            assert_eq!(frame[width.len() - 3] >> 4, Opcode::McastWrite.bits());
        }
    }

    #[test]
    fn test_engine_out_of_range_rejected() {
        let cmd = Command::WriteReg {
            engine: 0x1000,
            offset: 0,
            values: vec![1],
        };
        assert!(matches!(cmd.encode(0, HeaderWidth::Wide24), Err(BzmError::InvalidArgument(_))));

        let cmd = Command::McastWrite {
            group: 0xFFFF,
            offset: 0,
            values: vec![1],
        };
        assert!(matches!(cmd.encode(0, HeaderWidth::Wide24), Err(BzmError::InvalidArgument(_))));
    }

    #[test]
    fn test_wide_command_rejects_narrow_width() {
        assert!(matches!(
            write_reg(1).encode(0, HeaderWidth::Narrow),
            Err(BzmError::InvalidArgument(_))
        ));
        // Narrow commands do not care about the configured width
        assert_eq!(&Command::Noop.encode(0, HeaderWidth::Narrow).unwrap()[..], &[0xF0]);
    }

    #[test]
    fn test_readreg_frame() {
        let cmd = Command::ReadReg {
            engine: 0xFFF,
            offset: 0x10,
            count: 4,
        };
        let frame = cmd.encode(0x02, HeaderWidth::Wide32).unwrap();
        assert_eq!(&frame[..], &[0x02, 0x3F, 0xFF, 0x10, 0x03, TAR_BYTE]);

        let frame = cmd.encode(0x02, HeaderWidth::Wide24).unwrap();
        assert_eq!(&frame[..], &[0x3F, 0xFF, 0x10, 0x03, TAR_BYTE]);
    }

    #[test]
    fn test_readreg_count_validation() {
        for count in [0usize, 3, 5, 8] {
            let cmd = Command::ReadReg {
                engine: 1,
                offset: 0,
                count,
            };
            assert!(matches!(
                cmd.encode(0, HeaderWidth::Wide24),
                Err(BzmError::InvalidArgument(_))
            ));
        }
        for count in [1usize, 2, 4] {
            let cmd = Command::ReadReg {
                engine: 1,
                offset: 0,
                count,
            };
            assert!(cmd.encode(0, HeaderWidth::Wide24).is_ok());
            assert_eq!(cmd.reply_len(HeaderWidth::Wide24), Some(1 + count));
            assert_eq!(cmd.reply_len(HeaderWidth::Wide32), Some(2 + count));
        }
    }

    #[test]
    fn test_mcast_uses_its_own_opcode() {
        let cmd = Command::McastWrite {
            group: 0x00A,
            offset: 0x20,
            values: vec![0x11, 0x22],
        };
        let frame = cmd.encode(0x09, HeaderWidth::Wide24).unwrap();
        assert_eq!(&frame[..], &[0x40, 0x0A, 0x20, 0x01, 0x11, 0x22]);
    }

    #[test]
    fn test_writejob_layout() {
        let mut midstate = [0u8; 32];
        for (i, b) in midstate.iter_mut().enumerate() {
            *b = i as u8;
        }
        let job = JobDescriptor::new(midstate, [0xDE, 0xAD, 0xBE, 0xEF], 0x42, 0x81);
        let cmd = Command::WriteJob { engine: 0x123, job };

        let frame = cmd.encode(0x07, HeaderWidth::Wide24).unwrap();
        assert_eq!(frame.len(), 3 + 32 + 4 + 2);
        assert_eq!(&frame[..3], &[0x01, 0x23, 0x00]);
        assert_eq!(&frame[3..35], &midstate);
        assert_eq!(&frame[35..39], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(frame[39], 0x42);
        assert_eq!(frame[40], 0x81);

        // The 32-bit generation shifts every field by one byte
        let frame = cmd.encode(0x07, HeaderWidth::Wide32).unwrap();
        assert_eq!(frame.len(), 4 + 32 + 4 + 2);
        assert_eq!(&frame[..4], &[0x07, 0x01, 0x23, 0x00]);
        assert_eq!(&frame[36..40], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(frame[41], 0x81);
    }

    #[test]
    fn test_job_from_slices_checks_lengths() {
        assert!(JobDescriptor::from_slices(&[0; 32], &[0; 4], 0, 0).is_ok());
        assert!(matches!(
            JobDescriptor::from_slices(&[0; 31], &[0; 4], 0, 0),
            Err(BzmError::InvalidArgument(_))
        ));
        assert!(matches!(
            JobDescriptor::from_slices(&[0; 32], &[0; 5], 0, 0),
            Err(BzmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_narrow_frames() {
        assert_eq!(&Command::ReadResult.encode(3, HeaderWidth::Wide32).unwrap()[..], &[0x10]);
        assert_eq!(&Command::DtsVs { len: 6 }.encode(3, HeaderWidth::Wide32).unwrap()[..], &[0xD0]);
        assert_eq!(&Command::Noop.encode(3, HeaderWidth::Wide24).unwrap()[..], &[0xF0]);
        assert!(matches!(
            Command::DtsVs { len: 0 }.encode(3, HeaderWidth::Wide24),
            Err(BzmError::InvalidArgument(_))
        ));
        assert!(matches!(
            Command::DtsVs { len: usize::MAX }.encode(3, HeaderWidth::Wide24),
            Err(BzmError::InvalidArgument(_))
        ));
        let largest = Command::DtsVs { len: MAX_DTS_VS_BYTES };
        assert!(largest.encode(3, HeaderWidth::Wide24).is_ok());
        assert_eq!(largest.reply_len(HeaderWidth::Wide24), Some(MAX_DTS_VS_BYTES));
    }

    #[test]
    fn test_loopback_frames() {
        let cmd = Command::Loopback {
            data: vec![0x01, 0x02, 0x03],
            tar_or_pad: 0x08,
        };
        assert_eq!(
            &cmd.encode(0, HeaderWidth::Wide24).unwrap()[..],
            &[0xE0, 0x02, 0x08, 0x01, 0x02, 0x03]
        );

        // Zero-length still encodes a count of one, with no data byte
        let empty = Command::Loopback {
            data: Vec::new(),
            tar_or_pad: 0x00,
        };
        assert_eq!(&empty.encode(0, HeaderWidth::Wide24).unwrap()[..], &[0xE0, 0x00, 0x00]);

        let too_long = Command::Loopback {
            data: vec![0; 256],
            tar_or_pad: 0,
        };
        assert!(matches!(
            too_long.encode(0, HeaderWidth::Wide24),
            Err(BzmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_frame_len_matches_encoding() {
        let commands = [
            write_reg(17),
            Command::ReadReg { engine: 2, offset: 3, count: 2 },
            Command::WriteJob {
                engine: 5,
                job: JobDescriptor::new([0; 32], [0; 4], 0, 0),
            },
            Command::Loopback { data: vec![9; 10], tar_or_pad: 0 },
            Command::ReadResult,
        ];
        for cmd in &commands {
            for width in [HeaderWidth::Wide24, HeaderWidth::Wide32] {
                assert_eq!(cmd.encode(0x11, width).unwrap().len(), cmd.frame_len(width));
            }
        }
    }

    #[test]
    fn test_write_only_commands_have_no_reply() {
        assert_eq!(write_reg(1).reply_len(HeaderWidth::Wide24), None);
        assert_eq!(Command::ReadResult.reply_len(HeaderWidth::Wide24), Some(8));
        assert_eq!(Command::Noop.reply_len(HeaderWidth::Wide24), Some(3));
    }
}
