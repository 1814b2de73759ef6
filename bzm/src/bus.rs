/*!
Per-call command driver.

A [`Bus`] borrows the caller's transport for the duration of a command and
runs one encode, transmit, receive and decode cycle per call. It keeps no
state between calls beyond the header width it was created with.
*/

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::command::{Command, JobDescriptor};
use crate::error::{BzmError, Result};
use crate::header::HeaderWidth;
use crate::protocol::{NOOP_SIGNATURE, READRESULT_BYTES};
use crate::response::{decode_readreg, loopback_echo_len, verify_noop, ReadResult};
use crate::transport::Transport;

/// Command driver over a borrowed transport
pub struct Bus<'a, T: Transport + ?Sized> {
    io: &'a mut T,
    width: HeaderWidth,
}

impl<'a, T: Transport + ?Sized> Bus<'a, T> {
    /// `width` selects the wide-header generation used by register and job commands
    pub fn new(io: &'a mut T, width: HeaderWidth) -> Self {
        Self { io, width }
    }

    pub fn width(&self) -> HeaderWidth {
        self.width
    }

    /// Encode and transmit one command
    fn send(&mut self, address: u8, command: &Command) -> Result<Bytes> {
        let frame = command.encode(address, self.width)?;
        trace!(
            "tx {:?} to {:#04x}: {}",
            command.opcode(),
            address,
            hex::encode(&frame)
        );
        self.io.transmit(address, &frame)?;
        Ok(frame)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        self.io.receive(buf, timeout).map_err(|e| {
            debug!("rx of {} bytes failed: {}", buf.len(), e);
            BzmError::from(e)
        })?;
        trace!("rx: {}", hex::encode(&buf[..]));
        Ok(())
    }

    /// WRITEREG: write 1..=248 bytes at `engine`/`offset`
    pub fn write_reg(&mut self, address: u8, engine: u16, offset: u8, values: &[u8]) -> Result<()> {
        let command = Command::WriteReg {
            engine,
            offset,
            values: values.to_vec(),
        };
        self.send(address, &command)?;
        Ok(())
    }

    /// READREG: read 1, 2 or 4 bytes from `engine`/`offset`
    pub fn read_reg(
        &mut self,
        address: u8,
        engine: u16,
        offset: u8,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let command = Command::ReadReg { engine, offset, count };
        self.send(address, &command)?;

        let mut reply = vec![0u8; self.width.echo_len() + count];
        self.receive(&mut reply, timeout)?;
        Ok(decode_readreg(&reply, self.width, count)?.to_vec())
    }

    /// MCASTWRITE: write 1..=248 bytes to every engine in `group`
    pub fn multicast_write(
        &mut self,
        address: u8,
        group: u16,
        offset: u8,
        values: &[u8],
    ) -> Result<()> {
        let command = Command::McastWrite {
            group,
            offset,
            values: values.to_vec(),
        };
        self.send(address, &command)?;
        Ok(())
    }

    /// WRITEJOB: hand a job to `engine`
    pub fn write_job(&mut self, address: u8, engine: u16, job: &JobDescriptor) -> Result<()> {
        let command = Command::WriteJob {
            engine,
            job: job.clone(),
        };
        self.send(address, &command)?;
        Ok(())
    }

    /// READRESULT: fetch one result record
    pub fn read_result(&mut self, address: u8, timeout: Duration) -> Result<ReadResult> {
        self.send(address, &Command::ReadResult)?;

        let mut reply = [0u8; READRESULT_BYTES];
        self.receive(&mut reply, timeout)?;
        let result = ReadResult::from_bytes(&reply);
        debug!(
            "result from {:#04x}: engine {:#05x} status {:#x}",
            address, result.engine_id, result.status
        );
        Ok(result)
    }

    /// DTS/VS: read a `len`-byte sensor block. The size depends on the
    /// silicon generation and is not described by the reply itself.
    pub fn dts_vs_read(&mut self, address: u8, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let command = Command::DtsVs { len };
        self.send(address, &command)?;

        let mut reply = vec![0u8; len];
        self.receive(&mut reply, timeout)?;
        Ok(reply)
    }

    /// LOOPBACK: send `data` and return the device's echo of it.
    ///
    /// The frame is on the wire before the reply is checked, so a failed
    /// echo still leaves the transmit behind.
    pub fn loopback(
        &mut self,
        address: u8,
        data: &[u8],
        tar_or_pad: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let command = Command::Loopback {
            data: data.to_vec(),
            tar_or_pad,
        };
        self.send(address, &command)?;

        let mut rlen = [0u8; 1];
        self.receive(&mut rlen, timeout)?;
        let echo_len = loopback_echo_len(rlen[0], data.len())?;

        let mut echo = vec![0u8; echo_len];
        if echo_len > 0 {
            self.receive(&mut echo, timeout)?;
        }
        Ok(echo)
    }

    /// NOOP: self-test, the device must answer "2ZB"
    pub fn noop(&mut self, address: u8, timeout: Duration) -> Result<()> {
        self.send(address, &Command::Noop)?;

        let mut reply = [0u8; NOOP_SIGNATURE.len()];
        self.receive(&mut reply, timeout)?;
        verify_noop(&reply)
    }
}
