/*!
UDP bus-bridge transport.

The bridge is a small board that owns the physical serial line. Each frame
is sent as one datagram whose first byte is the target address; the bridge
puts that byte on the wire with the 9th (address-mark) bit set and the rest
as ordinary data. Everything the chain sends back is forwarded as datagrams
in arrival order, with no framing of its own, so replies may be split or
coalesced across datagrams.
*/

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use bzm::{Transport, TransportError};
use tracing::{debug, info, warn};

/// Maximum datagram size accepted from the bridge
const BRIDGE_MTU: usize = 1500;

/// Transport that talks to a serial bus bridge over UDP
pub struct UdpBridge {
    socket: UdpSocket,
    pending: Vec<u8>,
}

impl UdpBridge {
    /// Bind locally and connect to the bridge
    pub fn connect(
        bind_addr: &str,
        bridge_addr: &str,
        recv_buffer_size: usize,
    ) -> std::io::Result<Self> {
        info!("🔌 Binding UDP socket to {}", bind_addr);
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(bridge_addr)?;

        let sock_ref = socket2::SockRef::from(&socket);
        sock_ref.set_recv_buffer_size(recv_buffer_size)?;
        info!("✅ Connected to bus bridge at {}", bridge_addr);

        Ok(Self {
            socket,
            pending: Vec::new(),
        })
    }

    /// Drop any bytes left over from an earlier, abandoned reply
    pub fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            warn!("Discarding {} stale bytes from the bridge", self.pending.len());
            self.pending.clear();
        }
    }
}

impl Transport for UdpBridge {
    fn transmit(&mut self, address: u8, payload: &[u8]) -> Result<(), TransportError> {
        // A new command starts a new reply
        self.discard_pending();

        let mut datagram = Vec::with_capacity(1 + payload.len());
        datagram.push(address);
        datagram.extend_from_slice(payload);

        let sent = self.socket.send(&datagram)?;
        if sent != datagram.len() {
            return Err(TransportError::failed(format!(
                "short send: {} of {} bytes",
                sent,
                datagram.len()
            )));
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;
        let mut datagram = [0u8; BRIDGE_MTU];

        while self.pending.len() < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("Timed out with {} of {} bytes", self.pending.len(), buf.len());
                self.pending.clear();
                return Err(TransportError::Timeout);
            }

            self.socket.set_read_timeout(Some(remaining))?;
            match self.socket.recv(&mut datagram) {
                Ok(n) => self.pending.extend_from_slice(&datagram[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => {
                    self.pending.clear();
                    return Err(e.into());
                }
            }
        }

        buf.copy_from_slice(&self.pending[..buf.len()]);
        self.pending.drain(..buf.len());
        Ok(())
    }
}
