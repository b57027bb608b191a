use crate::{PoseFrame, Result};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::debug;

/// Upper bound on one encoded pose frame.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Unreliable frame channel: one JSON-encoded pose frame per datagram.
///
/// There is no retransmission; stale, duplicate, or missing frames are
/// acceptable, and datagrams that fail to decode are dropped.
pub struct FrameChannel {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl FrameChannel {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive the next decodable pose frame.
    pub async fn recv_frame(&mut self) -> Result<PoseFrame> {
        loop {
            let (len, peer) = self.socket.recv_from(&mut self.buf).await?;
            match serde_json::from_slice::<PoseFrame>(&self.buf[..len]) {
                Ok(frame) => return Ok(frame),
                Err(e) => debug!(%peer, "dropping undecodable pose datagram: {e}"),
            }
        }
    }
}
