//! Steam A2S_PLAYER query
//!
//! Request: `FF FF FF FF 55 <challenge>`. The server first answers with an
//! `0x41` challenge, the repeated request carrying it is answered with an
//! `0x44` player list whose first byte is the player count.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

use super::PlayerCountSource;

const SINGLE_PACKET: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const SPLIT_PACKET: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];
const PLAYER_REQUEST: u8 = 0x55;
const CHALLENGE_REPLY: u8 = 0x41;
const PLAYER_REPLY: u8 = 0x44;
/// Header of a split packet: marker, id, total, number, size
const SPLIT_HEADER_LEN: usize = 12;
const MAX_PACKET_SIZE: usize = 1400;
const MAX_CHALLENGE_ROUNDS: usize = 3;

/// Reply to a player request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerReply {
    Challenge([u8; 4]),
    Players(u32),
}

/// Build a player request carrying `challenge` (`FF FF FF FF` asks for one)
pub fn player_request(challenge: [u8; 4]) -> Vec<u8> {
    let mut request = Vec::with_capacity(9);
    request.extend_from_slice(&SINGLE_PACKET);
    request.push(PLAYER_REQUEST);
    request.extend_from_slice(&challenge);
    request
}

/// Strip the packet header. Returns `None` for split packets other than the
/// first one, which do not carry the player count.
pub fn packet_payload(packet: &[u8]) -> Result<Option<&[u8]>> {
    if let Some(payload) = packet.strip_prefix(&SINGLE_PACKET) {
        return Ok(Some(payload));
    }

    if packet.starts_with(&SPLIT_PACKET) {
        if packet.len() < SPLIT_HEADER_LEN {
            bail!("Truncated split packet ({} bytes)", packet.len());
        }
        let id = u32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]);
        if id & 0x8000_0000 != 0 {
            bail!("Compressed split packets are not supported");
        }
        let number = packet[9];
        if number != 0 {
            return Ok(None);
        }
        let payload = packet[SPLIT_HEADER_LEN..]
            .strip_prefix(&SINGLE_PACKET)
            .ok_or_else(|| anyhow!("Split packet payload without header"))?;
        return Ok(Some(payload));
    }

    bail!("Unknown packet header")
}

pub fn parse_reply(payload: &[u8]) -> Result<PlayerReply> {
    match payload.first() {
        Some(&CHALLENGE_REPLY) => {
            let challenge: [u8; 4] = payload
                .get(1..5)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| anyhow!("Truncated challenge reply"))?;
            Ok(PlayerReply::Challenge(challenge))
        }
        Some(&PLAYER_REPLY) => {
            let count = payload
                .get(1)
                .ok_or_else(|| anyhow!("Player reply without count"))?;
            Ok(PlayerReply::Players(u32::from(*count)))
        }
        Some(other) => bail!("Unexpected reply type 0x{:02X}", other),
        None => bail!("Empty reply"),
    }
}

/// Queries one server's player count
#[derive(Debug, Clone)]
pub struct A2sClient {
    address: String,
    timeout: Duration,
}

impl A2sClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            address: format!("{}:{}", host, port),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Query the current player count, bounded by the client's timeout
    pub async fn query_player_count(&self) -> Result<u32> {
        tokio::time::timeout(self.timeout, self.query())
            .await
            .map_err(|_| anyhow!("Server query timed out after {}ms", self.timeout.as_millis()))?
    }

    async fn query(&self) -> Result<u32> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Failed to bind query socket")?;
        socket
            .connect(&self.address)
            .await
            .with_context(|| format!("Failed to resolve {}", self.address))?;

        let mut request = player_request(SINGLE_PACKET);
        for _ in 0..MAX_CHALLENGE_ROUNDS {
            socket
                .send(&request)
                .await
                .context("Failed to send player request")?;

            match self.receive_reply(&socket).await? {
                PlayerReply::Challenge(challenge) => {
                    debug!(address = %self.address, "Received query challenge");
                    request = player_request(challenge);
                }
                PlayerReply::Players(count) => return Ok(count),
            }
        }

        bail!("Server kept answering with challenges")
    }

    async fn receive_reply(&self, socket: &UdpSocket) -> Result<PlayerReply> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let len = socket
                .recv(&mut buf)
                .await
                .context("Failed to receive query reply")?;
            if let Some(payload) = packet_payload(&buf[..len])? {
                return parse_reply(payload);
            }
        }
    }
}

#[async_trait]
impl PlayerCountSource for A2sClient {
    async fn player_count(&self) -> Result<u32> {
        self.query_player_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_request() {
        assert_eq!(
            player_request([1, 2, 3, 4]),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0x55, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_parse_replies() {
        assert_eq!(
            parse_reply(&[0x41, 9, 8, 7, 6]).unwrap(),
            PlayerReply::Challenge([9, 8, 7, 6])
        );
        assert_eq!(parse_reply(&[0x44, 3, 0, b'E', 0]).unwrap(), PlayerReply::Players(3));
        assert!(parse_reply(&[0x41, 1]).is_err());
        assert!(parse_reply(&[0x49]).is_err());
        assert!(parse_reply(&[]).is_err());
    }

    #[test]
    fn test_split_packet_payload() {
        let mut first = vec![0xFE, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0, 2, 0, 0xE0, 0x04];
        first.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x44, 12]);
        assert_eq!(packet_payload(&first).unwrap(), Some(&[0x44, 12][..]));

        let second = vec![0xFE, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0, 2, 1, 0xE0, 0x04, 0, 0];
        assert_eq!(packet_payload(&second).unwrap(), None);

        let compressed = vec![0xFE, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0x80, 2, 0, 0, 0];
        assert!(packet_payload(&compressed).is_err());
        assert!(packet_payload(&[0x00, 0x01]).is_err());
    }

    #[tokio::test]
    async fn test_query_with_challenge() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &player_request(SINGLE_PACKET)[..]);
            server
                .send_to(&[0xFF, 0xFF, 0xFF, 0xFF, 0x41, 1, 2, 3, 4], peer)
                .await
                .unwrap();

            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &player_request([1, 2, 3, 4])[..]);
            server
                .send_to(&[0xFF, 0xFF, 0xFF, 0xFF, 0x44, 2, 0, b'A', 0], peer)
                .await
                .unwrap();
        });

        let client = A2sClient::new("127.0.0.1", port, Duration::from_secs(2));
        assert_eq!(client.query_player_count().await.unwrap(), 2);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_query_times_out() {
        // Bound but never answers
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let client = A2sClient::new("127.0.0.1", port, Duration::from_millis(50));
        let err = client.query_player_count().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        drop(server);
    }
}
