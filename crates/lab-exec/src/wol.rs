//! Wake-on-LAN magic packets.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::info;

/// Magic packet length: 6 sync bytes + 16 repetitions of the MAC.
pub const MAGIC_PACKET_LEN: usize = 102;

/// Default destination: limited broadcast, discard port.
pub const DEFAULT_BROADCAST: &str = "255.255.255.255:9";

#[derive(Debug, thiserror::Error)]
pub enum WakeError {
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),
    #[error("no MAC address configured")]
    NotConfigured,
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("send timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

// ─── MacAddress ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = WakeError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` or `aabbccddeeff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits: String = if trimmed.contains([':', '-']) {
            let parts: Vec<&str> = trimmed.split([':', '-']).collect();
            if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
                return Err(WakeError::InvalidMac(s.to_string()));
            }
            parts.concat()
        } else {
            trimmed.to_string()
        };

        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WakeError::InvalidMac(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| WakeError::InvalidMac(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Build the 102-byte magic packet for `mac`.
pub fn magic_packet(mac: &MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFF; MAGIC_PACKET_LEN];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac.0);
    }
    packet
}

// ─── Senders ──────────────────────────────────────────────────────────────────

#[async_trait]
pub trait WakeSender: Send + Sync {
    async fn wake(&self, mac: &MacAddress) -> Result<(), WakeError>;
}

/// Sends the magic packet as one UDP datagram.
#[derive(Debug, Clone)]
pub struct UdpWakeSender {
    destination: SocketAddr,
    timeout: Duration,
}

impl UdpWakeSender {
    pub fn new(destination: SocketAddr) -> Self {
        Self {
            destination,
            timeout: Duration::from_secs(5),
        }
    }

    async fn send(&self, packet: &[u8]) -> Result<(), WakeError> {
        let bind: SocketAddr = if self.destination.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.set_broadcast(true)?;
        let sent = socket.send_to(packet, self.destination).await?;
        if sent != packet.len() {
            return Err(WakeError::Io(std::io::Error::other(format!(
                "short write: {sent} of {} bytes",
                packet.len()
            ))));
        }
        Ok(())
    }
}

impl Default for UdpWakeSender {
    fn default() -> Self {
        Self::new(SocketAddr::from(([255, 255, 255, 255], 9)))
    }
}

#[async_trait]
impl WakeSender for UdpWakeSender {
    async fn wake(&self, mac: &MacAddress) -> Result<(), WakeError> {
        let packet = magic_packet(mac);
        tokio::time::timeout(self.timeout, self.send(&packet))
            .await
            .map_err(|_| WakeError::Timeout(self.timeout))??;
        info!(%mac, destination = %self.destination, "magic packet sent");
        Ok(())
    }
}
