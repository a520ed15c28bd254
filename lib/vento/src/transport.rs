//! One-shot request/response delivery to a unit.
//!
//! The fan may move between addresses (DHCP), so every exchange binds a
//! fresh socket, sends one datagram and waits for one reply. No connection
//! state survives a call.

use std::net::SocketAddr;

use async_trait::async_trait;
use log::{error, trace};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};

use crate::error::TransportError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRIES: u32 = 1;

const RESPONSE_BUFFER_LEN: usize = 512;

#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;
}

pub struct UdpExchange {
    addr: SocketAddr,
    timeout: Duration,
    retries: u32,
}

impl UdpExchange {
    pub fn new(addr: SocketAddr) -> UdpExchange {
        UdpExchange {
            addr,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration, retries: u32) -> UdpExchange {
        self.timeout = timeout;
        self.retries = retries;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn send_once(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.addr).await?;

        socket.send(frame).await?;
        trace!("{} sent {} bytes", self.addr, frame.len());

        loop {
            let mut buffer = [0; RESPONSE_BUFFER_LEN];

            let result = timeout(self.timeout, socket.recv(&mut buffer))
                .await
                .map_err(|_| TransportError::Timeout(self.addr))?;
            let size = result?;

            if size > 0 {
                trace!("{} received {} bytes", self.addr, size);
                return Ok(buffer[..size].to_vec());
            }
        }
    }
}

#[async_trait]
impl Exchange for UdpExchange {
    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut attempt = 0;

        loop {
            match self.send_once(frame).await {
                Ok(response) if response.is_empty() => {
                    return Err(TransportError::EmptyResponse(self.addr))
                }
                Ok(response) => return Ok(response),
                Err(TransportError::Timeout(addr)) if attempt < self.retries => {
                    attempt += 1;
                    error!("{addr} timed out, retry {attempt}/{}", self.retries);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
