//! Shared test doubles for session and controller tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hex_literal::hex;
use tokio::time::Duration;

use crate::error::TransportError;
use crate::fan::FanConfig;
use crate::transport::Exchange;

/// Full status response from fan `002A6E1B34565211`: identity fields plus
/// every polled parameter (analog threshold flagged unsupported).
pub const FULL_STATUS: [u8; 134] = hex!(
    "fdfd 0210 3030 3241 3645 3142 3334 3536 3532 3131 0006 0101 0202 0600"
    "0700 fe03 0b00 1e02 0f01 1400 1600 1937 fe02 2454 0b25 312d 1432 0044"
    "80fe 024a aa05 fe02 4b28 05fe 0364 1e05 0266 1efe 047e 0008 9201 8300"
    "8500 fe06 8600 0401 0be3 0788 00fe 049a c0a8 0017 ffb2 b700 fe10 7c30"
    "3032 4136 4531 4233 3435 3635 3231 31fe 02b9 0300 2020"
);

pub const STUB_ID: &str = "002A6E1B34565211";
pub const STUB_ADDR: &str = "127.0.0.1:4000";

pub struct StubExchange {
    pub response: Vec<u8>,
    pub calls: AtomicU32,
    pub fail: AtomicBool,
    pub delay: Duration,
}

impl StubExchange {
    pub fn new(response: Vec<u8>) -> Arc<StubExchange> {
        Arc::new(StubExchange {
            response,
            calls: AtomicU32::new(0),
            fail: AtomicBool::new(false),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(response: Vec<u8>, delay: Duration) -> Arc<StubExchange> {
        Arc::new(StubExchange {
            response,
            calls: AtomicU32::new(0),
            fail: AtomicBool::new(false),
            delay,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn addr(&self) -> SocketAddr {
        STUB_ADDR.parse().unwrap()
    }
}

#[async_trait]
impl Exchange for Arc<StubExchange> {
    async fn exchange(&self, _frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout(self.addr()));
        }

        Ok(self.response.clone())
    }
}

pub fn stub_config() -> FanConfig {
    FanConfig {
        host: "127.0.0.1".to_string(),
        ..FanConfig::default()
    }
}
