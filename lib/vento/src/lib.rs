//! Client for Blauberg Vento Expert fans speaking the v.2 UDP protocol:
//! broadcast discovery, frame codec, a single-flight device session and a
//! polling controller that fans snapshots out to observers.

mod controller;
mod discover;
mod error;
mod fan;
mod packet;
mod param;
mod transport;
mod value;

#[cfg(test)]
mod testing;

pub use controller::{FanController, FanHealth, DEFAULT_INTERVAL};
pub use discover::{
    discover, DiscoveredFan, BROADCAST_HOST, DEFAULT_PASSWORD, DEFAULT_PORT, DEFAULT_WINDOW,
    PLACEHOLDER_ID,
};
pub use error::{DecodeError, Error, TransportError};
pub use fan::{ClaimedIds, Fan, FanConfig, Snapshot};
pub use packet::{Func, Packet};
pub use param::Param;
pub use transport::{Exchange, UdpExchange};
pub use value::{battery_percent, duration_hours, Airflow, SpeedMode, Value};

pub type Result<T> = std::result::Result<T, Error>;
