use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use log::{debug, trace};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration, Instant};

use crate::packet::{Func, Packet};
use crate::param::Param;
use crate::value::Value;
use crate::{value, Error, Result};

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_PASSWORD: &str = "1111";
pub const PLACEHOLDER_ID: &str = "DEFAULT_DEVICEID";
pub const BROADCAST_HOST: &str = "<broadcast>";

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFan {
    pub addr: SocketAddr,
    pub id: String,
}

/// Broadcasts a search request and collects every unit answering within the
/// window. Responses are deduplicated by device id; an empty window is an
/// error, more than one fan is not.
pub async fn discover(ip: Option<Ipv4Addr>, port: u16, window: Duration) -> Result<Vec<DiscoveredFan>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    let ip = ip.unwrap_or(Ipv4Addr::BROADCAST);
    let addr = SocketAddr::new(ip.into(), port);

    let request = Packet::read_request(PLACEHOLDER_ID, DEFAULT_PASSWORD, [Param::Search.code()]);
    socket.send_to(&request.to_vec(), &addr).await?;
    trace!("sent search broadcast to {addr}");

    let mut found: Vec<DiscoveredFan> = vec![];
    let deadline = Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let mut buffer = [0; 512];

        let (size, source) = match timeout(remaining, socket.recv_from(&mut buffer)).await {
            Ok(result) => result?,
            Err(_) => break,
        };

        let packet = match Packet::read_from(&buffer[..size]) {
            Ok(packet) if packet.func == Func::Response => packet,
            Ok(_) => continue,
            Err(err) => {
                trace!("ignoring malformed broadcast reply from {source}: {err}");
                continue;
            }
        };

        let id = match packet
            .params
            .get(&Param::Search.code())
            .and_then(|raw| value::decode(Param::Search, raw))
        {
            Some(Value::Text(id)) => id,
            _ => packet.device_id,
        };

        debug!("fan {id} at {source}");

        if !found.iter().any(|fan| fan.id == id) {
            found.push(DiscoveredFan { addr: source, id });
        }
    }

    if found.is_empty() {
        return Err(Error::DevicesNotFound(ip));
    }

    Ok(found)
}

/// Resolves a host string from the configuration surface. The broadcast
/// sentinel is handled by the caller via [`discover`].
pub(crate) fn parse_host(host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host
        .parse()
        .map_err(|_| Error::BadConfig(format!("invalid host {host:?}")))?;

    Ok(SocketAddr::new(ip, port))
}
