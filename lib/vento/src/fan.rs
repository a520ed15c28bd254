mod config;
mod snapshot;

pub use config::{ClaimedIds, FanConfig};
pub use snapshot::Snapshot;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::{watch, Mutex};

use crate::discover::{discover, parse_host, DiscoveredFan, BROADCAST_HOST, DEFAULT_WINDOW, PLACEHOLDER_ID};
use crate::packet::Packet;
use crate::param::Param;
use crate::transport::{Exchange, UdpExchange};
use crate::value::{self, Airflow, SpeedMode, Value};
use crate::{Error, Result};

/// The single authoritative handle to one physical unit. All reads and
/// writes go through the session; the cached snapshot is replaced wholesale
/// by each successful refresh and survives failed ones.
#[derive(Clone)]
pub struct Fan {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    name: String,
    password: String,
    addr: SocketAddr,
    unit_type: Option<u16>,
    firmware: Option<String>,
    exchange: Box<dyn Exchange>,
    /// Serializes all wire traffic to the unit; writes keep issuance order.
    io: Mutex<()>,
    /// Single-flight guard for refresh cycles.
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    claimed: ClaimedIds,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.claimed.release(&self.id);
    }
}

impl Fan {
    /// Establishes a session: resolves the host via discovery when the
    /// broadcast sentinel is configured, reads the identity fields and
    /// claims the device id. Fails synchronously; the caller decides
    /// whether to retry setup.
    pub async fn init(config: FanConfig, claimed: ClaimedIds) -> Result<Fan> {
        let addr = if config.host == BROADCAST_HOST {
            let found = discover(None, config.port, DEFAULT_WINDOW).await?;
            let fan = pick_unclaimed(found, &claimed)
                .ok_or(Error::DevicesNotFound(Ipv4Addr::BROADCAST))?;

            debug!("resolved {} to {}", fan.id, fan.addr);
            SocketAddr::new(fan.addr.ip(), config.port)
        } else {
            parse_host(&config.host, config.port)?
        };

        let exchange = UdpExchange::new(addr);
        Self::init_with_exchange(config, claimed, Box::new(exchange), addr).await
    }

    pub(crate) async fn init_with_exchange(
        config: FanConfig,
        claimed: ClaimedIds,
        exchange: Box<dyn Exchange>,
        addr: SocketAddr,
    ) -> Result<Fan> {
        let request = Packet::read_request(
            &config.device_id,
            &config.password,
            Param::IDENTITY.iter().map(|param| param.code()),
        );

        let response = exchange.exchange(&request.to_vec()).await?;
        let packet = Packet::read_from(&response)?;

        let id = match packet
            .params
            .get(&Param::Search.code())
            .and_then(|raw| value::decode(Param::Search, raw))
        {
            Some(Value::Text(id)) => id,
            _ => packet.device_id.clone(),
        };

        // a unit that does not report a real id never accepted the session
        if id == PLACEHOLDER_ID || (config.device_id != PLACEHOLDER_ID && id != config.device_id) {
            return Err(Error::Auth {
                expected: config.device_id,
                got: id,
            });
        }

        if !claimed.claim(&id) {
            return Err(Error::IdCollision(id));
        }

        let unit_type = packet
            .params
            .get(&Param::UnitType.code())
            .and_then(|raw| value::decode(Param::UnitType, raw))
            .and_then(|value| match value {
                Value::UnitType(unit_type) => Some(unit_type),
                _ => None,
            });

        let firmware = packet
            .params
            .get(&Param::Firmware.code())
            .and_then(|raw| value::decode(Param::Firmware, raw))
            .and_then(|value| match value {
                Value::Text(firmware) => Some(firmware),
                _ => None,
            });

        info!("initialized fan {id} at {addr}");

        let (snapshot_tx, _) = watch::channel(None);

        Ok(Fan {
            inner: Arc::new(Inner {
                id,
                name: config.name,
                password: config.password,
                addr,
                unit_type,
                firmware,
                exchange,
                io: Mutex::new(()),
                refresh_gate: Mutex::new(()),
                generation: AtomicU64::new(0),
                snapshot_tx,
                claimed,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn unit_type(&self) -> Option<u16> {
        self.inner.unit_type
    }

    pub fn firmware(&self) -> Option<&str> {
        self.inner.firmware.as_deref()
    }

    /// Most recent snapshot, if any refresh has succeeded yet.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Last decoded value without any I/O. `None` is the explicit absent.
    pub fn get_cached(&self, param: Param) -> Option<Value> {
        self.inner
            .snapshot_tx
            .borrow()
            .as_ref()
            .and_then(|snapshot| snapshot.get(param).cloned())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Polls the unit for a fresh snapshot. Concurrent callers coalesce
    /// onto one wire round trip; a failed cycle leaves the previous
    /// snapshot in place.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let inner = &self.inner;
        let generation = inner.generation.load(Ordering::Acquire);

        let _gate = inner.refresh_gate.lock().await;

        if inner.generation.load(Ordering::Acquire) != generation {
            // someone refreshed while we waited for the gate
            if let Some(snapshot) = self.snapshot() {
                return Ok(snapshot);
            }
        }

        let request = Packet::read_request(
            &inner.id,
            &inner.password,
            Param::poll_set().map(|param| param.code()),
        );

        let response = {
            let _io = inner.io.lock().await;
            inner.exchange.exchange(&request.to_vec()).await
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                error!("refresh of {} failed: {err}", inner.id);
                return Err(Error::Transport(err));
            }
        };

        let packet = Packet::read_from(&response)?;
        let snapshot = Arc::new(Snapshot::decode(&packet.params));

        inner.generation.fetch_add(1, Ordering::Release);
        inner.snapshot_tx.send_replace(Some(snapshot.clone()));

        debug!("refreshed {}: {} parameters", inner.id, snapshot.len());
        Ok(snapshot)
    }

    /// Validates and writes one parameter. The cached snapshot is not
    /// touched; refresh afterwards to observe the confirmed state.
    pub async fn set_param(&self, param: Param, value: Value) -> Result<()> {
        let raw = value::encode(param, &value)?;
        debug!("set {param:?} = {value:?} on {}", self.inner.id);

        let request =
            Packet::write_request(&self.inner.id, &self.inner.password, param.code(), raw);
        self.send(request).await
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_param(Param::OnOff, Value::Bool(true)).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_param(Param::OnOff, Value::Bool(false)).await
    }

    pub async fn set_speed_mode(&self, mode: SpeedMode) -> Result<()> {
        self.set_param(Param::SpeedMode, Value::Speed(mode)).await
    }

    /// Manual speed in percent, clamped to the declared 5..=100 policy.
    pub async fn set_manual_speed_percent(&self, percent: u8) -> Result<()> {
        self.set_param(Param::ManualSpeed, Value::Percent(percent))
            .await
    }

    pub async fn set_airflow(&self, airflow: Airflow) -> Result<()> {
        self.set_param(Param::Airflow, Value::Airflow(airflow)).await
    }

    pub async fn set_humidity_threshold(&self, percent: u8) -> Result<()> {
        self.set_param(Param::HumidityThreshold, Value::Percent(percent))
            .await
    }

    pub async fn set_analog_threshold(&self, percent: u8) -> Result<()> {
        self.set_param(Param::AnalogThreshold, Value::Percent(percent))
            .await
    }

    pub async fn set_boost_time(&self, minutes: u8) -> Result<()> {
        self.set_param(Param::BoostTime, Value::Minutes(minutes))
            .await
    }

    pub async fn set_humidity_sensor(&self, enabled: bool) -> Result<()> {
        self.set_param(Param::HumiditySensor, Value::Bool(enabled))
            .await
    }

    pub async fn set_relay_sensor(&self, enabled: bool) -> Result<()> {
        self.set_param(Param::RelaySensor, Value::Bool(enabled)).await
    }

    pub async fn set_analog_sensor(&self, enabled: bool) -> Result<()> {
        self.set_param(Param::AnalogSensor, Value::Bool(enabled))
            .await
    }

    pub async fn reset_filter_timer(&self) -> Result<()> {
        info!("resetting filter timer on {}", self.inner.id);
        self.action(Param::FilterTimerReset).await
    }

    pub async fn reset_alarms(&self) -> Result<()> {
        info!("resetting alarms on {}", self.inner.id);
        self.action(Param::ResetAlarms).await
    }

    async fn action(&self, param: Param) -> Result<()> {
        let request =
            Packet::action_request(&self.inner.id, &self.inner.password, param.code());
        self.send(request).await
    }

    async fn send(&self, request: Packet) -> Result<()> {
        let _io = self.inner.io.lock().await;
        let response = self.inner.exchange.exchange(&request.to_vec()).await?;

        // the unit acks every write; content is ignored here because
        // confirmed state only comes from the next refresh
        Packet::read_from(&response)?;
        Ok(())
    }
}

fn pick_unclaimed(found: Vec<DiscoveredFan>, claimed: &ClaimedIds) -> Option<DiscoveredFan> {
    found.into_iter().find(|fan| !claimed.contains(&fan.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stub_config, StubExchange, FULL_STATUS, STUB_ADDR, STUB_ID};
    use crate::TransportError;

    use tokio::time::Duration;

    async fn stub_fan(stub: &std::sync::Arc<StubExchange>) -> Fan {
        Fan::init_with_exchange(
            stub_config(),
            ClaimedIds::default(),
            Box::new(stub.clone()),
            STUB_ADDR.parse().unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_init_adopts_discovered_id() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let fan = stub_fan(&stub).await;

        assert_eq!(fan.id(), STUB_ID);
        assert_eq!(fan.unit_type(), Some(3));
        assert_eq!(fan.firmware(), Some("0.4 2019-11-01"));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_init_rejects_id_mismatch() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let config = FanConfig {
            device_id: "AAAABBBBCCCCDDDD".to_string(),
            ..stub_config()
        };

        let result = Fan::init_with_exchange(
            config,
            ClaimedIds::default(),
            Box::new(stub),
            STUB_ADDR.parse().unwrap(),
        )
        .await;

        match result {
            Err(Error::Auth { expected, got }) => {
                assert_eq!(expected, "AAAABBBBCCCCDDDD");
                assert_eq!(got, STUB_ID);
            }
            other => panic!("expected Auth error, got {:?}", other.map(|fan| fan.id().to_string())),
        }
    }

    #[tokio::test]
    async fn test_init_rejects_claimed_id() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let claimed = ClaimedIds::default();
        claimed.claim(STUB_ID);

        let result = Fan::init_with_exchange(
            stub_config(),
            claimed,
            Box::new(stub),
            STUB_ADDR.parse().unwrap(),
        )
        .await;

        assert!(matches!(result, Err(Error::IdCollision(id)) if id == STUB_ID));
    }

    #[tokio::test]
    async fn test_drop_releases_claim() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let claimed = ClaimedIds::default();

        let fan = Fan::init_with_exchange(
            stub_config(),
            claimed.clone(),
            Box::new(stub),
            STUB_ADDR.parse().unwrap(),
        )
        .await
        .unwrap();

        assert!(claimed.contains(STUB_ID));
        drop(fan);
        assert!(!claimed.contains(STUB_ID));
    }

    #[tokio::test]
    async fn test_refresh_decodes_snapshot() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let fan = stub_fan(&stub).await;

        let snapshot = fan.refresh().await.unwrap();

        assert_eq!(snapshot.is_on(), Some(true));
        assert_eq!(snapshot.speed(), Some(SpeedMode::Medium));
        assert_eq!(snapshot.airflow(), Some(Airflow::Ventilation));
        assert_eq!(snapshot.humidity(), Some(49));
        assert_eq!(snapshot.battery_percent(), Some(50));
        assert_eq!(snapshot.wifi_ip(), Some("192.168.0.23"));
        assert_eq!(
            snapshot.get(Param::FilterTimer),
            Some(&Value::Hours(53.5))
        );
        // flagged 0xFF by the stub firmware
        assert_eq!(snapshot.get(Param::AnalogThreshold), None);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let fan = stub_fan(&stub).await;

        let first = fan.refresh().await.unwrap();
        let second = fan.refresh().await.unwrap();

        for param in Param::poll_set() {
            assert_eq!(first.get(param), second.get(param), "{param:?}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_round_trip() {
        let stub = StubExchange::slow(FULL_STATUS.to_vec(), Duration::from_millis(50));
        let fan = stub_fan(&stub).await;

        let (a, b, c) = tokio::join!(fan.refresh(), fan.refresh(), fan.refresh());

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        // one call for init, one shared call for all three refreshes
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let fan = stub_fan(&stub).await;

        fan.refresh().await.unwrap();
        assert_eq!(fan.get_cached(Param::OnOff), Some(Value::Bool(true)));

        stub.set_fail(true);

        let err = fan.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Timeout(_))
        ));

        // stale-but-available: the old values stay visible
        assert_eq!(fan.get_cached(Param::OnOff), Some(Value::Bool(true)));
        assert_eq!(fan.get_cached(Param::Humidity), Some(Value::Percent(49)));
    }

    #[tokio::test]
    async fn test_out_of_range_write_sends_nothing() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let fan = stub_fan(&stub).await;

        let err = fan.set_analog_threshold(150).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert_eq!(stub.calls(), 1); // init only

        let err = fan.set_humidity_threshold(90).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_write_does_not_update_cache() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let fan = stub_fan(&stub).await;

        fan.refresh().await.unwrap();
        fan.turn_off().await.unwrap();

        // write-then-read-back: the cache still shows the old state
        assert_eq!(fan.get_cached(Param::OnOff), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_maintenance_actions() {
        let stub = StubExchange::new(FULL_STATUS.to_vec());
        let fan = stub_fan(&stub).await;

        fan.reset_filter_timer().await.unwrap();
        fan.reset_alarms().await.unwrap();

        assert_eq!(stub.calls(), 3);
    }

    #[test]
    fn test_pick_unclaimed_skips_claimed_ids() {
        let claimed = ClaimedIds::default();
        claimed.claim("FAN1FAN1FAN1FAN1");

        let found = vec![
            DiscoveredFan {
                addr: "192.168.0.10:4000".parse().unwrap(),
                id: "FAN1FAN1FAN1FAN1".to_string(),
            },
            DiscoveredFan {
                addr: "192.168.0.11:4000".parse().unwrap(),
                id: "FAN2FAN2FAN2FAN2".to_string(),
            },
        ];

        let picked = pick_unclaimed(found.clone(), &claimed).unwrap();
        assert_eq!(picked.id, "FAN2FAN2FAN2FAN2");

        claimed.claim("FAN2FAN2FAN2FAN2");
        assert_eq!(pick_unclaimed(found, &claimed), None);
    }
}
