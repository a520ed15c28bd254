use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;

use crate::param::Param;
use crate::value::{self, Airflow, SpeedMode, Value};

/// Immutable set of decoded parameter values from one refresh cycle.
/// A snapshot either reflects a whole response or is never published;
/// fields the firmware omits or flags as unsupported are simply absent.
#[derive(Debug)]
pub struct Snapshot {
    values: HashMap<Param, Value>,
    taken_at: Instant,
}

impl Snapshot {
    pub(crate) fn decode(params: &BTreeMap<u16, Vec<u8>>) -> Snapshot {
        let mut values = HashMap::new();

        for (code, raw) in params {
            let Some(param) = Param::from_code(*code) else {
                // newer firmware may report codes we do not know yet
                continue;
            };

            if let Some(value) = value::decode(param, raw) {
                values.insert(param, value);
            }
        }

        Snapshot {
            values,
            taken_at: Instant::now(),
        }
    }

    pub fn get(&self, param: Param) -> Option<&Value> {
        self.values.get(&param)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Param, &Value)> {
        self.values.iter().map(|(param, value)| (*param, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    pub fn is_on(&self) -> Option<bool> {
        match self.get(Param::OnOff)? {
            Value::Bool(on) => Some(*on),
            _ => None,
        }
    }

    pub fn speed(&self) -> Option<SpeedMode> {
        match self.get(Param::SpeedMode)? {
            Value::Speed(mode) => Some(*mode),
            _ => None,
        }
    }

    pub fn airflow(&self) -> Option<Airflow> {
        match self.get(Param::Airflow)? {
            Value::Airflow(airflow) => Some(*airflow),
            _ => None,
        }
    }

    pub fn humidity(&self) -> Option<u8> {
        match self.get(Param::Humidity)? {
            Value::Percent(percent) => Some(*percent),
            _ => None,
        }
    }

    pub fn battery_percent(&self) -> Option<u8> {
        match self.get(Param::BatteryVoltage)? {
            Value::BatteryPercent(percent) => Some(*percent),
            _ => None,
        }
    }

    pub fn wifi_ip(&self) -> Option<&str> {
        match self.get(Param::WifiIp)? {
            Value::Text(ip) => Some(ip),
            _ => None,
        }
    }
}
