//! Typed parameter values and the numeric conversions between wire bytes
//! and what callers see. Every conversion the device needs lives here, so
//! consumers never parse duration strings or rescale millivolts themselves.

use std::fmt;

use crate::error::Error;
use crate::param::Param;

const BATTERY_MV_LOW: u16 = 2500;
const BATTERY_MV_HIGH: u16 = 3300;

/// Manual speed accepts 5..=100 percent; out-of-bounds input is clamped
/// rather than rejected. This is the one declared clamp policy.
const MANUAL_SPEED_MIN_PERCENT: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Percent(u8),
    Minutes(u8),
    Rpm(u16),
    /// Durations normalized to total hours.
    Hours(f32),
    Speed(SpeedMode),
    Airflow(Airflow),
    /// Battery charge derived from the raw millivolt reading.
    BatteryPercent(u8),
    Text(String),
    UnitType(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    Low,
    Medium,
    High,
    Manual,
}

impl SpeedMode {
    fn from_byte(byte: u8) -> Option<SpeedMode> {
        match byte {
            0x01 => Some(SpeedMode::Low),
            0x02 => Some(SpeedMode::Medium),
            0x03 => Some(SpeedMode::High),
            0xFF => Some(SpeedMode::Manual),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            SpeedMode::Low => 0x01,
            SpeedMode::Medium => 0x02,
            SpeedMode::High => 0x03,
            SpeedMode::Manual => 0xFF,
        }
    }
}

impl fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedMode::Low => write!(f, "low"),
            SpeedMode::Medium => write!(f, "medium"),
            SpeedMode::High => write!(f, "high"),
            SpeedMode::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Airflow {
    Ventilation,
    AirSupply,
    HeatRecovery,
}

impl Airflow {
    fn from_byte(byte: u8) -> Option<Airflow> {
        match byte {
            0x00 => Some(Airflow::Ventilation),
            0x01 => Some(Airflow::AirSupply),
            0x02 => Some(Airflow::HeatRecovery),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Airflow::Ventilation => 0x00,
            Airflow::AirSupply => 0x01,
            Airflow::HeatRecovery => 0x02,
        }
    }
}

impl fmt::Display for Airflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Airflow::Ventilation => write!(f, "ventilation"),
            Airflow::AirSupply => write!(f, "air_supply"),
            Airflow::HeatRecovery => write!(f, "heat_recovery"),
        }
    }
}

/// Decodes a raw wire value. `None` means the bytes do not form a valid
/// value for this parameter; the field is then treated as absent.
pub fn decode(param: Param, raw: &[u8]) -> Option<Value> {
    match param {
        Param::OnOff
        | Param::BoostStatus
        | Param::TimerMode
        | Param::HumiditySensor
        | Param::RelaySensor
        | Param::AnalogSensor
        | Param::RelayStatus
        | Param::AlarmStatus
        | Param::CloudServer
        | Param::FilterReplacement => Some(Value::Bool(*raw.first()? != 0)),

        Param::Humidity | Param::AnalogVoltage | Param::HumidityThreshold
        | Param::AnalogThreshold => Some(Value::Percent(*raw.first()?)),

        Param::ManualSpeed => Some(Value::Percent(raw_to_percent(*raw.first()?))),

        Param::BoostTime => Some(Value::Minutes(*raw.first()?)),

        Param::SpeedMode => SpeedMode::from_byte(*raw.first()?).map(Value::Speed),
        Param::Airflow => Airflow::from_byte(*raw.first()?).map(Value::Airflow),

        Param::BatteryVoltage => {
            let mv = u16_le(raw)?;
            Some(Value::BatteryPercent(battery_percent(mv)))
        }
        Param::Fan1Speed | Param::Fan2Speed => Some(Value::Rpm(u16_le(raw)?)),
        Param::UnitType => Some(Value::UnitType(u16_le(raw)?)),

        Param::TimerCounter => {
            // seconds, minutes, hours
            let [s, m, h] = *raw.first_chunk::<3>()?;
            Some(Value::Hours(
                h as f32 + m as f32 / 60.0 + s as f32 / 3600.0,
            ))
        }
        Param::FilterTimer => {
            // minutes, hours, days
            let [m, h, d] = *raw.first_chunk::<3>()?;
            Some(Value::Hours(d as f32 * 24.0 + h as f32 + m as f32 / 60.0))
        }
        Param::MachineHours => {
            // minutes, hours, days (little-endian u16)
            let [m, h, d_lo, d_hi] = *raw.first_chunk::<4>()?;
            let days = u16::from_le_bytes([d_lo, d_hi]);
            Some(Value::Hours(days as f32 * 24.0 + h as f32 + m as f32 / 60.0))
        }

        Param::Firmware => {
            let [major, minor, day, month, y_lo, y_hi] = *raw.first_chunk::<6>()?;
            let year = u16::from_le_bytes([y_lo, y_hi]);
            Some(Value::Text(format!(
                "{major}.{minor} {year:04}-{month:02}-{day:02}"
            )))
        }
        Param::WifiIp => {
            let [a, b, c, d] = *raw.first_chunk::<4>()?;
            Some(Value::Text(format!("{a}.{b}.{c}.{d}")))
        }
        Param::Search => {
            let id = std::str::from_utf8(raw).ok()?;
            Some(Value::Text(id.to_string()))
        }

        Param::FilterTimerReset | Param::ResetAlarms => None,
    }
}

/// Encodes a typed value into wire bytes, rejecting out-of-range writes
/// before any network call is made.
pub fn encode(param: Param, value: &Value) -> Result<Vec<u8>, Error> {
    if !param.writable() {
        return Err(Error::InvalidValue {
            param,
            expected: "a writable parameter",
        });
    }

    match (param, value) {
        (
            Param::OnOff
            | Param::HumiditySensor
            | Param::RelaySensor
            | Param::AnalogSensor
            | Param::CloudServer,
            Value::Bool(on),
        ) => Ok(vec![*on as u8]),

        (Param::SpeedMode, Value::Speed(mode)) => Ok(vec![mode.to_byte()]),
        (Param::Airflow, Value::Airflow(airflow)) => Ok(vec![airflow.to_byte()]),

        (Param::HumidityThreshold, Value::Percent(percent)) => {
            in_range(param, *percent as i64, 40, 80)?;
            Ok(vec![*percent])
        }
        (Param::AnalogThreshold, Value::Percent(percent)) => {
            in_range(param, *percent as i64, 0, 100)?;
            Ok(vec![*percent])
        }
        (Param::BoostTime, Value::Minutes(minutes)) => {
            in_range(param, *minutes as i64, 0, 60)?;
            Ok(vec![*minutes])
        }
        (Param::ManualSpeed, Value::Percent(percent)) => Ok(vec![percent_to_raw(*percent)]),

        (Param::FilterTimerReset | Param::ResetAlarms, _) => Ok(vec![]),

        (param, _) => Err(Error::InvalidValue {
            param,
            expected: expected_kind(param),
        }),
    }
}

fn expected_kind(param: Param) -> &'static str {
    match param {
        Param::SpeedMode => "a speed mode",
        Param::Airflow => "an airflow direction",
        Param::HumidityThreshold | Param::AnalogThreshold | Param::ManualSpeed => "a percentage",
        Param::BoostTime => "minutes",
        _ => "a boolean",
    }
}

fn in_range(param: Param, value: i64, min: i64, max: i64) -> Result<(), Error> {
    if value < min || value > max {
        return Err(Error::OutOfRange {
            param,
            value,
            min,
            max,
        });
    }

    Ok(())
}

fn u16_le(raw: &[u8]) -> Option<u16> {
    let [lo, hi] = *raw.first_chunk::<2>()?;
    Some(u16::from_le_bytes([lo, hi]))
}

/// RTC battery voltage to charge percent, clamped at the reading bounds.
pub fn battery_percent(mv: u16) -> u8 {
    let mv = mv.clamp(BATTERY_MV_LOW, BATTERY_MV_HIGH) as u32;
    let span = (BATTERY_MV_HIGH - BATTERY_MV_LOW) as u32;

    (((mv - BATTERY_MV_LOW as u32) * 100 + span / 2) / span) as u8
}

/// Parses a firmware-formatted duration like `"2d 5h 30m"` into total hours.
pub fn duration_hours(text: &str) -> Option<f32> {
    let mut hours = 0.0f32;

    for token in text.split_whitespace() {
        let split = token.len().checked_sub(1)?;
        if !token.is_char_boundary(split) {
            return None;
        }

        let (number, unit) = token.split_at(split);
        let number: f32 = number.parse().ok()?;

        hours += match unit {
            "d" => number * 24.0,
            "h" => number,
            "m" => number / 60.0,
            "s" => number / 3600.0,
            _ => return None,
        };
    }

    Some(hours)
}

/// Manual speed percent to the raw 0..=255 wire scale.
pub fn percent_to_raw(percent: u8) -> u8 {
    let percent = percent.clamp(MANUAL_SPEED_MIN_PERCENT, 100) as u32;
    ((percent * 255 + 50) / 100) as u8
}

/// Raw 0..=255 manual speed back to percent.
pub fn raw_to_percent(raw: u8) -> u8 {
    ((raw as u32 * 100 + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_percent() {
        assert_eq!(battery_percent(2900), 50);
        assert_eq!(battery_percent(2500), 0);
        assert_eq!(battery_percent(3300), 100);
        // clamped at the reading bounds
        assert_eq!(battery_percent(2400), 0);
        assert_eq!(battery_percent(3400), 100);
    }

    #[test]
    fn test_duration_hours() {
        assert_eq!(duration_hours("2d 5h 30m"), Some(53.5));
        assert_eq!(duration_hours("45m"), Some(0.75));
        assert_eq!(duration_hours("1d"), Some(24.0));
        assert_eq!(duration_hours("2x"), None);
        assert_eq!(duration_hours(""), Some(0.0));
    }

    #[test]
    fn test_manual_speed_scale() {
        assert_eq!(percent_to_raw(100), 255);
        assert_eq!(percent_to_raw(50), 128);
        // clamp policy, not an error
        assert_eq!(percent_to_raw(0), percent_to_raw(5));
        assert_eq!(raw_to_percent(255), 100);
        assert_eq!(raw_to_percent(128), 50);
    }

    #[test]
    fn test_decode_durations() {
        // 0s 30m 2h
        assert_eq!(
            decode(Param::TimerCounter, &[0x00, 0x1E, 0x02]),
            Some(Value::Hours(2.5))
        );
        // 30m 5h 2d
        assert_eq!(
            decode(Param::FilterTimer, &[0x1E, 0x05, 0x02]),
            Some(Value::Hours(53.5))
        );
        // 0m 8h 402d
        assert_eq!(
            decode(Param::MachineHours, &[0x00, 0x08, 0x92, 0x01]),
            Some(Value::Hours(9656.0))
        );
    }

    #[test]
    fn test_decode_battery() {
        assert_eq!(
            decode(Param::BatteryVoltage, &[0x54, 0x0B]),
            Some(Value::BatteryPercent(50))
        );
        // truncated value is absent, not an error
        assert_eq!(decode(Param::BatteryVoltage, &[0x54]), None);
    }

    #[test]
    fn test_decode_firmware() {
        assert_eq!(
            decode(Param::Firmware, &[0x00, 0x04, 0x01, 0x0B, 0xE3, 0x07]),
            Some(Value::Text("0.4 2019-11-01".to_string()))
        );
    }

    #[test]
    fn test_encode_range_check() {
        let err = encode(Param::AnalogThreshold, &Value::Percent(150)).unwrap_err();
        match err {
            Error::OutOfRange {
                param: Param::AnalogThreshold,
                value: 150,
                min: 0,
                max: 100,
            } => (),
            other => panic!("expected OutOfRange, got {other:?}"),
        }

        assert!(encode(Param::HumidityThreshold, &Value::Percent(39)).is_err());
        assert!(encode(Param::HumidityThreshold, &Value::Percent(40)).is_ok());
    }

    #[test]
    fn test_encode_rejects_read_only() {
        assert!(matches!(
            encode(Param::Humidity, &Value::Percent(50)),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_write_round_trip() {
        let cases = [
            (Param::OnOff, Value::Bool(true)),
            (Param::SpeedMode, Value::Speed(SpeedMode::Manual)),
            (Param::Airflow, Value::Airflow(Airflow::HeatRecovery)),
            (Param::HumidityThreshold, Value::Percent(55)),
            (Param::AnalogThreshold, Value::Percent(88)),
            (Param::BoostTime, Value::Minutes(30)),
            (Param::ManualSpeed, Value::Percent(60)),
        ];

        for (param, value) in cases {
            let raw = encode(param, &value).unwrap();
            assert_eq!(decode(param, &raw), Some(value), "{param:?}");
        }
    }
}
