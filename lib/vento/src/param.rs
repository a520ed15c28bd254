//! Static table of Vento Expert protocol parameters.
//!
//! Every parameter the unit exposes is a variant here, so an unknown key is
//! a compile error rather than a runtime surprise. Wire codes follow the
//! Blauberg v.2 register map.

/// A named device parameter with a protocol-level field code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    OnOff,
    SpeedMode,
    BoostStatus,
    TimerMode,
    TimerCounter,
    HumiditySensor,
    RelaySensor,
    AnalogSensor,
    HumidityThreshold,
    BatteryVoltage,
    Humidity,
    AnalogVoltage,
    RelayStatus,
    ManualSpeed,
    Fan1Speed,
    Fan2Speed,
    FilterTimer,
    FilterTimerReset,
    BoostTime,
    Search,
    MachineHours,
    ResetAlarms,
    AlarmStatus,
    CloudServer,
    Firmware,
    FilterReplacement,
    WifiIp,
    AnalogThreshold,
    Airflow,
    UnitType,
}

impl Param {
    pub const ALL: [Param; 30] = [
        Param::OnOff,
        Param::SpeedMode,
        Param::BoostStatus,
        Param::TimerMode,
        Param::TimerCounter,
        Param::HumiditySensor,
        Param::RelaySensor,
        Param::AnalogSensor,
        Param::HumidityThreshold,
        Param::BatteryVoltage,
        Param::Humidity,
        Param::AnalogVoltage,
        Param::RelayStatus,
        Param::ManualSpeed,
        Param::Fan1Speed,
        Param::Fan2Speed,
        Param::FilterTimer,
        Param::FilterTimerReset,
        Param::BoostTime,
        Param::Search,
        Param::MachineHours,
        Param::ResetAlarms,
        Param::AlarmStatus,
        Param::CloudServer,
        Param::Firmware,
        Param::FilterReplacement,
        Param::WifiIp,
        Param::AnalogThreshold,
        Param::Airflow,
        Param::UnitType,
    ];

    pub const fn code(self) -> u16 {
        match self {
            Param::OnOff => 0x0001,
            Param::SpeedMode => 0x0002,
            Param::BoostStatus => 0x0006,
            Param::TimerMode => 0x0007,
            Param::TimerCounter => 0x000B,
            Param::HumiditySensor => 0x000F,
            Param::RelaySensor => 0x0014,
            Param::AnalogSensor => 0x0016,
            Param::HumidityThreshold => 0x0019,
            Param::BatteryVoltage => 0x0024,
            Param::Humidity => 0x0025,
            Param::AnalogVoltage => 0x002D,
            Param::RelayStatus => 0x0032,
            Param::ManualSpeed => 0x0044,
            Param::Fan1Speed => 0x004A,
            Param::Fan2Speed => 0x004B,
            Param::FilterTimer => 0x0064,
            Param::FilterTimerReset => 0x0065,
            Param::BoostTime => 0x0066,
            Param::Search => 0x007C,
            Param::MachineHours => 0x007E,
            Param::ResetAlarms => 0x0080,
            Param::AlarmStatus => 0x0083,
            Param::CloudServer => 0x0085,
            Param::Firmware => 0x0086,
            Param::FilterReplacement => 0x0088,
            Param::WifiIp => 0x009A,
            Param::AnalogThreshold => 0x00B2,
            Param::Airflow => 0x00B7,
            Param::UnitType => 0x00B9,
        }
    }

    pub const fn writable(self) -> bool {
        matches!(
            self,
            Param::OnOff
                | Param::SpeedMode
                | Param::HumiditySensor
                | Param::RelaySensor
                | Param::AnalogSensor
                | Param::HumidityThreshold
                | Param::ManualSpeed
                | Param::FilterTimerReset
                | Param::BoostTime
                | Param::ResetAlarms
                | Param::CloudServer
                | Param::AnalogThreshold
                | Param::Airflow
        )
    }

    /// Telemetry that changes on its own between polls.
    pub const fn volatile(self) -> bool {
        matches!(
            self,
            Param::Humidity
                | Param::AnalogVoltage
                | Param::BatteryVoltage
                | Param::Fan1Speed
                | Param::Fan2Speed
                | Param::TimerCounter
        )
    }

    /// Parameters requested by one refresh cycle.
    pub fn poll_set() -> impl Iterator<Item = Param> {
        Param::ALL.iter().copied().filter(|param| {
            !matches!(
                param,
                Param::FilterTimerReset | Param::ResetAlarms | Param::Search
            )
        })
    }

    /// Parameters read once during the session handshake.
    pub const IDENTITY: [Param; 4] = [
        Param::Search,
        Param::UnitType,
        Param::Firmware,
        Param::WifiIp,
    ];

    pub fn from_code(code: u16) -> Option<Param> {
        Param::ALL.iter().copied().find(|param| param.code() == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in Param::ALL.iter().enumerate() {
            for b in &Param::ALL[i + 1..] {
                assert_ne!(a.code(), b.code(), "{a:?} and {b:?} share a code");
            }
        }
    }

    #[test]
    fn test_poll_set_skips_actions() {
        let poll: Vec<_> = Param::poll_set().collect();
        assert!(!poll.contains(&Param::FilterTimerReset));
        assert!(!poll.contains(&Param::ResetAlarms));
        assert!(!poll.contains(&Param::Search));
        assert_eq!(poll.len(), Param::ALL.len() - 3);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Param::from_code(0x0019), Some(Param::HumidityThreshold));
        assert_eq!(Param::from_code(0x7777), None);
    }
}
