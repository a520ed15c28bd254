use std::process::ExitCode;

use log::{error, info};
use tokio::time::Duration;

use vento::{
    discover, Airflow, ClaimedIds, Fan, FanConfig, FanController, Param, SpeedMode, DEFAULT_PORT,
    DEFAULT_WINDOW,
};

const USAGE: &str = "usage: ventoctl <discover|status|watch|on|off|speed|airflow|reset-filter|reset-alarms> [value]

configuration via env: VENTO_HOST (default <broadcast>), VENTO_PORT,
VENTO_DEVICE_ID, VENTO_PASSWORD, VENTO_NAME";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    pretty_env_logger::init_timed();

    let mut args = std::env::args().skip(1);
    let command = match args.next() {
        Some(command) => command,
        None => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let result = match command.as_str() {
        "discover" => run_discover().await,
        "status" => run_status().await,
        "watch" => run_watch().await,
        "on" => run_set(Set::OnOff(true)).await,
        "off" => run_set(Set::OnOff(false)).await,
        "speed" => match args.next() {
            Some(value) => run_set(Set::Speed(value)).await,
            None => Err("speed needs a value: low, medium, high, manual or 5..=100".into()),
        },
        "airflow" => match args.next() {
            Some(value) => run_set(Set::Airflow(value)).await,
            None => Err("airflow needs a value: ventilation, air_supply or heat_recovery".into()),
        },
        "reset-filter" => run_set(Set::ResetFilter).await,
        "reset-alarms" => run_set(Set::ResetAlarms).await,
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

enum Set {
    OnOff(bool),
    Speed(String),
    Airflow(String),
    ResetFilter,
    ResetAlarms,
}

fn config_from_env() -> FanConfig {
    let mut config = FanConfig::default();

    if let Ok(host) = std::env::var("VENTO_HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("VENTO_PORT") {
        config.port = port.parse().expect("VENTO_PORT must be a port number");
    }
    if let Ok(device_id) = std::env::var("VENTO_DEVICE_ID") {
        config.device_id = device_id;
    }
    if let Ok(password) = std::env::var("VENTO_PASSWORD") {
        config.password = password;
    }
    if let Ok(name) = std::env::var("VENTO_NAME") {
        config.name = name;
    }

    config
}

async fn run_discover() -> Result<()> {
    let found = discover(None, DEFAULT_PORT, DEFAULT_WINDOW).await?;

    for fan in found {
        println!("{}\t{}", fan.id, fan.addr.ip());
    }

    Ok(())
}

async fn connect() -> Result<Fan> {
    let config = config_from_env();
    let fan = Fan::init(config, ClaimedIds::default()).await?;

    info!("connected to {} at {}", fan.id(), fan.addr());
    Ok(fan)
}

async fn run_status() -> Result<()> {
    let fan = connect().await?;
    let snapshot = fan.refresh().await?;

    println!("fan:      {} ({})", fan.id(), fan.addr().ip());
    if let Some(firmware) = fan.firmware() {
        println!("firmware: {firmware}");
    }

    let mut values: Vec<_> = snapshot.iter().collect();
    values.sort_by_key(|(param, _)| param.code());

    for (param, value) in values {
        println!("{param:?}: {value:?}");
    }

    Ok(())
}

async fn run_watch() -> Result<()> {
    let fan = connect().await?;

    let controller = FanController::new(fan);
    controller.start(Duration::from_secs(10));

    let mut rx = controller.subscribe();

    loop {
        rx.changed().await?;

        let health = rx.borrow_and_update().clone();
        if !health.available {
            println!("unavailable after {} failures", health.consecutive_failures);
            continue;
        }

        if let Some(snapshot) = health.snapshot {
            println!(
                "on={:?} speed={:?} humidity={:?} airflow={:?}",
                snapshot.is_on(),
                snapshot.speed(),
                snapshot.humidity(),
                snapshot.airflow(),
            );
        }
    }
}

async fn run_set(set: Set) -> Result<()> {
    let fan = connect().await?;

    match set {
        Set::OnOff(true) => fan.turn_on().await?,
        Set::OnOff(false) => fan.turn_off().await?,
        Set::Speed(value) => match value.as_str() {
            "low" => fan.set_speed_mode(SpeedMode::Low).await?,
            "medium" => fan.set_speed_mode(SpeedMode::Medium).await?,
            "high" => fan.set_speed_mode(SpeedMode::High).await?,
            "manual" => fan.set_speed_mode(SpeedMode::Manual).await?,
            other => {
                let percent: u8 = other.parse().map_err(|_| format!("bad speed {other:?}"))?;
                fan.set_speed_mode(SpeedMode::Manual).await?;
                fan.set_manual_speed_percent(percent).await?;
            }
        },
        Set::Airflow(value) => match value.as_str() {
            "ventilation" => fan.set_airflow(Airflow::Ventilation).await?,
            "air_supply" => fan.set_airflow(Airflow::AirSupply).await?,
            "heat_recovery" => fan.set_airflow(Airflow::HeatRecovery).await?,
            other => return Err(format!("bad airflow {other:?}").into()),
        },
        Set::ResetFilter => fan.reset_filter_timer().await?,
        Set::ResetAlarms => fan.reset_alarms().await?,
    }

    // read back the confirmed state instead of trusting the write
    let snapshot = fan.refresh().await?;
    println!(
        "on={:?} speed={:?} value={:?}",
        snapshot.is_on(),
        snapshot.speed(),
        snapshot.get(Param::ManualSpeed),
    );

    Ok(())
}
