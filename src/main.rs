use anyhow::Result;
use energy_budget_controller::{config, controller, hardware, telemetry};
use config::Config;
use controller::{BudgetController, ControllerSettings};
use energy_budget_controller::domain::LoadConfig;
use hardware::{Actuator, StateSource};
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::{info, warn};

type Backend = (Arc<dyn StateSource>, Arc<dyn Actuator>);

#[cfg(feature = "sim")]
fn backend(cfg: &Config, loads: &[LoadConfig]) -> Result<Backend> {
    use chrono::Local;
    use hardware::{SimulatedHouse, SimulatedHouseConfig, SimulatedLoad};

    let house = SimulatedHouse::new(
        SimulatedHouseConfig {
            base_load_kw: cfg.simulation.base_load_kw,
            noise_fraction: cfg.simulation.noise_fraction,
            random_seed: cfg.simulation.random_seed,
            loads: loads.iter().map(SimulatedLoad::from_config).collect(),
        },
        cfg.period(),
    );

    let stepper = house.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            stepper.step(Local::now().naive_local()).await;
        }
    });

    info!("using simulated house backend");
    Ok((Arc::new(house.clone()), Arc::new(house)))
}

#[cfg(not(feature = "sim"))]
fn backend(_cfg: &Config, _loads: &[LoadConfig]) -> Result<Backend> {
    anyhow::bail!("no hardware backend compiled in, enable the `sim` feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    init_tracing(&cfg.logging);

    let settings = ControllerSettings::from_config(&cfg);
    let loads = cfg.load_configs()?;
    let (source, actuator) = backend(&cfg, &loads)?;

    info!(
        mode = %settings.mode,
        max_energy_kwh = settings.max_energy_kwh,
        period_minutes = cfg.budget.period_minutes,
        loads = loads.len(),
        "starting energy budget controller"
    );

    let controller = Arc::new(BudgetController::new(settings, loads, source, actuator)?);
    let handle = controller::spawn_controller(controller);

    let signal = telemetry::shutdown_signal().await;
    handle.abort();

    warn!(signal, "shutdown complete");
    Ok(())
}
