use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use stack3d::io::read_config;
use stack3d::stack::StackElementKind;
use stack3d::{SimResult, StackChanges, StackDescription, ThermalData};
use std::path::PathBuf;

/// Thermal simulation of a 3D-stacked chip described by a JSON file.
#[derive(Parser)]
#[command(name = "stack3d")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Thermal simulator for 3D-stacked chips", long_about = None)]
struct Cli {
    /// Stack configuration (JSON)
    config: PathBuf,

    /// Print the final thermal map of this stack element
    #[arg(short, long)]
    map: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_target(false)
        .init();

    let config = read_config(&cli.config)?;
    let (mut stack, analysis) = config.build()?;
    let transient = analysis.is_transient();

    let mut thermal_data = ThermalData::new(&stack, analysis)?;
    thermal_data.fill_thermal_data(&stack, StackChanges::all())?;

    if transient {
        let mut slot = 0;
        while thermal_data.emulate_slot(&mut stack)? != SimResult::EndOfSimulation {
            slot += 1;
            info!(
                "Slot {slot} done at t = {:.6} s",
                thermal_data.analysis().simulated_time()
            );
            report(&thermal_data, &stack)?;
        }
        if slot == 0 {
            warn!("No power values to simulate");
        }
    } else if thermal_data.emulate_steady(&mut stack)? == SimResult::EndOfSimulation {
        warn!("No power values to simulate");
    } else {
        report(&thermal_data, &stack)?;
    }

    if let Some(element) = &cli.map {
        let stdout = std::io::stdout();
        thermal_data.print_thermal_map(&stack, element, &mut stdout.lock())?;
    }

    Ok(())
}

/// Logs the hottest cell of every floorplan element and the hottest outlet.
fn report(thermal_data: &ThermalData, stack: &StackDescription) -> Result<()> {
    for element in stack.elements() {
        let Some(floorplan) = element.floorplan() else {
            continue;
        };
        let max = thermal_data.all_max_temperatures_of_floorplan(stack, &element.id)?;
        for (fp_element, t) in floorplan.elements().iter().zip(max) {
            info!("  {}/{}: max {t:.3} K", element.id, fp_element.id);
        }
    }

    let cavity = stack
        .elements()
        .iter()
        .find(|e| matches!(e.kind, StackElementKind::Channel));
    if let (Some(channel), Some(element)) = (stack.channel(), cavity) {
        let outlets = (0..channel.n_outlets(stack.dimensions()))
            .map(|i| thermal_data.channel_outlet_temperature(stack, &element.id, i))
            .collect::<Result<Vec<_>, _>>()?;
        let max = outlets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        info!("  {}: hottest outlet {max:.3} K", element.id);
    }
    Ok(())
}
