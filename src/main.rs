use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use traffic_link::facade::{FacadeConfig, LocalSession, Rgba, Session, TrafficFacade};

#[derive(Parser)]
#[command(name = "traffic_link")]
#[command(about = "Drive a simulation session through the resilient façade")]
struct Cli {
    /// Number of simulation steps to run
    #[arg(long, default_value = "240")]
    ticks: u32,

    /// Simulated seconds per step
    #[arg(long, default_value = "0.5", value_parser = parse_delta)]
    delta: f64,

    /// Number of vehicles to inject at start
    #[arg(long, default_value = "6")]
    vehicles: u32,

    /// Seed for route discovery
    #[arg(long)]
    seed: Option<u64>,

    /// Drop the session link at this step and restore it a second later
    #[arg(long)]
    disconnect_at: Option<u32>,

    /// Keep pending operations when a connection fault is observed
    #[arg(long)]
    keep_pending_on_fault: bool,
}

/// Edges vehicles are injected onto when they don't use the predefined route
const SPAWN_EDGES: [&str; 4] = ["J00_J10", "J20_J21", "J02_J01", "J22_J12"];

const PALETTE: [Rgba; 4] = [
    Rgba::new(0, 255, 0, 255),
    Rgba::new(255, 0, 0, 255),
    Rgba::new(0, 128, 255, 255),
    Rgba::new(255, 255, 255, 128),
];

/// Step length in seconds; finite and positive
fn parse_delta(value: &str) -> Result<f64, String> {
    let delta: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !delta.is_finite() || delta <= 0.0 {
        return Err(format!("delta must be finite and positive, got {}", value));
    }
    Ok(delta)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,traffic_link=info"),
    )
    .init();

    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the demo network with no session other than the in-process one
fn run_headless(cli: &Cli) -> Result<()> {
    println!("Running façade demo against the local session...");
    println!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);

    let ticks_per_second = (1.0 / cli.delta).ceil().max(1.0) as u32;

    let config = FacadeConfig {
        clear_pending_on_fault: !cli.keep_pending_on_fault,
        ..FacadeConfig::default()
    };
    let mut facade = TrafficFacade::with_config(LocalSession::demo_network()?, config, cli.seed);

    for index in 0..cli.vehicles {
        let vehicle_id = format!("veh{}", index);
        let route_or_edge = if index % 2 == 0 {
            "r_main"
        } else {
            SPAWN_EDGES[(index as usize / 2) % SPAWN_EDGES.len()]
        };
        let color = PALETTE[index as usize % PALETTE.len()];
        let speed = 8.0 + index as f64;

        let outcome = facade.inject_vehicle(&vehicle_id, route_or_edge, speed, color);
        info!("{} on {}: {:?}", vehicle_id, route_or_edge, outcome);
    }
    println!("Pending after injection: {}", facade.pending().len());
    println!();

    let mut reconnect_at = None;
    for tick in 1..=cli.ticks {
        if cli.disconnect_at == Some(tick) {
            warn!("Dropping session link at tick {}", tick);
            facade.session_mut().break_link();
            reconnect_at = Some(tick.saturating_add(ticks_per_second));
        }
        if reconnect_at == Some(tick) {
            info!("Restoring session connection at tick {}", tick);
            facade.session_mut().reconnect();
            reconnect_at = None;
        }

        if facade.session().is_connected() {
            if let Err(err) = facade.session_mut().step(cli.delta) {
                warn!("Step {} failed: {}", tick, err);
            }
        }

        if tick % ticks_per_second == 0 || tick == cli.ticks {
            print_summary(&mut facade, tick);
        }
    }

    println!("=== Final State ===");
    println!(
        "Arrived: {}, faults reported: {}",
        facade.session().arrived_count(),
        facade.session().faults_reported()
    );
    Ok(())
}

fn print_summary(facade: &mut TrafficFacade<LocalSession>, tick: u32) {
    let stats = facade.edge_stats();
    let rows = facade.vehicle_rows();

    println!(
        "--- After tick {} ({:.1}s simulated time) ---",
        tick,
        facade.session().time()
    );
    println!(
        "Vehicles: {} | Pending operations: {} | Signal J11: {} (phase {})",
        facade.vehicle_count(),
        facade.pending().len(),
        facade.traffic_light_state("J11"),
        facade.traffic_light_phase("J11"),
    );

    let mut busy: Vec<_> = stats.iter().filter(|(_, s)| !s.is_empty()).collect();
    busy.sort_by(|a, b| a.0.cmp(b.0));
    for (edge, edge_stats) in busy {
        println!(
            "  {:<10} vehicles: {}  avg speed: {:.2} m/s",
            edge, edge_stats.vehicle_count, edge_stats.average_speed
        );
    }
    for row in rows {
        println!(
            "  {:<6} {:<10} {:>6.2} m/s  rgba({}, {}, {}, {:.2})",
            row.id,
            row.edge,
            row.speed,
            row.color.r,
            row.color.g,
            row.color.b,
            row.opacity()
        );
    }
    println!();
}
