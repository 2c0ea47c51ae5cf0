use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use moving_head::{PanTilt, RigSnapshot, TransformEngine, Zone};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use moving_head::core::init_tracing;
#[cfg(not(feature = "tracing"))]
use moving_head::core::init as init_logging;

/// Calibrate moving-head fixtures and solve aim angles from a rig snapshot.
#[derive(Debug, Parser)]
#[command(name = "moving-head", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `MOVING_HEAD_LOG` overrides it.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refit zones from their captures and write the snapshot back.
    Calibrate(CalibrateArgs),
    /// Pan/tilt that aims the fixture at a zone-plane point.
    Aim(AimArgs),
    /// Zone-plane point hit by a pan/tilt pair.
    Locate(LocateArgs),
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Rig snapshot (JSON).
    snapshot: PathBuf,
    /// Zones to refit. Defaults to every zone with at least four captures.
    #[arg(long = "zone")]
    zones: Vec<Zone>,
    /// Also derive side_1 and side_2 from the top and bottom rings.
    #[arg(long)]
    sides: bool,
    /// Output path. Defaults to overwriting the input.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct AimArgs {
    snapshot: PathBuf,
    #[arg(allow_negative_numbers = true)]
    x: f64,
    #[arg(allow_negative_numbers = true)]
    y: f64,
    #[arg(long, default_value = "top")]
    zone: Zone,
    /// Use the flipped pose when pan passes 90 degrees.
    #[arg(long)]
    wrap: bool,
}

#[derive(Debug, Args)]
struct LocateArgs {
    snapshot: PathBuf,
    #[arg(allow_negative_numbers = true)]
    pan: f64,
    #[arg(allow_negative_numbers = true)]
    tilt: f64,
    #[arg(long, default_value = "top")]
    zone: Zone,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    init_logging(cli.verbose)?;
    #[cfg(feature = "tracing")]
    init_tracing(false);

    match cli.command {
        Command::Calibrate(args) => calibrate(args),
        Command::Aim(args) => aim(args),
        Command::Locate(args) => locate(args),
    }
}

fn load_engine(path: &Path) -> Result<TransformEngine, Box<dyn std::error::Error>> {
    let snapshot = RigSnapshot::load_json(path)?;
    info!(
        "loaded {} zones from {}",
        snapshot.zones.len(),
        path.display()
    );
    Ok(TransformEngine::from_snapshot(&snapshot))
}

fn calibrate(args: CalibrateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = load_engine(&args.snapshot)?;

    let zones: Vec<Zone> = if args.zones.is_empty() {
        Zone::ALL
            .into_iter()
            .filter(|z| !(args.sides && matches!(z, Zone::Side1 | Zone::Side2)))
            .filter(|z| engine.captures(*z).len() >= 4)
            .collect()
    } else {
        args.zones
    };
    if zones.is_empty() && !args.sides {
        warn!("no zone has enough captures to calibrate");
    }

    for zone in zones {
        let h = engine.calibrate(zone)?;
        println!("{zone}: {:?}", h.to_array());
    }
    if args.sides {
        for side in engine.derive_sides()? {
            println!("{}: {:?}", side.zone, side.homography.to_array());
        }
    }

    let out = args.out.unwrap_or(args.snapshot);
    engine.snapshot().write_json(&out)?;
    info!("wrote {}", out.display());
    Ok(())
}

fn aim(args: AimArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = load_engine(&args.snapshot)?;
    let target = Point2::new(args.x, args.y);
    let PanTilt { pan, tilt } = if args.wrap {
        engine.solve_aim_with_wrap(target, args.zone)?
    } else {
        engine.solve_aim(target, args.zone)?
    };
    println!("{pan:.6} {tilt:.6}");
    Ok(())
}

fn locate(args: LocateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = load_engine(&args.snapshot)?;
    let p = engine.locate(PanTilt::new(args.pan, args.tilt), args.zone)?;
    println!("{:.6} {:.6}", p.x, p.y);
    Ok(())
}
