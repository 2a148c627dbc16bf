use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};
use shiftdash_core::hal::EdgeLine;
use shiftdash_core::Config;

mod bench;

use bench::Bench;

/// Drive the shift-light dashboard core on the host with simulated peripherals.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// What to simulate.
    #[arg(value_enum, default_value_t = Scenario::Ramp)]
    scenario: Scenario,

    /// JSON configuration file. Built-in defaults when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// RPM increment between ramp steps.
    #[arg(long, default_value_t = 500)]
    step: u32,

    /// Simulated time spent at each ramp step (ms).
    #[arg(long, default_value_t = 50)]
    dwell: u32,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Sweep engine speed up into the shift zone and back down
    Ramp,
    /// Paddle and hall-sensor sequences through every gear
    Shift,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    init_logging(config.log_level.as_level_filter(), args.verbose, args.quiet);

    info!("shiftdash simulator v{}", env!("CARGO_PKG_VERSION"));

    let mut bench = Bench::new(&config)?;
    println!("{:>12} {}", "boot", bench.status_line());

    match args.scenario {
        Scenario::Ramp => ramp(&mut bench, &config, args.step.max(1), args.dwell),
        Scenario::Shift => shift(&mut bench),
    }

    println!(
        "strip faults: {}, ignored edges: {}",
        bench.controller().strip_faults(),
        bench.controller().shared().interlock.ignored_edges()
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn init_logging(base: LevelFilter, verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => base,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn ramp(bench: &mut Bench, config: &Config, step: u32, dwell_ms: u32) {
    let top = config.strip.max_rpm + config.strip.redline_margin;
    info!(
        "Ramping 0 -> {top} -> 0 RPM in {step} RPM steps, shift zone from {} RPM",
        bench.controller().zone().threshold_rpm()
    );

    let speeds: Vec<u32> = (0..=top).step_by(step as usize).collect();
    for &rpm in speeds.iter().chain(speeds.iter().rev().skip(1)) {
        bench.run_at(rpm, dwell_ms);
        println!("{:>12} {}", format!("{rpm} rpm"), bench.status_line());
    }
}

fn step(bench: &mut Bench, label: &str, line: EdgeLine) {
    bench.edge(line);
    println!("{label:>12} {}", bench.status_line());
}

fn shift(bench: &mut Bench) {
    info!("Upshifting past top gear");
    for _ in 0..7 {
        step(bench, "up pull", EdgeLine::UpPaddle);
        step(bench, "up confirm", EdgeLine::UpConfirm);
    }

    info!("Down paddle while the up relay is engaged");
    step(bench, "up pull", EdgeLine::UpPaddle);
    step(bench, "down pull", EdgeLine::DownPaddle);
    step(bench, "down confirm", EdgeLine::DownConfirm);
    step(bench, "up confirm", EdgeLine::UpConfirm);

    info!("Downshifting past first gear");
    for _ in 0..7 {
        step(bench, "down pull", EdgeLine::DownPaddle);
        step(bench, "down confirm", EdgeLine::DownConfirm);
    }

    info!("Pull with no hall confirmation: relay stays engaged");
    step(bench, "up pull", EdgeLine::UpPaddle);
}
