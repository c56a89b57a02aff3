use anyhow::Context;
use clap::Parser;
use image::ImageReader;
use log::LevelFilter;
use std::path::PathBuf;

use partcounter::{Config, DebugConfig, PartDetector, PartType, Session};

#[derive(Parser)]
#[command(name = "partcounter")]
#[command(about = "Count nuts, bolts, screws and washers on a tray")]
struct Cli {
    /// Images of the same tray, in capture order
    #[arg(value_name = "IMAGE", required = true)]
    image_paths: Vec<PathBuf>,

    /// Drop objects classified below this confidence
    #[arg(long, default_value_t = 0.3)]
    min_confidence: f32,

    /// JSON configuration file (missing fields use defaults)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the session export as JSON
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Save debug outputs to directory (must be empty), one subdirectory per capture
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let session = Session::new(config.stability.clone());

    let mut detector = PartDetector::new(config).context("Invalid configuration")?;
    let debug_root = match &args.debug_out {
        Some(debug_dir) => Some(
            DebugConfig::new(debug_dir)
                .with_context(|| format!("Cannot use debug directory {}", debug_dir.display()))?,
        ),
        None => None,
    };

    for (i, path) in args.image_paths.iter().enumerate() {
        if let Some(root) = &debug_root {
            let debug = root
                .for_capture(i + 1)
                .with_context(|| format!("Cannot create debug directory for capture {}", i + 1))?;
            detector = detector.with_debug(debug);
        }

        log::debug!("Loading image: {}", path.display());
        let img = ImageReader::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .decode()
            .with_context(|| format!("Failed to decode {}", path.display()))?;

        let frame = detector
            .analyze(&img, args.min_confidence)
            .with_context(|| format!("Failed to analyze {}", path.display()))?;
        let report = session.record_frame(&frame);

        println!("\n=== Capture {} : {} ===", i + 1, path.display());
        println!("Objects counted: {}", frame.count);
        for part_type in PartType::ALL {
            let n = frame.count_of(part_type);
            if n > 0 {
                println!("  {:<8} {}", part_type, n);
            }
        }
        println!("Mean confidence: {:.2}", frame.mean_confidence);
        println!(
            "Stability: mode {} (consistency {:.0}%), {}",
            report.most_frequent_count,
            report.consistency_score * 100.0,
            report.recommendation
        );
    }

    let stats = session.session_stats();
    println!("\n=== Session ===");
    println!("Images: {}", stats.total_images);
    println!(
        "Counts: avg {:.1}, min {}, max {}",
        stats.average_count, stats.min_count, stats.max_count
    );
    println!("Duration: {:.1} min", stats.session_duration_minutes());

    if let Some(export_path) = &args.export {
        let json = session.export_session().to_json_pretty()?;
        std::fs::write(export_path, json)
            .with_context(|| format!("Failed to write export {}", export_path.display()))?;
        println!("Exported session to {}", export_path.display());
    }

    Ok(())
}
