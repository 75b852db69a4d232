//! # STRATA Memory Soak
//!
//! Builds the allocator roles, replays the reference workload against
//! them, and writes the usage data log.
//!
//! ```bash
//! # Reference wiring
//! ./memory_soak
//!
//! # Custom wiring, custom data log, verbose
//! RUST_LOG=strata_core=debug ./memory_soak strata.toml usage.csv
//! ```
//!
//! Exits non-zero on the first allocation, delivery or data failure.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strata::{AllocatorRoleSet, MemoryConfig, SignalRouter, SoakRunner, UsageReport};
use strata_core::SystemBlockRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Seed for sizes and release orders, fixed so runs are comparable.
const WORKLOAD_SEED: u64 = 0x5354_5241_5441;

/// Default data log path.
const DATALOG_PATH: &str = "datalog.csv";

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    STRATA MEMORY SOAK v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════════");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let datalog_path = args.next().map_or_else(|| PathBuf::from(DATALOG_PATH), PathBuf::from);

    let config = match &config_path {
        Some(path) => match MemoryConfig::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%err, "invalid memory config");
                return ExitCode::FAILURE;
            }
        },
        None => MemoryConfig::default(),
    };

    let registry = SystemBlockRegistry::new();
    let router = match SignalRouter::from_config(&config) {
        Ok(router) => router,
        Err(err) => {
            tracing::error!(%err, "invalid routing table");
            return ExitCode::FAILURE;
        }
    };
    let mut roles = match AllocatorRoleSet::from_config(&registry, &config) {
        Ok(roles) => roles,
        Err(err) => {
            tracing::error!(%err, "invalid memory config");
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let outcome = SoakRunner::new(&mut roles, &router, ChaCha8Rng::seed_from_u64(WORKLOAD_SEED)).run_all();
    let elapsed = start.elapsed();

    let report = UsageReport::capture(&roles);
    report.log();
    if let Err(err) = write_datalog(&report, &datalog_path) {
        tracing::error!(%err, path = %datalog_path.display(), "failed to write data log");
        return ExitCode::FAILURE;
    }

    match outcome {
        Ok(summary) => {
            println!();
            println!("   ✓ {} allocations", summary.allocations);
            println!("   ✓ {} releases", summary.releases);
            println!("   ✓ {} lifecycle events", summary.events);
            println!("   ✓ completed in {elapsed:.2?}");
            println!("   ✓ data log: {}", datalog_path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "soak workload failed");
            eprintln!("   ✗ FATAL: {err}");
            ExitCode::FAILURE
        }
    }
}

fn write_datalog(report: &UsageReport, path: &Path) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    report.write_csv(&mut out)
}
