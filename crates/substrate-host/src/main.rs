//! Headless golden-hash binary for the TC substrate.
//!
//! # Startup Sequence
//!
//! 1. Load `substrate-config.yaml`, or the file named by `SUBSTRATE_CONFIG`
//! 2. Initialize structured logging (tracing) at `logging.level`, unless
//!    `RUST_LOG` is set
//! 3. Load the run from `substrate-run.yaml`, or the file named by
//!    `SUBSTRATE_RUN_CONFIG`
//! 4. Run every tick, collecting one hash per tick
//! 5. Write the hashes as NDJSON once the loop is done

use std::path::PathBuf;

use substrate_core::config::SubstrateConfig;
use substrate_host::{HeadlessRun, write_ndjson};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable naming the substrate config file.
const ENV_CONFIG: &str = "SUBSTRATE_CONFIG";

/// Default substrate config file.
const DEFAULT_CONFIG_FILE: &str = "substrate-config.yaml";

/// Environment variable naming the run file.
const ENV_RUN_CONFIG: &str = "SUBSTRATE_RUN_CONFIG";

/// Default run file.
const DEFAULT_RUN_FILE: &str = "substrate-run.yaml";

/// Filter for `level`, falling back to `info` when it does not parse.
fn configured_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn path_from_env(var: &str, default: &str) -> PathBuf {
    std::env::var_os(var).map_or_else(|| PathBuf::from(default), PathBuf::from)
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if the config or run file is unreadable or invalid,
/// the run cannot be set up, or the output cannot be written.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path_from_env(ENV_CONFIG, DEFAULT_CONFIG_FILE);
    let config = SubstrateConfig::load_or_default(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(&config.logging.level)))
        .with_target(true)
        .init();

    info!(config = %config_path.display(), "substrate-headless starting");

    let run_path = path_from_env(ENV_RUN_CONFIG, DEFAULT_RUN_FILE);
    let run = HeadlessRun::load_or_default(&run_path)?;
    info!(
        stepper = %run.stepper,
        steps = run.steps,
        base_seed = run.base_seed,
        "Run loaded"
    );

    let records = run.run_with_config(&config)?;
    let output = run.output_path();
    write_ndjson(&output, &records)?;

    if let Some(last) = records.last() {
        info!(tick = last.tick, hash = %last.hash, "final hash");
    }
    info!(output = %output.display(), "substrate-headless finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn logging_level_drives_the_filter() {
        assert_eq!(configured_filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(configured_filter("warn").max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn unparseable_levels_fall_back_to_info() {
        assert_eq!(configured_filter("substrate=loudest").max_level_hint(), Some(LevelFilter::INFO));
    }
}
