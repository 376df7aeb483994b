//! Command-line driver for the cozy synthesizer.
//!
//! Grounded on SPEC_FULL.md §10.3: a `clap`-derived CLI reading a
//! JSON-serialized `Spec` (§6 — no concrete-syntax parser is in scope,
//! so JSON is the input/output format) and an optional JSON `Config`
//! file, running `libcozy::synthesize`, and writing the result back out
//! as pretty-printed text and/or JSON.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use libcozy::config::Config;
use libcozy::syntax::Spec;

#[derive(Parser, Debug)]
#[command(name = "cozy", about = "Synthesizes an incremental implementation of a data structure spec")]
struct Args {
    /// Path to a JSON-serialized input `Spec`.
    spec: PathBuf,

    /// Path to a JSON `Config` file overriding the default options.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to spend improving each public query before emitting
    /// whatever has been found so far.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Directory improvement jobs write their per-query logs into.
    #[arg(long)]
    log_dir: Option<String>,

    /// Where to write the synthesized spec's JSON form, in addition to
    /// printing its pretty-printed text to stdout.
    #[arg(long)]
    out_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .init()
        .context("failed to install the logger")?;

    let args = Args::parse();

    let spec_text = fs::read_to_string(&args.spec)
        .with_context(|| format!("reading spec file {}", args.spec.display()))?;
    let spec: Spec = serde_json::from_str(&spec_text)
        .with_context(|| format!("parsing spec file {}", args.spec.display()))?;

    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(log_dir) = args.log_dir {
        config.log_dir = log_dir;
    }

    log::info!("synthesizing '{}'", spec.name);
    let result = libcozy::synthesize(spec, &config, Duration::from_secs(args.timeout_secs))
        .context("synthesis failed")?;

    println!("{result}");

    if let Some(out_json) = args.out_json {
        let json = serde_json::to_string_pretty(&result).context("serializing result spec")?;
        fs::write(&out_json, json)
            .with_context(|| format!("writing {}", out_json.display()))?;
    }

    Ok(())
}
