use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use cross_mapping::storage::{load_mapping, AnimationClip};
use cross_mapping::{CrossMapping, SolverConfig};

#[derive(Parser, Debug)]
#[command(name = "cross_mapper")]
#[command(about = "Offline RBF cross mapping - solve, bake and inspect saved mappings", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a saved mapping and report the fit
    Solve {
        #[command(flatten)]
        mapping: MappingArgs,
    },

    /// Map every pose of a baked source clip onto a target clip
    Bake {
        #[command(flatten)]
        mapping: MappingArgs,

        /// Source clip ({"anim": [[...], ...]}, .json or .json.gz)
        #[arg(long)]
        input: PathBuf,

        /// Output clip path (.json or .json.gz)
        #[arg(long)]
        output: PathBuf,
    },

    /// Print snapshot names and pairwise distance matrices
    Inspect {
        #[command(flatten)]
        mapping: MappingArgs,
    },
}

#[derive(clap::Args, Debug)]
struct MappingArgs {
    /// Mapping file (JSON array of mapping records)
    #[arg(long)]
    mappings: PathBuf,

    /// Which record of the mapping file to use
    #[arg(long, default_value = "0")]
    index: usize,

    /// Solver config JSON (method, rcond_tolerance); the record's sigma
    /// replaces the config's, use --sigma to override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the record's sigma
    #[arg(long)]
    sigma: Option<f64>,
}

/// Load a mapping record into an offline session (no trackers bound).
fn load_session(args: &MappingArgs) -> Result<(String, CrossMapping)> {
    let config = match args.config.as_deref() {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };
    let record = load_mapping(&args.mappings, args.index)?;

    let mut cm = CrossMapping::with_config(config);
    cm.configure_from_record(&record)?;
    if let Some(sigma) = args.sigma {
        cm.set_sigma(sigma)?;
    }
    log::info!(
        "Loaded mapping '{}' ({} snapshots, sigma={})",
        record.name,
        cm.number_of_snapshots(),
        cm.sigma()
    );
    Ok((record.name, cm))
}

fn solve(args: &MappingArgs) -> Result<serde_json::Value> {
    let (name, mut cm) = load_session(args)?;
    cm.solve_unchecked()?;
    let interp = cm
        .interpolator()
        .ok_or_else(|| anyhow::anyhow!("solve produced no interpolator"))?;

    Ok(json!({
        "name": name,
        "snapshots": cm.number_of_snapshots(),
        "input_dim": interp.input_dim(),
        "output_dim": interp.output_dim(),
        "sigma": interp.sigma(),
        "method": cm.config().method,
        "fit_residual": cm.fit_residual()?,
    }))
}

fn bake(args: &MappingArgs, input: &Path, output: &Path) -> Result<serde_json::Value> {
    let (name, mut cm) = load_session(args)?;
    cm.solve_unchecked()?;

    let source = AnimationClip::load(input)?;
    let target = AnimationClip::new(cm.apply_sequence(&source.anim)?);
    target.save(output)?;
    log::info!("Wrote {} frame(s) to {}", target.frame_count(), output.display());

    Ok(json!({
        "name": name,
        "frames": target.frame_count(),
        "output": output.display().to_string(),
    }))
}

fn inspect(args: &MappingArgs) -> Result<serde_json::Value> {
    let (name, cm) = load_session(args)?;
    let matrices = cm.snapshot_distance_matrices()?;
    Ok(json!({
        "name": name,
        "sigma": cm.sigma(),
        "distances": matrices,
    }))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let report = match &args.command {
        Command::Solve { mapping } => solve(mapping)?,
        Command::Bake {
            mapping,
            input,
            output,
        } => {
            if input == output {
                anyhow::bail!("--input and --output must differ");
            }
            bake(mapping, input, output)?
        }
        Command::Inspect { mapping } => inspect(mapping)?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
