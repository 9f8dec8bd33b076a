//! sl-stereo CLI: run the reconstruction stages over a scene directory.

use clap::{Args, Parser, Subcommand};
use sl_stereo::core::{FieldTransform, ProjectorId, StereoPair};
use sl_stereo::disparity::DisparityMode;
use sl_stereo::{Pipeline, PipelineConfig, RunSummary, SceneStore};
use std::path::PathBuf;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sl-stereo")]
#[command(about = "Structured-light stereo disparity reconstruction")]
#[command(version)]
struct Cli {
    /// Scene directory (contains `computed/`).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Pipeline configuration (JSON). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON logs with span timings.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default pipeline configuration.
    InitConfig {
        /// Output path; prints to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Rectify decoded fields with the stored lookup maps.
    Rectify(ProjectorSelection),

    /// Compute, cross-check and filter per-projector disparities.
    Disparity {
        #[command(flatten)]
        select: ProjectorSelection,
        /// Use rectified decodes (bounded search window, filtering).
        #[arg(long)]
        rectified: bool,
    },

    /// Merge per-projector disparities of each pair.
    Merge {
        #[command(flatten)]
        select: PairSelection,
        #[arg(long)]
        rectified: bool,
    },

    /// Reproject decoded codes through the merged disparities.
    Reproject(ProjectorSelection),

    /// Combine merged, direct and reliable reprojected disparities.
    Merge2(PairSelection),

    /// Run every stage for every discovered projector and pair.
    Run {
        #[arg(long)]
        rectified: bool,
    },

    /// Rotate or mirror every decoded field in place.
    Transform {
        /// `rotate90cw` or `flip-y`.
        transform: FieldTransform,
    },

    /// Classify the reprojections of a pair.
    Reliability {
        /// Left and right position ids.
        #[arg(long, num_args = 2, value_names = ["LEFT", "RIGHT"], required = true)]
        pair: Vec<u32>,
    },

    /// Write an 8-bit PNG preview of a PFM field.
    #[cfg(feature = "image")]
    Preview {
        /// Input PFM file.
        #[arg(long)]
        input: PathBuf,
        /// Output PNG file.
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct PairSelection {
    /// Left and right position ids.
    #[arg(long, num_args = 2, value_names = ["LEFT", "RIGHT"])]
    pair: Option<Vec<u32>>,

    /// Select every discovered pair not given explicitly.
    #[arg(short, long)]
    all: bool,
}

impl PairSelection {
    fn resolve(&self, store: &SceneStore) -> CliResult<Vec<StereoPair>> {
        match (&self.pair, self.all) {
            (Some(p), _) => Ok(vec![pair_from(p)?]),
            (None, true) => Ok(store.pairs()),
            (None, false) => Err("pass --pair <LEFT> <RIGHT> or --all".into()),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct ProjectorSelection {
    /// Projector id.
    #[arg(long)]
    proj: Option<u32>,

    #[command(flatten)]
    pairs: PairSelection,
}

impl ProjectorSelection {
    fn resolve(
        &self,
        store: &SceneStore,
        discovered: impl FnOnce() -> Vec<ProjectorId>,
    ) -> CliResult<(Vec<ProjectorId>, Vec<StereoPair>)> {
        let projectors = match (self.proj, self.pairs.all) {
            (Some(p), _) => vec![ProjectorId(p)],
            (None, true) => discovered(),
            (None, false) => return Err("pass --proj <P> or --all".into()),
        };
        Ok((projectors, self.pairs.resolve(store)?))
    }
}

fn pair_from(ids: &[u32]) -> CliResult<StereoPair> {
    match ids {
        [l, r] => Ok(StereoPair::new(*l, *r)),
        _ => Err("--pair takes exactly two position ids".into()),
    }
}

fn mode(rectified: bool) -> DisparityMode {
    if rectified {
        DisparityMode::Rectified
    } else {
        DisparityMode::Unrectified
    }
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init();
        sl_stereo::core::init_tracing(cli.log_json, cli.verbose);
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        sl_stereo::core::init_from_verbosity(cli.verbose)?;
        Ok(())
    }
}

fn finish(stage: &str, summary: RunSummary) -> CliResult<()> {
    println!("{stage}: {summary}");
    if summary.is_success() {
        Ok(())
    } else {
        Err(format!("{stage}: {} units failed", summary.failed).into())
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = match &cli.config {
        Some(path) => PipelineConfig::load_json(path)?,
        None => PipelineConfig::default(),
    };
    let store = SceneStore::new(&cli.root);
    let pipeline = Pipeline::new(store.clone(), config);

    match &cli.command {
        Commands::InitConfig { out } => run_init_config(&config, out.as_ref()),
        Commands::Rectify(select) => {
            let (projs, pairs) =
                select.resolve(&store, || store.decoded_projectors(DisparityMode::Unrectified))?;
            finish("rectify", pipeline.run_rectify(&projs, &pairs))
        }
        Commands::Disparity { select, rectified } => {
            let mode = mode(*rectified);
            let (projs, pairs) = select.resolve(&store, || store.decoded_projectors(mode))?;
            finish("disparity", pipeline.run_disparity(&projs, &pairs, mode))
        }
        Commands::Merge { select, rectified } => {
            let pairs = select.resolve(&store)?;
            finish("merge", pipeline.run_merge(&pairs, mode(*rectified)))
        }
        Commands::Reproject(select) => {
            let (projs, pairs) = select.resolve(&store, || {
                store.disparity_projectors(DisparityMode::Rectified)
            })?;
            finish("reproject", pipeline.run_reproject(&projs, &pairs))
        }
        Commands::Merge2(select) => {
            let pairs = select.resolve(&store)?;
            finish("merge2", pipeline.run_merge2(&pairs))
        }
        Commands::Run { rectified } => finish("run", pipeline.run_all(mode(*rectified))),
        Commands::Transform { transform } => {
            finish("transform", pipeline.run_transform(*transform))
        }
        Commands::Reliability { pair } => run_reliability(&pipeline, pair_from(pair)?),
        #[cfg(feature = "image")]
        Commands::Preview { input, out } => {
            let field = sl_stereo::core::read_pfm(input)?;
            sl_stereo::preview::write_preview(&field, out)?;
            println!("wrote {}", out.display());
            Ok(())
        }
    }
}

// ── init-config ────────────────────────────────────────────────────────

fn run_init_config(config: &PipelineConfig, out: Option<&PathBuf>) -> CliResult<()> {
    match out {
        Some(path) => {
            config.write_json(path)?;
            println!("wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

// ── reliability ────────────────────────────────────────────────────────

fn run_reliability(pipeline: &Pipeline, pair: StereoPair) -> CliResult<()> {
    let report = pipeline.reliability_report(pair);
    if report.is_empty() {
        println!("no reprojections for pair {pair}");
    }
    for entry in report {
        let verdict = if entry.reliable { "reliable" } else { "unreliable" };
        match entry.record {
            Some(r) => println!(
                "proj{} {:?}: {verdict} (match {:.1}% -> {:.1}%, rms {:.3}, bad {:.1}% / {:.1}%)",
                entry.projector, entry.side, r.frac0, r.frac1, r.rms1, r.bad0, r.bad1
            ),
            None => println!("proj{} {:?}: {verdict} (no log)", entry.projector, entry.side),
        }
    }
    Ok(())
}
