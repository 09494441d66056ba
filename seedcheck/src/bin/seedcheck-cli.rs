use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use seedcheck::resolver::{resolve, validate_layout, Verdict};
use seedcheck::ResolverSettings;
use seedcheck_game::{GameDescription, ResourceKind, WorldGraph};
use seedcheck_logic::{GamePatches, PatchesData, State};

#[derive(Parser)]
struct Args {
    #[arg(long)]
    game: PathBuf,

    #[arg(long)]
    patches: Option<PathBuf>,

    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long)]
    random_seed: Option<u64>,

    #[arg(long)]
    max_attempts: Option<usize>,

    #[arg(long)]
    timeout_seconds: Option<f32>,

    // Use the greedy reach check instead of the full solver.
    #[arg(long)]
    reach_only: bool,

    // Print the resources of one kind (e.g. "Item", "Trick") and exit.
    #[arg(long)]
    list_resources: Option<String>,
}

fn get_settings(args: &Args) -> Result<ResolverSettings> {
    let mut settings = match &args.settings {
        Some(path) => ResolverSettings::load(path)?,
        None => ResolverSettings::default(),
    };
    if let Some(seed) = args.random_seed {
        settings.random_seed = seed;
    }
    if args.max_attempts.is_some() {
        settings.max_attempts = args.max_attempts;
    }
    if args.timeout_seconds.is_some() {
        settings.timeout_seconds = args.timeout_seconds;
    }
    if args.reach_only {
        settings.validate_with_solver = false;
    }
    Ok(settings)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let settings = get_settings(&args)?;

    let description = GameDescription::load(&args.game)?;
    let graph = WorldGraph::build(&description, settings.layers().as_ref())
        .with_context(|| format!("building world graph from {}", args.game.display()))?;
    if let Some(kind) = &args.list_resources {
        let kind = ResourceKind::parse(kind)?;
        for info in graph.resource_database.table(kind) {
            info!("{:?} {} ({})", info.id, info.short_name, info.long_name);
        }
        return Ok(());
    }

    let patches = match &args.patches {
        Some(path) => GamePatches::build(&PatchesData::load(path)?, &graph)?,
        None => GamePatches::default(),
    };
    info!(
        "Loaded {} nodes, {} assigned pickups, {} tricks in use",
        graph.nodes.len(),
        patches.pickup_assignment.len(),
        graph.used_trick_levels().len()
    );

    if !settings.validate_with_solver {
        if validate_layout(&graph, &patches, &settings)? {
            info!("Layout is beatable (greedy check)");
            return Ok(());
        }
        bail!("Layout is not beatable by greedy collection");
    }

    let report = resolve(&graph, &patches, &settings, None)?;
    match &report.verdict {
        Verdict::Succeeded(state) => {
            for node in State::full_path(state) {
                info!("  {}", graph.node_name(node));
            }
            info!("Layout is beatable ({} attempts)", report.attempts);
            Ok(())
        }
        Verdict::Impossible => bail!("Layout is impossible"),
        Verdict::AttemptsExhausted { attempts } => {
            bail!("Gave up after {attempts} attempts")
        }
        Verdict::TimedOut { elapsed } => bail!("Timed out after {:.3}s", elapsed.as_secs_f32()),
        Verdict::Cancelled { attempts } => bail!("Cancelled after {attempts} attempts"),
    }
}
