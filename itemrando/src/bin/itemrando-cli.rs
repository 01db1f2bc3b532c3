use anyhow::{Context, Result};
use clap::Parser;
use itemrando::randomize::{resolve_pool, Randomization, Randomizer, PoolEntry};
use itemrando::settings::RandomizerSettings;
use itemrando_game::{WorldDesc, WorldGraph};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
struct Args {
    #[arg(long)]
    world: PathBuf,

    #[arg(long)]
    seed: Option<usize>,

    #[arg(long)]
    max_attempts: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    output_assignment: Option<PathBuf>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,
}

// On-disk input: the world description plus the pool and default settings.
// Decoding this file is the caller's side of the boundary; the engine itself
// only ever sees the parsed forms.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorldFile {
    world: WorldDesc,
    pool: Vec<PoolEntry>,
    #[serde(default)]
    settings: RandomizerSettings,
}

fn read_world_file(path: &Path) -> Result<WorldFile> {
    let world_str = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let world_file: WorldFile = serde_json::from_str(&world_str)
        .with_context(|| format!("unable to parse {}", path.display()))?;
    Ok(world_file)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    std::fs::write(path, out).with_context(|| format!("unable to write {}", path.display()))?;
    Ok(())
}

fn get_randomization(args: &Args, world_file: &WorldFile) -> Result<Randomization> {
    let world = WorldGraph::build(&world_file.world).context("malformed world description")?;
    let pool = resolve_pool(&world, &world_file.pool).context("bad item pool")?;

    let mut settings = world_file.settings.clone();
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if let Some(max_attempts) = args.max_attempts {
        settings.max_attempts = max_attempts;
    }
    info!(
        "world: {} nodes, {} edges, {} item locations, seed {}",
        world.nodes.len(),
        world.edges.len(),
        world.item_locations.len(),
        settings.seed
    );

    let randomizer = Randomizer::new(&world, pool, &settings).context("bad settings")?;
    let randomization = match args.workers {
        Some(workers) if workers > 1 => randomizer.randomize_parallel(workers)?,
        _ => randomizer.randomize()?,
    };
    info!(
        "assignment found after {} attempt(s)",
        randomization.attempts_used
    );
    Ok(randomization)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let world_file = read_world_file(&args.world)?;
    let randomization = get_randomization(&args, &world_file)?;

    if let Some(path) = &args.output_assignment {
        write_json(path, &randomization.spoiler_log.all_items)?;
        info!("wrote assignment to {}", path.display());
    }
    if let Some(path) = &args.output_spoiler_log {
        write_json(path, &randomization.spoiler_log)?;
        info!("wrote spoiler log to {}", path.display());
    }
    if args.output_assignment.is_none() && args.output_spoiler_log.is_none() {
        println!("{}", serde_json::to_string_pretty(&randomization.spoiler_log.all_items)?);
    }
    Ok(())
}
