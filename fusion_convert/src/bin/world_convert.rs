use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use fusion_convert::{load_world, WorldFormat};
use fusion_world::{SchemaSet, World};

/// Loads a world file, migrating legacy-format content to the current
/// schemas on the way in.
#[derive(Parser, Debug)]
#[command(about = "Load a world file and migrate legacy-format content", version)]
struct Args {
    /// Path to the world file
    world: PathBuf,

    /// Path to write the converted world as a JSON manifest
    #[arg(long)]
    out: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Serialize)]
struct WorldManifest<'a> {
    source: String,
    format: WorldFormat,
    converted: bool,
    world: &'a World,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let bytes = fs::read(&args.world)
        .with_context(|| format!("reading world file {}", args.world.display()))?;

    let schemas = SchemaSet::current();
    let loaded = load_world(&bytes, &schemas)
        .with_context(|| format!("loading world {}", args.world.display()))?;

    println!(
        "Loaded {} ({:?} format{})",
        args.world.display(),
        loaded.format,
        if loaded.converted { ", converted" } else { "" }
    );
    println!("Entities: {}", loaded.world.len());

    let mut by_class: BTreeMap<&str, usize> = BTreeMap::new();
    for entity in loaded.world.entities() {
        *by_class.entry(entity.class.as_str()).or_default() += 1;
    }
    for (class, count) in &by_class {
        println!("  {count:>4} {class}");
    }

    if let Some(path) = args.out.as_ref() {
        let manifest = WorldManifest {
            source: args.world.display().to_string(),
            format: loaded.format,
            converted: loaded.converted,
            world: &loaded.world,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .context("serializing converted world to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("writing world manifest to {}", path.display()))?;
        println!("Saved converted world manifest to {}", path.display());
    }

    Ok(())
}
