mod cli;
mod config;
mod errors;
mod loader;

use clap::Parser;
use serde::Serialize;
use std::fs::File;
use timspick::DiaAcquisition;
use tracing::level_filters::LevelFilter;
use tracing::{
    error,
    info,
};
use tracing_subscriber::EnvFilter;
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

use cli::Cli;
use config::Config;
use errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// Save with compression
fn save_compressed<T: Serialize>(data: &T, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    let mut encoder = Encoder::new(file, 3)?;
    bincode::serialize_into(&mut encoder, data)?;
    encoder.finish()?;
    Ok(())
}

// Load with decompression
fn load_compressed<T: serde::de::DeserializeOwned>(
    path: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let decoder = Decoder::new(file)?;
    let data = bincode::deserialize_from(decoder)?;
    Ok(data)
}

fn main() -> std::result::Result<(), CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    // Parse command line arguments
    let args = Cli::parse();

    // Load and parse configuration
    let conf = match std::fs::File::open(args.config.clone()) {
        Ok(x) => x,
        Err(e) => {
            return Err(CliError::Io {
                source: e.to_string(),
                path: Some(args.config.to_string_lossy().to_string()),
            });
        }
    };
    let config: Result<Config, _> = serde_json::from_reader(conf);
    let mut config = match config {
        Ok(x) => x,
        Err(e) => {
            return Err(CliError::ParseError { msg: e.to_string() });
        }
    };

    // Override config with command line arguments if provided
    if let Some(sample_file) = args.sample_file {
        config.sample_file_name = Some(sample_file);
    }
    if let Some(output_dir) = args.output_dir {
        config.output_directory = Some(output_dir);
    }
    if let Some(threads) = args.threads {
        config.picking.number_of_threads = threads;
    }

    let sample_file = match config.sample_file_name {
        Some(ref x) => x.clone(),
        None => {
            return Err(CliError::Config {
                source: "No sample provided, please provide one in either the config file or with the --sample-file flag".to_string(),
            });
        }
    };
    let output_directory = match config.output_directory {
        Some(ref x) => x.clone(),
        None => {
            return Err(CliError::Config {
                source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
            });
        }
    };
    info!("Parsed configuration: {:#?}", config.clone());

    let cache_location = sample_file.with_extension("dia.zst");

    fn maybe_cache_load_acquisition(cache_loc: &std::path::PathBuf) -> Option<DiaAcquisition> {
        info!(
            "Attempting to load flattened acquisition from cache at {:?}",
            cache_loc
        );
        match load_compressed(cache_loc.to_str().unwrap()) {
            Ok(data) => {
                info!("Loaded flattened acquisition from cache at {:?}", cache_loc);
                Some(data)
            }
            Err(e) => {
                error!(
                    "Failed to load flattened acquisition from cache at {:?}: {:?}",
                    cache_loc, e
                );
                None
            }
        }
    }

    fn uncached_load_acquisition(
        sample_file: &std::path::Path,
        cache_loc: &std::path::Path,
    ) -> Result<DiaAcquisition, CliError> {
        info!("Starting flattening of the raw data (might take a min)");
        let data = loader::flatten_dia_sample(sample_file)?;

        // Save to cache
        info!("Saving flattened acquisition to cache at {:?}", cache_loc);
        if let Err(e) = save_compressed(&data, cache_loc.to_str().unwrap()) {
            error!("Failed to save flattened acquisition to cache: {:?}", e);
        } else {
            info!("Saved flattened acquisition to cache");
        }
        Ok(data)
    }

    let data = match maybe_cache_load_acquisition(&cache_location) {
        Some(data) => data,
        None => uncached_load_acquisition(&sample_file, &cache_location)?,
    };

    let sample_name = sample_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "sample".to_string());

    let summary = timspick::pipeline::run(&data, &config.picking, &output_directory, &sample_name)?;
    info!(
        "{} peaks picked into {} clusters: {} precursors ({} monoisotopic), {} fragments",
        summary.num_peaks,
        summary.num_clusters,
        summary.num_precursors,
        summary.num_monoisotopic,
        summary.num_fragments,
    );

    Ok(())
}
