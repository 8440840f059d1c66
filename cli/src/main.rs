mod cli;
mod config;
mod logger;

use crate::cli::{BuildArgs, Cli, Commands};
use crate::config::ProjectFile;
use crate::logger::LOGGER;
use clap::Parser;
use log::{LevelFilter, error, info};
use std::sync::Arc;
use tessera_engine::plugin::DevServerPlugin;
use tessera_engine::{BuildConfig, BuildStats, LogObserver, Orchestrator};
use tessera_shared::{TesseraError, TesseraResult, canonicalize_with_strip, to_slash};

#[tokio::main]
async fn main() -> TesseraResult {
    let cli = Cli::parse();

    let (options, watch, serve) = match cli.command {
        Commands::Build { options, watch } => (options, watch, false),
        Commands::Dev { options } => (options, true, true),
    };

    let log_level = match (options.silence, cli.verbose) {
        (true, _) => LevelFilter::Warn,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log_level))
        .map_err(|e| TesseraError::Config(e.to_string()))?;

    let config = Arc::new(load_config(&options, watch, serve)?.resolve().await?);
    info!(target: "tessera", "building {}", config.root_dir().display());
    let orchestrator = Arc::new(Orchestrator::new(config.clone()));

    match orchestrator.run().await {
        Ok(stats) => report(&stats, &config),
        Err(err) if watch => error!(target: "tessera", "{err}"),
        Err(err) => return Err(err),
    }
    if !watch {
        return Ok(());
    }

    let session = orchestrator.watch(Arc::new(LogObserver))?;
    info!(target: "tessera", "watching for file changes, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    session.close().await;
    Ok(())
}

fn load_config(options: &BuildArgs, watch: bool, serve: bool) -> TesseraResult<BuildConfig> {
    let root = canonicalize_with_strip(&options.root)?;
    let file = ProjectFile::load(&root, options.config.as_deref())?;
    let mut config = file.into_build_config(&root)?;

    if options.bundle {
        config = config.with_bundle(true);
    }
    if options.no_source_map {
        config = config.with_source_map(false);
    }
    if let Some(public_path) = &options.public_path {
        config = config.with_public_path(public_path);
    }
    if serve && !config.plugins().iter().any(|p| p.name() == "dev-server") {
        config = config.with_plugin(Arc::new(DevServerPlugin::new()));
    }

    Ok(config.with_silence(options.silence).with_watching(watch))
}

fn report(stats: &BuildStats, config: &BuildConfig) {
    for file in &stats.files {
        let name = file
            .destination
            .strip_prefix(config.root_dir())
            .unwrap_or(&file.destination);
        info!(target: "tessera", "{:<60} {:>10}", to_slash(name), format_size(file.size));
    }
    info!(
        target: "tessera",
        "{} file(s), {} written in {:.2?}",
        stats.files.len(),
        format_size(stats.total_size()),
        stats.elapsed
    );
}

fn format_size(size: usize) -> String {
    match size {
        0..1024 => format!("{size} B"),
        1024..1_048_576 => format!("{:.2} KiB", size as f64 / 1024.0),
        _ => format!("{:.2} MiB", size as f64 / 1_048_576.0),
    }
}
