use std::{fs, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use karaoke_library::{PackerConfig, Pipeline, RunOutcome, RunSummary};
use karaoke_paths::AppPaths;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use crate::{PackArgs, progress::ProgressSink};

/// Último resultado, guardado en `last_run.json` de la app.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LastRun<'a> {
    status: &'static str,
    finished_at: String,
    summary: &'a RunSummary,
}

pub async fn run(args: PackArgs) -> Result<ExitCode> {
    let app_paths = match AppPaths::new() {
        Ok(paths) => Some(paths),
        Err(e) => {
            warn!(error = %e, "app directories unavailable, settings and last run ignored");
            None
        }
    };

    let config = load_config(&args, app_paths.as_ref())?;
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir().display(),
        limit = %config.zip_size_limit,
        "configuration loaded"
    );

    let progress = Arc::new(ProgressSink::new(config.batch_size, args.quiet));
    let pipeline = Pipeline::new(config).with_sink(progress.clone());

    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight batches");
            token.cancel();
        }
    });

    let outcome = pipeline.run().await.context("pack run failed")?;
    let (status, code) = match &outcome {
        RunOutcome::Completed(_) => {
            progress.finish("done");
            ("completed", ExitCode::SUCCESS)
        }
        RunOutcome::Cancelled(_) => ("cancelled", ExitCode::from(130)),
    };

    let summary = outcome.summary();
    println!("{}", serde_json::to_string_pretty(summary)?);

    if let Some(paths) = &app_paths {
        let record = LastRun {
            status,
            finished_at: Utc::now().to_rfc3339(),
            summary,
        };
        if let Err(e) = fs::write(&paths.last_run_file, serde_json::to_vec_pretty(&record)?) {
            warn!(error = %e, path = %paths.last_run_file.display(), "could not save last run");
        }
    }

    Ok(code)
}

/// Capas: `settings.toml` (o `--config`), variables `KARAOKE_*` y luego flags.
fn load_config(args: &PackArgs, app_paths: Option<&AppPaths>) -> Result<PackerConfig> {
    let file: Option<PathBuf> = args
        .config
        .clone()
        .or_else(|| app_paths.map(|p| p.settings_file.clone()));

    let mut config = match &file {
        Some(path) => PackerConfig::from_file(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?,
        None => PackerConfig::default(),
    };

    if let Some(input) = &args.input {
        config.input_dir = input.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = Some(output.clone());
    }
    if let Some(source) = args.source {
        config.source = source.into();
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(limit) = args.zip_size_limit {
        config.zip_size_limit = limit;
    }
    if args.no_group {
        config.create_zip_files = false;
    }
    if let Some(grouping) = args.grouping {
        config.grouping_policy = grouping.into();
    }
    if args.keep_batches {
        config.keep_batch_archives = true;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if args.no_index_zip {
        config.create_index_zip = false;
    }

    config.validate()?;
    Ok(config)
}
