use std::{path::PathBuf, sync::Arc, time::Instant};

use karaoke_core::{Batch, EventSink, GroupSummary, NoopSink, PipelineEvent};
use karaoke_paths::OutputLayout;
use serde::Serialize;
use tokio::{sync::mpsc, task::spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, instrument, warn};

use crate::{
    config::{PackerConfig, SourceKind},
    error::PipelineError,
    grouping::{ArchiveGrouper, GroupReport},
    indexing::{IndexBuilder, create_index_archive},
    packing::{BatchAssembler, partition},
    scanning::{CatalogSource, Classifier, Discovery, DirectorySource, SongSource},
    workers::{CompletionFanout, WorkerPool},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub songs_discovered: usize,
    pub songs_skipped: usize,
    /// Canciones que acabaron en un archivo y en el índice.
    pub songs_packed: usize,
    pub songs_dropped: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub groups: Vec<GroupSummary>,
    pub chunk_count: usize,
    pub index_archive: Option<PathBuf>,
    pub elapsed_ms: u64,
}

/// Estado terminal de una ejecución. La cancelación no es un error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Lo ya escrito queda en disco; no hay índice maestro.
    Cancelled(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Completed(s) | RunOutcome::Cancelled(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DiscoveryReport {
    songs: usize,
    skipped: usize,
}

/// Abre la fuente de canciones que corresponde a la configuración.
pub fn open_source(config: &PackerConfig) -> Result<Arc<dyn SongSource>, PipelineError> {
    let source: Arc<dyn SongSource> = match config.resolved_source() {
        SourceKind::Catalog => Arc::new(CatalogSource::open(&config.input_dir)?),
        _ => Arc::new(DirectorySource::new(&config.input_dir).exclude(config.output_dir())),
    };
    Ok(source)
}

pub struct Pipeline {
    config: PackerConfig,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: PackerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(NoopSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token para cancelar la ejecución desde fuera.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[instrument(level = Level::INFO, skip(self), fields(input = %self.config.input_dir.display()))]
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        let config = &self.config;
        config.validate()?;

        let output = config.output_dir();
        let layout = OutputLayout::new(&output);
        layout.ensure()?;
        let _lock = layout.lock()?;

        let source = open_source(config)?;
        info!(
            output = %output.display(),
            source = ?config.resolved_source(),
            batch_size = config.batch_size,
            workers = config.workers,
            "starting run"
        );
        self.sink.emit(PipelineEvent::RunStarted {
            input: config.input_dir.clone(),
            output: output.clone(),
        });

        // token interno: un fallo fatal de un consumidor para todo sin marcar la
        // ejecución como cancelada por el usuario
        let run_token = self.cancel.child_token();

        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(config.workers.saturating_mul(2));
        let mut fanout = CompletionFanout::new();
        let group_rx = config.create_zip_files.then(|| fanout.subscribe());
        let index_rx = fanout.subscribe();

        let dispatcher = {
            let classifier = Classifier::new(source);
            let batch_size = config.batch_size;
            let token = run_token.clone();
            let sink = self.sink.clone();
            spawn_blocking(move || dispatch(classifier, batch_size, batch_tx, token, sink))
        };

        let grouper_task = group_rx.map(|rx| {
            let grouper = ArchiveGrouper::new(
                layout.clone(),
                config.zip_size_limit.as_u64(),
                config.grouping_policy,
            )
            .keep_batch_archives(config.keep_batch_archives);
            let token = run_token.clone();
            let sink = self.sink.clone();
            spawn_blocking(move || {
                let res = grouper.run_blocking(rx, token.clone(), sink);
                if res.is_err() {
                    token.cancel();
                }
                res
            })
        });

        let index_task = {
            let builder = IndexBuilder::new(layout.clone(), config.chunk_size, config.batch_size);
            let token = run_token.clone();
            let sink = self.sink.clone();
            spawn_blocking(move || {
                let res = builder.run_blocking(index_rx, token.clone(), sink);
                if res.is_err() {
                    token.cancel();
                }
                res
            })
        };

        let pool = WorkerPool::new(config.workers, run_token.clone(), self.sink.clone());
        let assembler = Arc::new(BatchAssembler::new(layout.clone()));
        let pool_report = pool.run(batch_rx, assembler, fanout).await;
        debug!(?pool_report, "worker pool drained");

        let discovery = dispatcher.await?;
        let groups = match grouper_task {
            Some(task) => task.await??,
            None => GroupReport::default(),
        };
        let builder = index_task.await??;

        let mut summary = RunSummary {
            input_dir: config.input_dir.clone(),
            output_dir: output.clone(),
            songs_discovered: discovery.songs,
            songs_skipped: discovery.skipped,
            songs_packed: builder.total_records(),
            songs_dropped: pool_report.dropped_songs,
            batches: pool_report.dispatched,
            failed_batches: pool_report.failed,
            groups: groups.groups.clone(),
            chunk_count: builder.chunks().len(),
            index_archive: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if self.cancel.is_cancelled() {
            warn!(
                batches = summary.batches,
                groups = summary.groups.len(),
                "run cancelled, output left as is"
            );
            self.sink.emit(PipelineEvent::RunCancelled);
            return Ok(RunOutcome::Cancelled(summary));
        }

        let build_time_ms = started.elapsed().as_millis() as u64;
        let group_list = groups.groups;
        let master = spawn_blocking(move || builder.finish(&group_list, build_time_ms)).await??;
        self.sink.emit(PipelineEvent::IndexWritten {
            total_records: master.total_records,
            chunk_count: master.chunk_count,
        });

        if config.create_index_zip {
            let layout = layout.clone();
            let chunks = master.chunk_count;
            let path = spawn_blocking(move || create_index_archive(&layout, chunks)).await??;
            summary.index_archive = Some(path);
        }

        summary.songs_packed = master.total_records;
        summary.chunk_count = master.chunk_count;
        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            songs = summary.songs_packed,
            skipped = summary.songs_skipped,
            dropped = summary.songs_dropped,
            batches = summary.batches,
            failed = summary.failed_batches,
            groups = summary.groups.len(),
            elapsed_ms = summary.elapsed_ms,
            "run finished"
        );
        self.sink.emit(PipelineEvent::RunFinished {
            songs: summary.songs_packed,
            batches: summary.batches,
            groups: summary.groups.len(),
        });
        Ok(RunOutcome::Completed(summary))
    }
}

/// Clasifica y reparte lotes en orden. Corre en un hilo bloqueante.
fn dispatch(
    classifier: Classifier,
    batch_size: usize,
    tx: mpsc::Sender<Batch>,
    cancel: CancellationToken,
    sink: Arc<dyn EventSink>,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    let songs = classifier
        .discover()
        .take_while(|_| !cancel.is_cancelled())
        .filter_map(|d| match d {
            Discovery::Song(song) => {
                report.songs += 1;
                sink.emit(PipelineEvent::SongDiscovered {
                    original_index: song.original_index,
                    kind: song.kind(),
                    code: song.metadata.code.clone(),
                });
                Some(song)
            }
            Discovery::Skipped(skip) => {
                report.skipped += 1;
                warn!(song = %skip.label, reason = %skip.reason, "song skipped");
                sink.emit(PipelineEvent::SongSkipped {
                    label: skip.label,
                    reason: skip.reason.to_string(),
                });
                None
            }
        });

    for batch in partition(songs, batch_size) {
        if tx.blocking_send(batch).is_err() {
            debug!("batch queue closed, stopping discovery");
            break;
        }
    }

    info!(songs = report.songs, skipped = report.skipped, "discovery finished");
    sink.emit(PipelineEvent::DiscoveryFinished {
        songs: report.songs,
        skipped: report.skipped,
    });
    report
}
