use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use karaoke_core::{Batch, BatchCompletion, BatchOutcome, EventSink, PipelineEvent};
use tokio::{
    sync::{Semaphore, mpsc},
    task::spawn_blocking,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::packing::BatchAssembler;

/// Entrega cada resultado a todos los consumidores (agrupador e indexador).
///
/// Las colas no tienen límite para que un consumidor lento no frene al otro.
#[derive(Debug, Clone, Default)]
pub struct CompletionFanout {
    targets: Vec<mpsc::UnboundedSender<Arc<BatchCompletion>>>,
}

impl CompletionFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade un consumidor y devuelve su extremo de lectura.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Arc<BatchCompletion>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.targets.push(tx);
        rx
    }

    pub fn publish(&self, completion: BatchCompletion) {
        let completion = Arc::new(completion);
        for tx in &self.targets {
            // un consumidor que ya terminó (p. ej. por cancelación) no es un error
            let _ = tx.send(completion.clone());
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub dispatched: usize,
    pub packed: usize,
    pub empty: usize,
    pub failed: usize,
    pub dropped_songs: usize,
}

#[derive(Debug, Clone, Copy)]
enum JobStatus {
    Packed { dropped: usize },
    Empty { dropped: usize },
    Failed,
}

/// Ejecuta trabajos de empaquetado en paralelo con `workers` permisos.
///
/// Tras la cancelación no arranca ningún trabajo nuevo; los que están en
/// marcha terminan y su resultado se publica igualmente.
pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
    sink: Arc<dyn EventSink>,
}

impl WorkerPool {
    pub fn new(workers: usize, cancel: CancellationToken, sink: Arc<dyn EventSink>) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
            sink,
        }
    }

    pub async fn run(
        &self,
        mut batches: mpsc::Receiver<Batch>,
        assembler: Arc<BatchAssembler>,
        fanout: CompletionFanout,
    ) -> PoolReport {
        let sem = Arc::new(Semaphore::new(self.workers));
        let mut in_flight = FuturesUnordered::new();
        let mut report = PoolReport::default();

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            let batch = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = batches.recv() => match next {
                    Some(batch) => batch,
                    None => break,
                },
            };

            report.dispatched += 1;
            debug!(batch = batch.index, songs = batch.len(), "dispatching batch");

            let assembler = assembler.clone();
            let fanout = fanout.clone();
            let sink = self.sink.clone();
            in_flight.push(tokio::spawn(async move {
                let _permit = permit;
                let completion = run_job(assembler, batch).await;
                let status = announce(&completion, sink.as_ref());
                fanout.publish(completion);
                status
            }));
        }

        if self.cancel.is_cancelled() {
            info!(dispatched = report.dispatched, "cancellation requested, waiting for in-flight batches");
        }
        // el despachador ve el canal cerrado y deja de producir
        batches.close();
        drop(fanout);

        while let Some(res) = in_flight.next().await {
            match res {
                Ok(JobStatus::Packed { dropped }) => {
                    report.packed += 1;
                    report.dropped_songs += dropped;
                }
                Ok(JobStatus::Empty { dropped }) => {
                    report.empty += 1;
                    report.dropped_songs += dropped;
                }
                Ok(JobStatus::Failed) => report.failed += 1,
                Err(join_e) => error!(error = %join_e, "worker task aborted"),
            }
        }

        report
    }
}

async fn run_job(assembler: Arc<BatchAssembler>, batch: Batch) -> BatchCompletion {
    let (batch_index, first_index, song_count) = (batch.index, batch.first_index, batch.len());

    let res = spawn_blocking(move || {
        assembler
            .pack(&batch)
            .unwrap_or_else(|e| BatchCompletion::failed(&batch, e.to_string()))
    })
    .await;

    match res {
        Ok(completion) => completion,
        Err(join_e) => {
            error!(batch = batch_index, error = %join_e, "panic while packing batch");
            BatchCompletion {
                batch_index,
                first_index,
                song_count,
                outcome: BatchOutcome::Failed {
                    reason: join_e.to_string(),
                },
            }
        }
    }
}

fn announce(completion: &BatchCompletion, sink: &dyn EventSink) -> JobStatus {
    for d in completion.dropped() {
        sink.emit(PipelineEvent::SongDropped {
            original_index: d.original_index,
            batch_index: completion.batch_index,
            reason: d.reason.clone(),
        });
    }

    match &completion.outcome {
        BatchOutcome::Packed {
            archive,
            entries,
            dropped,
        } => {
            debug!(batch = completion.batch_index, songs = entries.len(), "batch packed");
            sink.emit(PipelineEvent::BatchCompleted {
                batch_index: completion.batch_index,
                songs: entries.len(),
                size_bytes: archive.size_bytes,
            });
            JobStatus::Packed {
                dropped: dropped.len(),
            }
        }
        BatchOutcome::Empty { dropped } => {
            warn!(batch = completion.batch_index, "every song of the batch was dropped");
            sink.emit(PipelineEvent::BatchCompleted {
                batch_index: completion.batch_index,
                songs: 0,
                size_bytes: 0,
            });
            JobStatus::Empty {
                dropped: dropped.len(),
            }
        }
        BatchOutcome::Failed { reason } => {
            warn!(batch = completion.batch_index, %reason, "batch failed, its songs are left out");
            sink.emit(PipelineEvent::BatchFailed {
                batch_index: completion.batch_index,
                reason: reason.clone(),
            });
            JobStatus::Failed
        }
    }
}
