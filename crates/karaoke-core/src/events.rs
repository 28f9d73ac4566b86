use std::path::PathBuf;

use crate::song::SongKind;

/// Eventos que emite el pipeline hacia quien lo invoca (CLI, GUI...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    RunStarted {
        input: PathBuf,
        output: PathBuf,
    },
    SongDiscovered {
        original_index: usize,
        kind: SongKind,
        code: String,
    },
    SongSkipped {
        label: String,
        reason: String,
    },
    SongDropped {
        original_index: usize,
        batch_index: usize,
        reason: String,
    },
    DiscoveryFinished {
        songs: usize,
        skipped: usize,
    },
    BatchCompleted {
        batch_index: usize,
        songs: usize,
        size_bytes: u64,
    },
    BatchFailed {
        batch_index: usize,
        reason: String,
    },
    GroupSealed {
        group_index: usize,
        batches: Vec<usize>,
        size_bytes: u64,
    },
    ChunkWritten {
        chunk_index: usize,
        records: usize,
    },
    IndexWritten {
        total_records: usize,
        chunk_count: usize,
    },
    RunFinished {
        songs: usize,
        batches: usize,
        groups: usize,
    },
    RunCancelled,
}

/// Puerto de salida para el progreso. El núcleo no guarda estado de UI.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

impl<F> EventSink for F
where
    F: Fn(PipelineEvent) + Send + Sync,
{
    fn emit(&self, event: PipelineEvent) {
        self(event)
    }
}

/// Sink que descarta todo.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: PipelineEvent) {}
}
