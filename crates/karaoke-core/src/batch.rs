use std::{ops::Range, path::PathBuf};

use crate::{index::IndexEntry, song::Song};

/// Corrida contigua de canciones; el último lote puede ser más corto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    /// `original_index` de la primera canción del lote.
    pub first_index: usize,
    pub songs: Vec<Song>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn index_range(&self) -> Range<usize> {
        self.first_index..self.first_index + self.songs.len()
    }
}

/// Archivo `{batch}.zip` ya escrito en disco.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchArchive {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Canción descartada al empaquetar (p. ej. el fichero desapareció tras clasificarla).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedSong {
    pub original_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Packed {
        archive: BatchArchive,
        entries: Vec<IndexEntry>,
        dropped: Vec<DroppedSong>,
    },
    /// Todas las canciones del lote se descartaron; no hay archivo.
    Empty { dropped: Vec<DroppedSong> },
    /// Error de IO/zip construyendo el lote; sus canciones quedan fuera.
    Failed { reason: String },
}

/// Resultado de un trabajo del pool, compartido por el agrupador y el indexador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCompletion {
    pub batch_index: usize,
    pub first_index: usize,
    pub song_count: usize,
    pub outcome: BatchOutcome,
}

impl BatchCompletion {
    pub fn failed(batch: &Batch, reason: impl Into<String>) -> Self {
        Self {
            batch_index: batch.index,
            first_index: batch.first_index,
            song_count: batch.len(),
            outcome: BatchOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn archive(&self) -> Option<&BatchArchive> {
        match &self.outcome {
            BatchOutcome::Packed { archive, .. } => Some(archive),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        match &self.outcome {
            BatchOutcome::Packed { entries, .. } => entries,
            _ => &[],
        }
    }

    pub fn dropped(&self) -> &[DroppedSong] {
        match &self.outcome {
            BatchOutcome::Packed { dropped, .. } | BatchOutcome::Empty { dropped } => dropped,
            BatchOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Failed { .. })
    }

    /// Fin (exclusivo) del rango de `original_index` que cubría el lote.
    pub fn end_index(&self) -> usize {
        self.first_index + self.song_count
    }
}
