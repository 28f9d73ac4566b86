use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const INDEX_VERSION_TAG: &str = "v6";
pub const INDEX_FORMAT_VERSION: u32 = 6;

/// Registro de preview de una canción: `{"t", "a", "i", "s"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "t")]
    pub title: String,
    #[serde(rename = "a")]
    pub artist: String,
    #[serde(rename = "i")]
    pub original_index: usize,
    /// Lote que contiene la canción.
    #[serde(rename = "s")]
    pub batch_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSummary {
    pub chunk: usize,
    pub first_index: usize,
    pub last_index: usize,
    pub records: usize,
}

/// Dónde vive un lote: su archivo suelto o el grupo que lo contiene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLocation {
    pub batch: usize,
    pub first_index: usize,
    pub records: usize,
    /// Fichero que hay que abrir: `karaoke_{g}.zip` o `{b}.zip`. `None` si el
    /// lote no dejó archivo (vacío o fallido).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<usize>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group: usize,
    pub file: String,
    pub batches: Vec<usize>,
    /// Suma de los tamaños de los `{b}.zip` miembros.
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterIndex {
    pub version: String,
    pub format_version: u32,
    pub total_records: usize,
    pub chunk_size: usize,
    pub chunk_count: usize,
    pub batch_size: usize,
    pub chunks: Vec<ChunkSummary>,
    pub batches: Vec<BatchLocation>,
    pub groups: Vec<GroupSummary>,
    pub words: Vec<String>,
    #[serde(rename = "wordToChunkMap")]
    pub word_to_chunks: BTreeMap<String, Vec<usize>>,
    /// Milisegundos que tardó la ejecución completa.
    pub build_time: u64,
    pub last_built: String,
}

impl MasterIndex {
    pub fn chunk_of(&self, original_index: usize) -> usize {
        original_index / self.chunk_size
    }

    pub fn batch_location(&self, original_index: usize) -> Option<&BatchLocation> {
        let batch = original_index / self.batch_size;
        self.batches.iter().find(|b| b.batch == batch)
    }
}
