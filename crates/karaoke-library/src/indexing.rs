use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use karaoke_core::{
    BatchCompletion, BatchLocation, ChunkSummary, EventSink, GroupSummary, INDEX_FORMAT_VERSION,
    INDEX_VERSION_TAG, IndexEntry, MasterIndex, PipelineEvent,
};
use karaoke_paths::{
    CHUNK_DIR, DATA_DIR, MASTER_INDEX_FILE, OutputLayout, batch_archive_name, chunk_file_name,
    fs_utils::{commit_part, part_path},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::PipelineError,
    packing::{member_options, write_zip},
    reorder::ReorderBuffer,
};

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z\d\x{0E00}-\x{0E7F}]+").expect("word pattern is valid"));

/// Palabras buscables de una canción: tokens de `título artista` en minúsculas,
/// de más de un carácter.
pub fn extract_words(title: &str, artist: &str) -> BTreeSet<String> {
    let text = format!("{title} {artist}").to_lowercase();
    WORD_RE
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Clone)]
struct BatchRecord {
    batch: usize,
    first_index: usize,
    records: usize,
    has_archive: bool,
    failed: bool,
}

/// Construye los chunks de preview a medida que llegan los lotes y, al final,
/// el índice maestro.
///
/// Los lotes son rangos contiguos de `original_index`, así que reordenar por
/// lote basta para recorrer las canciones en orden. Un chunk se escribe una
/// sola vez, cuando el cursor ya pasó su rango completo.
pub struct IndexBuilder {
    layout: OutputLayout,
    chunk_size: usize,
    batch_size: usize,
    buffer: ReorderBuffer<Arc<BatchCompletion>>,
    covered: usize,
    current_chunk: usize,
    current: Vec<IndexEntry>,
    chunks: Vec<ChunkSummary>,
    batches: Vec<BatchRecord>,
    words: BTreeMap<String, BTreeSet<usize>>,
    total: usize,
}

impl IndexBuilder {
    pub fn new(layout: OutputLayout, chunk_size: usize, batch_size: usize) -> Self {
        Self {
            layout,
            chunk_size: chunk_size.max(1),
            batch_size: batch_size.max(1),
            buffer: ReorderBuffer::new(),
            covered: 0,
            current_chunk: 0,
            current: Vec::new(),
            chunks: Vec::new(),
            batches: Vec::new(),
            words: BTreeMap::new(),
            total: 0,
        }
    }

    pub fn total_records(&self) -> usize {
        self.total
    }

    /// Chunks ya escritos.
    pub fn chunks(&self) -> &[ChunkSummary] {
        &self.chunks
    }

    /// Recibe un resultado en cualquier orden. Devuelve los chunks que se escribieron.
    pub fn accept(&mut self, completion: Arc<BatchCompletion>) -> Result<Vec<ChunkSummary>, PipelineError> {
        let index = completion.batch_index;
        if !self.buffer.insert(index, completion) {
            warn!(batch = index, "duplicate batch completion ignored");
            return Ok(Vec::new());
        }

        let mut written = Vec::new();
        while let Some(ready) = self.buffer.pop_ready() {
            self.absorb(&ready, &mut written)?;
        }
        Ok(written)
    }

    fn absorb(&mut self, c: &BatchCompletion, written: &mut Vec<ChunkSummary>) -> Result<(), PipelineError> {
        self.batches.push(BatchRecord {
            batch: c.batch_index,
            first_index: c.first_index,
            records: c.entries().len(),
            has_archive: c.archive().is_some(),
            failed: c.is_failed(),
        });

        self.covered = self.covered.max(c.end_index());
        for entry in c.entries() {
            let chunk = entry.original_index / self.chunk_size;
            while chunk > self.current_chunk {
                written.push(self.flush_chunk()?);
            }
            for word in extract_words(&entry.title, &entry.artist) {
                self.words.entry(word).or_default().insert(chunk);
            }
            self.current.push(entry.clone());
            self.total += 1;
        }

        while self.covered >= (self.current_chunk + 1) * self.chunk_size {
            written.push(self.flush_chunk()?);
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<ChunkSummary, PipelineError> {
        let chunk = self.current_chunk;
        let entries = std::mem::take(&mut self.current);
        write_json(&self.layout.chunk_file(chunk), &entries)?;

        let first_index = chunk * self.chunk_size;
        let end = ((chunk + 1) * self.chunk_size).min(self.covered.max(first_index + 1));
        let summary = ChunkSummary {
            chunk,
            first_index,
            last_index: end - 1,
            records: entries.len(),
        };
        debug!(chunk, records = summary.records, "preview chunk written");

        self.chunks.push(summary.clone());
        self.current_chunk += 1;
        Ok(summary)
    }

    /// Escribe el chunk parcial final y `master_index_v6.json`.
    ///
    /// `groups` son los grupos cerrados por el agrupador (vacío si no se agrupó).
    pub fn finish(mut self, groups: &[GroupSummary], build_time_ms: u64) -> Result<MasterIndex, PipelineError> {
        if !self.buffer.is_empty() {
            warn!(
                waiting_for = self.buffer.next_expected(),
                held = self.buffer.pending(),
                "index stream ended with batches still waiting for an earlier one"
            );
        }
        if !self.current.is_empty() || self.covered > self.current_chunk * self.chunk_size {
            self.flush_chunk()?;
        }

        let group_of: HashMap<usize, &GroupSummary> = groups
            .iter()
            .flat_map(|g| g.batches.iter().map(move |b| (*b, g)))
            .collect();

        let batches = self
            .batches
            .iter()
            .map(|b| {
                let group = group_of.get(&b.batch);
                BatchLocation {
                    batch: b.batch,
                    first_index: b.first_index,
                    records: b.records,
                    archive: match group {
                        Some(g) => Some(g.file.clone()),
                        None => b.has_archive.then(|| batch_archive_name(b.batch)),
                    },
                    group: group.map(|g| g.group),
                    failed: b.failed,
                }
            })
            .collect();

        let master = MasterIndex {
            version: INDEX_VERSION_TAG.to_string(),
            format_version: INDEX_FORMAT_VERSION,
            total_records: self.total,
            chunk_size: self.chunk_size,
            chunk_count: self.chunks.len(),
            batch_size: self.batch_size,
            chunks: self.chunks,
            batches,
            groups: groups.to_vec(),
            words: self.words.keys().cloned().collect(),
            word_to_chunks: self
                .words
                .into_iter()
                .map(|(w, chunks)| (w, chunks.into_iter().collect()))
                .collect(),
            build_time: build_time_ms,
            last_built: chrono::Utc::now().to_rfc3339(),
        };

        write_json(&self.layout.master_index(), &master)?;
        info!(
            records = master.total_records,
            chunks = master.chunk_count,
            words = master.words.len(),
            "master index written"
        );
        Ok(master)
    }

    /// Bucle del consumidor; pensado para correr en `spawn_blocking`.
    /// Devuelve el builder para que el orquestador decida si hay índice maestro.
    pub fn run_blocking(
        mut self,
        mut completions: mpsc::UnboundedReceiver<Arc<BatchCompletion>>,
        cancel: CancellationToken,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, PipelineError> {
        while let Some(completion) = completions.blocking_recv() {
            if cancel.is_cancelled() {
                info!(records = self.total, "indexing cancelled");
                break;
            }
            for chunk in self.accept(completion)? {
                sink.emit(PipelineEvent::ChunkWritten {
                    chunk_index: chunk.chunk,
                    records: chunk.records,
                });
            }
        }
        Ok(self)
    }
}

fn write_json<T: Serialize + ?Sized>(dest: &Path, value: &T) -> Result<(), PipelineError> {
    let part = part_path(dest);
    let mut out = BufWriter::new(File::create(&part)?);
    serde_json::to_writer(&mut out, value)?;
    out.flush()?;
    drop(out);
    commit_part(&part, dest)?;
    Ok(())
}

/// Empaqueta el índice maestro y los chunks en `<output>/index.zip`.
pub fn create_index_archive(layout: &OutputLayout, chunk_count: usize) -> Result<PathBuf, PipelineError> {
    let dest = layout.index_archive();
    let mut files = vec![(format!("{DATA_DIR}/{MASTER_INDEX_FILE}"), layout.master_index())];
    files.extend((0..chunk_count).map(|k| {
        (
            format!("{DATA_DIR}/{CHUNK_DIR}/{}", chunk_file_name(k)),
            layout.chunk_file(k),
        )
    }));

    write_zip::<PipelineError, _>(&dest, |zip| {
        for (name, path) in &files {
            zip.start_file(name.as_str(), member_options())?;
            io::copy(&mut File::open(path)?, zip)?;
        }
        Ok(true)
    })?;

    info!(path = %dest.display(), files = files.len(), "index archive written");
    Ok(dest)
}

/// Lee un chunk de preview.
pub fn read_chunk(layout: &OutputLayout, chunk: usize) -> Result<Vec<IndexEntry>, io::Error> {
    let bytes = fs::read(layout.chunk_file(chunk))?;
    serde_json::from_slice(&bytes).map_err(io::Error::other)
}
