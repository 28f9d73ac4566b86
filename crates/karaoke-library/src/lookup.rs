use std::{
    collections::{BTreeSet, HashMap},
    fs::{self, File},
    io::{Cursor, Read, Seek},
    path::PathBuf,
};

use karaoke_core::{IndexEntry, MasterIndex, SongKind, song::member_name};
use karaoke_paths::{OutputLayout, batch_archive_name};
use tracing::debug;
use zip::{ZipArchive, result::ZipError};

use crate::{
    error::LookupError,
    indexing::{extract_words, read_chunk},
    packing::{NcnPayload, read_member, unpack_ncn},
};

pub const DEFAULT_MAX_RESULTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub entry: IndexEntry,
    /// Menor es mejor: 1 título exacto, 2 prefijo del título, 3 todo en el
    /// título, 4 todo en el artista, 5 repartido entre ambos.
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongPayload {
    Ncn(NcnPayload),
    Emk(Vec<u8>),
}

impl SongPayload {
    pub fn kind(&self) -> SongKind {
        match self {
            SongPayload::Ncn(_) => SongKind::Ncn,
            SongPayload::Emk(_) => SongKind::Emk,
        }
    }
}

/// Lector de una carpeta ya procesada. Los chunks se cargan bajo demanda.
pub struct IndexReader {
    layout: OutputLayout,
    master: MasterIndex,
    chunks: HashMap<usize, Vec<IndexEntry>>,
}

impl IndexReader {
    pub fn open(output: impl Into<PathBuf>) -> Result<Self, LookupError> {
        let layout = OutputLayout::new(output);
        let master: MasterIndex = serde_json::from_slice(&fs::read(layout.master_index())?)?;
        debug!(records = master.total_records, chunks = master.chunk_count, "master index loaded");
        Ok(Self {
            layout,
            master,
            chunks: HashMap::new(),
        })
    }

    pub fn master(&self) -> &MasterIndex {
        &self.master
    }

    fn chunk(&mut self, k: usize) -> Result<&[IndexEntry], LookupError> {
        if !self.chunks.contains_key(&k) {
            let entries = read_chunk(&self.layout, k)?;
            self.chunks.insert(k, entries);
        }
        Ok(self.chunks.get(&k).map(Vec::as_slice).unwrap_or_default())
    }

    /// Registro de preview de una canción, leído del chunk que cubre su índice.
    pub fn entry(&mut self, original_index: usize) -> Result<IndexEntry, LookupError> {
        if original_index >= self.master.chunk_count * self.master.chunk_size {
            return Err(LookupError::UnknownSong(original_index));
        }
        let k = self.master.chunk_of(original_index);
        self.chunk(k)?
            .iter()
            .find(|e| e.original_index == original_index)
            .cloned()
            .ok_or(LookupError::UnknownSong(original_index))
    }

    /// Búsqueda por prefijo de la primera palabra; todas las palabras de la
    /// consulta tienen que aparecer en `título artista`.
    pub fn search(&mut self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, LookupError> {
        let query = query.trim().to_lowercase();
        if query.chars().count() < 2 {
            return Err(LookupError::QueryTooShort);
        }
        let terms: Vec<&str> = query.split(' ').filter(|t| !t.is_empty()).collect();
        let Some(prefix) = terms.first().copied() else {
            return Err(LookupError::QueryTooShort);
        };

        let matching: Vec<&String> = self
            .master
            .words
            .iter()
            .filter(|w| w.starts_with(prefix))
            .collect();
        let needed: BTreeSet<usize> = matching
            .iter()
            .filter_map(|w| self.master.word_to_chunks.get(w.as_str()))
            .flatten()
            .copied()
            .collect();

        let mut best: HashMap<usize, SearchHit> = HashMap::new();
        for k in needed {
            for entry in self.chunk(k)? {
                let full = format!("{} {}", entry.title, entry.artist).to_lowercase();
                if !terms.iter().all(|t| full.contains(t)) {
                    continue;
                }
                if !extract_words(&entry.title, &entry.artist)
                    .iter()
                    .any(|w| w.starts_with(prefix))
                {
                    continue;
                }
                let score = score(entry, &query, &terms);
                let better = best
                    .get(&entry.original_index)
                    .is_none_or(|hit| score < hit.score);
                if better {
                    best.insert(
                        entry.original_index,
                        SearchHit {
                            entry: entry.clone(),
                            score,
                        },
                    );
                }
            }
        }

        let mut hits: Vec<SearchHit> = best.into_values().collect();
        hits.sort_by_key(|h| (h.score, h.entry.original_index));
        hits.truncate(max_results);
        Ok(hits)
    }

    /// Saca una canción de su lote (o del grupo que contiene al lote).
    pub fn fetch_song(&self, original_index: usize) -> Result<SongPayload, LookupError> {
        let location = self
            .master
            .batch_location(original_index)
            .ok_or(LookupError::UnknownSong(original_index))?;
        if location.failed {
            return Err(LookupError::FailedBatch(location.batch));
        }

        // lote sin archivo: todas sus canciones se descartaron al empaquetar
        let Some(archive) = &location.archive else {
            return Err(LookupError::UnknownSong(original_index));
        };
        let archive_path = self.layout.root().join(archive);
        let mut outer = ZipArchive::new(File::open(&archive_path)?)?;
        match location.group {
            Some(_) => {
                let batch_bytes = read_member(&mut outer, &batch_archive_name(location.batch))?;
                let mut inner = ZipArchive::new(Cursor::new(batch_bytes))?;
                extract(&mut inner, original_index)
            }
            None => extract(&mut outer, original_index),
        }
    }
}

fn extract<R: Read + Seek>(archive: &mut ZipArchive<R>, original_index: usize) -> Result<SongPayload, LookupError> {
    match read_member(archive, &member_name(original_index, SongKind::Ncn)) {
        Ok(bundle) => return Ok(SongPayload::Ncn(unpack_ncn(&bundle)?)),
        Err(ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }
    match read_member(archive, &member_name(original_index, SongKind::Emk)) {
        Ok(bytes) => Ok(SongPayload::Emk(bytes)),
        Err(ZipError::FileNotFound) => Err(LookupError::UnknownSong(original_index)),
        Err(e) => Err(e.into()),
    }
}

fn score(entry: &IndexEntry, query: &str, terms: &[&str]) -> u8 {
    let title = entry.title.to_lowercase();
    let artist = entry.artist.to_lowercase();

    if title == query {
        1
    } else if title.starts_with(query) {
        2
    } else if terms.iter().all(|t| title.contains(t)) {
        3
    } else if terms.iter().all(|t| artist.contains(t)) {
        4
    } else {
        5
    }
}
