mod catalog;
mod directory;

use std::{fmt, sync::Arc};

use karaoke_core::{Song, SongFiles, SongMetadata};

pub use catalog::CatalogSource;
pub use directory::DirectorySource;

/// Candidato tal como lo produce una fuente, antes de asignarle índice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Complete {
        files: SongFiles,
        metadata: SongMetadata,
    },
    Incomplete {
        /// Código o ruta que identifica al candidato en los logs.
        label: String,
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Faltan CODE, TYPE o SUB_TYPE en el catálogo.
    MissingFields,
    UnsupportedSubType(String),
    /// Extensiones que faltan (`mid`, `lyr`, `cur`, `emk`).
    MissingFiles(Vec<&'static str>),
    /// `.emk` con el mismo nombre base que un NCN completo; se empaqueta el NCN.
    ShadowedByNcn,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingFields => f.write_str("catalog record lacks CODE, TYPE or SUB_TYPE"),
            SkipReason::UnsupportedSubType(s) => write!(f, "unsupported sub type {s:?}"),
            SkipReason::MissingFiles(exts) => write!(f, "missing files: {}", exts.join(", ")),
            SkipReason::ShadowedByNcn => f.write_str("an NCN song with the same name takes precedence"),
        }
    }
}

/// Fuente de candidatos con un orden de enumeración estable.
///
/// Cada llamada a `candidates` empieza de cero, así que la secuencia se puede
/// recorrer varias veces y siempre produce el mismo orden.
pub trait SongSource: Send + Sync {
    fn candidates(&self) -> Box<dyn Iterator<Item = Candidate> + Send + '_>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSong {
    pub label: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Song(Song),
    Skipped(SkippedSong),
}

/// Convierte candidatos en canciones numeradas. Solo las canciones válidas
/// consumen `original_index`.
#[derive(Clone)]
pub struct Classifier {
    source: Arc<dyn SongSource>,
}

impl Classifier {
    pub fn new(source: Arc<dyn SongSource>) -> Self {
        Self { source }
    }

    pub fn discover(&self) -> impl Iterator<Item = Discovery> + Send + '_ {
        let mut next_index = 0;
        self.source.candidates().map(move |candidate| match candidate {
            Candidate::Complete { files, metadata } => {
                let song = Song {
                    original_index: next_index,
                    files,
                    metadata,
                };
                next_index += 1;
                Discovery::Song(song)
            }
            Candidate::Incomplete { label, reason } => {
                Discovery::Skipped(SkippedSong { label, reason })
            }
        })
    }

    /// Solo las canciones válidas, en orden.
    pub fn songs(&self) -> impl Iterator<Item = Song> + Send + '_ {
        self.discover().filter_map(|d| match d {
            Discovery::Song(song) => Some(song),
            Discovery::Skipped(_) => None,
        })
    }
}
