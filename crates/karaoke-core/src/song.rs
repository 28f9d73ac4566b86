use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Nombres canónicos de los ficheros NCN dentro de su bundle.
pub const NCN_MIDI_MEMBER: &str = "song.mid";
pub const NCN_LYRICS_MEMBER: &str = "song.lyr";
pub const NCN_CURSOR_MEMBER: &str = "song.cur";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongKind {
    /// MIDI + letra + cursor (`.mid`, `.lyr`, `.cur`).
    Ncn,
    /// Un único fichero `.emk`.
    Emk,
}

impl fmt::Display for SongKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SongKind::Ncn => f.write_str("NCN"),
            SongKind::Emk => f.write_str("EMK"),
        }
    }
}

/// Ficheros de origen de una canción. Solo se construye con el set completo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongFiles {
    Ncn {
        mid: PathBuf,
        lyr: PathBuf,
        cur: PathBuf,
    },
    Emk {
        emk: PathBuf,
    },
}

impl SongFiles {
    pub fn kind(&self) -> SongKind {
        match self {
            SongFiles::Ncn { .. } => SongKind::Ncn,
            SongFiles::Emk { .. } => SongKind::Emk,
        }
    }
}

/// Metadatos de búsqueda de una canción, tal como vienen del catálogo.
/// El pipeline no los interpreta, solo los copia al índice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SongMetadata {
    pub title: String,
    pub artist: String,
    pub author: String,
    /// Título tal como aparece en la letra.
    pub lyric_title: String,
    /// Código de catálogo; también es el nombre base de los ficheros.
    pub code: String,
    pub track_type: String,
    pub sub_type: String,
}

/// Una canción validada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    /// Posición entre las canciones válidas en orden de descubrimiento. Nunca se reasigna.
    pub original_index: usize,
    pub files: SongFiles,
    pub metadata: SongMetadata,
}

impl Song {
    pub fn kind(&self) -> SongKind {
        self.files.kind()
    }

    pub fn batch_index(&self, batch_size: usize) -> usize {
        self.original_index / batch_size
    }

    /// Nombre del miembro dentro del archivo del lote: `{i}.zip` para NCN, `{i}.emk` para EMK.
    pub fn archive_member_name(&self) -> String {
        member_name(self.original_index, self.kind())
    }
}

pub fn member_name(original_index: usize, kind: SongKind) -> String {
    match kind {
        SongKind::Ncn => format!("{original_index}.zip"),
        SongKind::Emk => format!("{original_index}.emk"),
    }
}
