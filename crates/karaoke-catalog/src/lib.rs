//! Lector del catálogo de canciones (`Data/SONG.DBF`) de las colecciones karaoke antiguas.

mod dbf;
mod error;
mod text;

pub use dbf::{CatalogRecord, DbfField, DbfTable, Records};
pub use error::Error;
pub use text::decode_field;

use karaoke_core::SongMetadata;

/// Ruta relativa del catálogo dentro de la carpeta de entrada.
pub const CATALOG_RELATIVE_PATH: &str = "Data/SONG.DBF";

impl CatalogRecord {
    /// Metadatos de búsqueda del registro. `TYPE` vale `MIDI` si la columna no existe.
    pub fn metadata(&self) -> SongMetadata {
        let field = |name: &str| self.get(name).unwrap_or_default().to_string();
        SongMetadata {
            title: field("TITLE"),
            artist: field("ARTIST"),
            author: field("AUTHOR"),
            lyric_title: field("LYR_TITLE"),
            code: field("CODE"),
            track_type: self.get("TYPE").unwrap_or("MIDI").to_string(),
            sub_type: field("SUB_TYPE"),
        }
    }
}
