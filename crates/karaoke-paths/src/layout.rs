use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{errors::Error, fs_utils};

pub const DATA_DIR: &str = "Data";
pub const MASTER_INDEX_FILE: &str = "master_index_v6.json";
pub const CHUNK_DIR: &str = "preview_chunk_v6";
pub const INDEX_ARCHIVE_FILE: &str = "index.zip";
const LOCK_FILE: &str = ".karaoke.lock";

/// Nombre del archivo de un lote: `{batch}.zip`.
pub fn batch_archive_name(batch: usize) -> String {
    format!("{batch}.zip")
}

/// Nombre del archivo de un grupo: `karaoke_{group}.zip`.
pub fn group_archive_name(group: usize) -> String {
    format!("karaoke_{group}.zip")
}

/// Nombre del fichero de un chunk de preview: `{chunk}.json`.
pub fn chunk_file_name(chunk: usize) -> String {
    format!("{chunk}.json")
}

/// Estructura de la carpeta de salida de una ejecución:
///
/// ```text
/// <root>/{batch}.zip
/// <root>/karaoke_{group}.zip
/// <root>/Data/master_index_v6.json
/// <root>/Data/preview_chunk_v6/{chunk}.json
/// <root>/index.zip
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn master_index(&self) -> PathBuf {
        self.data_dir().join(MASTER_INDEX_FILE)
    }

    pub fn chunk_dir(&self) -> PathBuf {
        self.data_dir().join(CHUNK_DIR)
    }

    pub fn chunk_file(&self, chunk: usize) -> PathBuf {
        self.chunk_dir().join(chunk_file_name(chunk))
    }

    pub fn batch_archive(&self, batch: usize) -> PathBuf {
        self.root.join(batch_archive_name(batch))
    }

    pub fn group_archive(&self, group: usize) -> PathBuf {
        self.root.join(group_archive_name(group))
    }

    pub fn index_archive(&self) -> PathBuf {
        self.root.join(INDEX_ARCHIVE_FILE)
    }

    /// Crea `root`, `Data/` y `Data/preview_chunk_v6/`, y comprueba que se puede escribir.
    pub fn ensure(&self) -> Result<(), Error> {
        for dir in [self.root.clone(), self.data_dir(), self.chunk_dir()] {
            fs_utils::ensure_dir(&dir)?;
            fs_utils::check_writable(&dir)?;
        }
        Ok(())
    }

    /// Lock exclusivo sobre la carpeta de salida mientras dure la ejecución.
    pub fn lock(&self) -> Result<OutputLock, Error> {
        let path = self.root.join(LOCK_FILE);
        let file = fs_utils::lock_file(&path)?;
        debug!(path = %path.display(), "output folder locked");
        Ok(OutputLock { _file: file, path })
    }
}

/// Mantiene el lock de la carpeta de salida; al soltarse borra el fichero de lock.
#[derive(Debug)]
pub struct OutputLock {
    _file: File,
    path: PathBuf,
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
