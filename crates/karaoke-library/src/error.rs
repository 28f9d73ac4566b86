use std::path::PathBuf;

use thiserror::Error;

/// Configuración inválida: se detecta antes de empezar a trabajar.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration parse error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("batch_size must be at least 1")]
    BatchSize,

    #[error("zip_size_limit must be at least 1 byte")]
    ZipSizeLimit,

    #[error("chunk_size must be at least 1")]
    ChunkSize,

    #[error("workers must be between 1 and {}", crate::config::MAX_WORKERS)]
    Workers,

    #[error("Input folder does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("Catalog source requested but {0} does not exist")]
    MissingCatalog(PathBuf),
}

/// Fallo al construir un `{batch}.zip`. Solo afecta a ese lote.
#[derive(Error, Debug)]
pub enum PackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Paths(#[from] karaoke_paths::Error),
}

/// Errores que abortan la ejecución completa.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Paths(#[from] karaoke_paths::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] karaoke_catalog::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errores de lectura de una carpeta ya procesada.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Query must have at least 2 characters")]
    QueryTooShort,

    #[error("Song {0} is not in the index")]
    UnknownSong(usize),

    #[error("Batch {0} failed during packing; its songs were not archived")]
    FailedBatch(usize),
}
