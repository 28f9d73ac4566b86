//! Crate `karaoke_paths`: rutas de la app, estructura de la carpeta de salida y locks

mod errors;
pub mod fs_utils;
mod layout;
mod paths;

pub use errors::Error;
pub use layout::{
    CHUNK_DIR, DATA_DIR, INDEX_ARCHIVE_FILE, MASTER_INDEX_FILE, OutputLayout, OutputLock,
    batch_archive_name, chunk_file_name, group_archive_name,
};
pub use paths::{AppPaths, ENV_BASE_DIR};
