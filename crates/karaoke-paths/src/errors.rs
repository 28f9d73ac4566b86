use std::{io, path::PathBuf};

/// Errores genéricos del crate
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No se pudo determinar el directorio base (HOME, XDG, etc)
    #[error(
        "Could not determine the project directory, the call to ProjectDirs failed, \
         the system probably does not provide a valid $HOME path."
    )]
    NoHome,

    /// Otra ejecución ya tiene el lock de la carpeta de salida
    #[error("Output folder is locked by another run: {0}")]
    Locked(PathBuf),

    /// Error de IO al crear dirs, ficheros, locks...
    #[error(transparent)]
    Io(#[from] io::Error),
}
