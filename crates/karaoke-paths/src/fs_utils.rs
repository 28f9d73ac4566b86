use fs2::FileExt;
use std::{
    ffi::OsString,
    fs,
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
};

use tracing::{Level, instrument};

use crate::errors::Error;

/// Asegura que la carpeta `path` existe (creándola recursivamente si hace falta).
#[instrument(level = Level::TRACE, err)]
pub fn ensure_dir(path: &Path) -> Result<(), Error> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Asegura que el fichero `path` existe (creando su carpeta padre si hace falta).
#[instrument(level = Level::TRACE, err)]
pub fn ensure_file(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    if !path.exists() {
        fs::File::create(path)?;
    }

    Ok(())
}

/// Intenta adquirir un lock exclusivo sobre el fichero `path` sin bloquear.
/// Devuelve el `File` bloqueado; mientras conserves el handle, el lock se mantiene.
#[instrument(level = Level::TRACE, err)]
pub fn lock_file(path: &Path) -> Result<fs::File, Error> {
    ensure_file(path)?;
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    file.try_lock_exclusive().map_err(|e| lock_error(path, e))?;
    Ok(file)
}

/// Solo la contención es `Locked`; cualquier otro fallo (ENOLCK, FS sin locks...) es I/O.
pub(crate) fn lock_error(path: &Path, e: io::Error) -> Error {
    let contended = fs2::lock_contended_error();
    if e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == contended.raw_os_error() {
        Error::Locked(path.to_path_buf())
    } else {
        Error::Io(e)
    }
}

/// Verifica que `path` es escribible (tiene permisos adecuados).
#[instrument(level = Level::TRACE, err)]
pub fn check_writable(path: &Path) -> Result<(), Error> {
    let meta = fs::metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = meta.permissions().mode();
        if mode & 0o200 == 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("No write permission for {}", path.display()),
            )
            .into());
        }
    }
    #[cfg(not(unix))]
    {
        if meta.permissions().readonly() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("No write permission for {}", path.display()),
            )
            .into());
        }
    }
    Ok(())
}

/// Ruta hermana `<path>.part` donde se escribe antes de publicar el fichero final.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Publica `part` como `dest` con un rename; si `dest` existía se reemplaza.
#[instrument(level = Level::TRACE, err)]
pub fn commit_part(part: &Path, dest: &Path) -> Result<(), Error> {
    fs::rename(part, dest)?;
    Ok(())
}
