use std::{
    fs::{self, File},
    io::{self, BufWriter, Cursor, Read, Write},
    path::Path,
};

use karaoke_core::song::{NCN_CURSOR_MEMBER, NCN_LYRICS_MEMBER, NCN_MIDI_MEMBER};
use karaoke_paths::fs_utils::{commit_part, part_path};
use zip::{
    CompressionMethod, DateTime, ZipArchive, ZipWriter,
    result::{ZipError, ZipResult},
    write::SimpleFileOptions,
};

pub(crate) type FileZipWriter = ZipWriter<BufWriter<File>>;

/// Opciones de cada miembro: deflate nivel 9 y fecha fija, para que el mismo
/// contenido produzca siempre los mismos bytes.
pub(crate) fn member_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9))
        .last_modified_time(DateTime::default())
}

/// Contenido de una canción NCN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcnPayload {
    pub mid: Vec<u8>,
    pub lyr: Vec<u8>,
    pub cur: Vec<u8>,
}

/// Empaqueta una canción NCN como zip anidado con `song.mid`, `song.lyr` y `song.cur`.
pub fn bundle_ncn(payload: &NcnPayload) -> ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in [
        (NCN_MIDI_MEMBER, &payload.mid),
        (NCN_LYRICS_MEMBER, &payload.lyr),
        (NCN_CURSOR_MEMBER, &payload.cur),
    ] {
        zip.start_file(name, member_options())?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Inversa de [`bundle_ncn`].
pub fn unpack_ncn(bundle: &[u8]) -> ZipResult<NcnPayload> {
    let mut archive = ZipArchive::new(Cursor::new(bundle))?;
    Ok(NcnPayload {
        mid: read_member(&mut archive, NCN_MIDI_MEMBER)?,
        lyr: read_member(&mut archive, NCN_LYRICS_MEMBER)?,
        cur: read_member(&mut archive, NCN_CURSOR_MEMBER)?,
    })
}

pub(crate) fn read_member<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> ZipResult<Vec<u8>> {
    let mut file = archive.by_name(name)?;
    let mut out = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut out)?;
    Ok(out)
}

/// Escribe un zip en `<dest>.part`, lo renombra a `dest` y devuelve su tamaño.
///
/// `fill` decide qué miembros entran; si devuelve `Ok(false)` el archivo se
/// descarta y no se publica nada.
pub(crate) fn write_zip<E, F>(dest: &Path, fill: F) -> Result<Option<u64>, E>
where
    E: From<io::Error> + From<ZipError> + From<karaoke_paths::Error>,
    F: FnOnce(&mut FileZipWriter) -> Result<bool, E>,
{
    let part = part_path(dest);
    let result = (|| {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(&part)?));
        let keep = fill(&mut zip)?;
        let mut out = zip.finish()?;
        out.flush()?;
        Ok::<_, E>(keep)
    })();

    match result {
        Ok(true) => {
            commit_part(&part, dest)?;
            Ok(Some(fs::metadata(dest)?.len()))
        }
        Ok(false) => {
            let _ = fs::remove_file(&part);
            Ok(None)
        }
        Err(e) => {
            let _ = fs::remove_file(&part);
            Err(e)
        }
    }
}
