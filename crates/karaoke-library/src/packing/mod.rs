mod archive;

use std::{fs, io::Write};

use karaoke_core::{
    Batch, BatchArchive, BatchCompletion, BatchOutcome, DroppedSong, IndexEntry, Song, SongFiles,
};
use karaoke_paths::OutputLayout;
use tracing::{Level, debug, instrument, warn};

pub use archive::{NcnPayload, bundle_ncn, unpack_ncn};
pub(crate) use archive::{member_options, read_member, write_zip};

use crate::error::PackError;

/// Parte la secuencia ordenada de canciones en lotes de `batch_size`.
pub struct Batches<I> {
    songs: I,
    batch_size: usize,
    next_batch: usize,
}

impl<I: Iterator<Item = Song>> Iterator for Batches<I> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let songs: Vec<Song> = self.songs.by_ref().take(self.batch_size).collect();
        let first_index = songs.first()?.original_index;

        let batch = Batch {
            index: self.next_batch,
            first_index,
            songs,
        };
        self.next_batch += 1;
        Some(batch)
    }
}

/// `batch_size` tiene que ser ≥ 1 (lo garantiza `PackerConfig::validate`).
pub fn partition<I>(songs: I, batch_size: usize) -> Batches<I::IntoIter>
where
    I: IntoIterator<Item = Song>,
{
    Batches {
        songs: songs.into_iter(),
        batch_size: batch_size.max(1),
        next_batch: 0,
    }
}

/// Empaqueta un lote en `<output>/{batch}.zip`.
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    layout: OutputLayout,
}

impl BatchAssembler {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    /// Una canción cuyos ficheros ya no se pueden leer se descarta del lote;
    /// un error escribiendo el zip hace fallar el lote entero.
    #[instrument(level = Level::DEBUG, skip_all, fields(batch = batch.index), err)]
    pub fn pack(&self, batch: &Batch) -> Result<BatchCompletion, PackError> {
        let dest = self.layout.batch_archive(batch.index);
        let mut entries = Vec::with_capacity(batch.len());
        let mut dropped = Vec::new();

        let size = write_zip::<PackError, _>(&dest, |zip| {
            for song in &batch.songs {
                let bytes = match load_payload(song)? {
                    Ok(bytes) => bytes,
                    Err(reason) => {
                        warn!(song = song.original_index, %reason, "dropping song from batch");
                        dropped.push(DroppedSong {
                            original_index: song.original_index,
                            reason,
                        });
                        continue;
                    }
                };

                zip.start_file(song.archive_member_name(), member_options())?;
                zip.write_all(&bytes)?;
                entries.push(IndexEntry {
                    title: song.metadata.title.clone(),
                    artist: song.metadata.artist.clone(),
                    original_index: song.original_index,
                    batch_index: batch.index,
                });
            }
            Ok(!entries.is_empty())
        })?;

        let outcome = match size {
            Some(size_bytes) => {
                debug!(songs = entries.len(), size_bytes, "batch archive written");
                BatchOutcome::Packed {
                    archive: BatchArchive {
                        path: dest,
                        size_bytes,
                    },
                    entries,
                    dropped,
                }
            }
            None => BatchOutcome::Empty { dropped },
        };

        Ok(BatchCompletion {
            batch_index: batch.index,
            first_index: batch.first_index,
            song_count: batch.len(),
            outcome,
        })
    }
}

/// Bytes del miembro de una canción. El `Err` interno es el motivo para
/// descartarla; el externo, un fallo del lote.
fn load_payload(song: &Song) -> Result<Result<Vec<u8>, String>, PackError> {
    let read = |path: &std::path::Path| {
        fs::read(path).map_err(|e| format!("{}: {e}", path.display()))
    };

    match &song.files {
        SongFiles::Emk { emk } => Ok(read(emk)),
        SongFiles::Ncn { mid, lyr, cur } => {
            let payload = match (read(mid), read(lyr), read(cur)) {
                (Ok(mid), Ok(lyr), Ok(cur)) => NcnPayload { mid, lyr, cur },
                (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return Ok(Err(e)),
            };
            Ok(Ok(bundle_ncn(&payload)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karaoke_core::{SongKind, SongMetadata};
    use std::{io::Cursor, path::Path};
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn emk_song(dir: &Path, index: usize, body: &[u8]) -> Song {
        let emk = dir.join(format!("s{index}.emk"));
        fs::write(&emk, body).unwrap();
        Song {
            original_index: index,
            files: SongFiles::Emk { emk },
            metadata: SongMetadata {
                title: format!("Title {index}"),
                artist: "Artist".into(),
                ..Default::default()
            },
        }
    }

    fn ncn_song(dir: &Path, index: usize) -> Song {
        let mut paths = Vec::new();
        for ext in ["mid", "lyr", "cur"] {
            let p = dir.join(format!("s{index}.{ext}"));
            fs::write(&p, format!("{ext}-{index}")).unwrap();
            paths.push(p);
        }
        let cur = paths.pop().unwrap();
        let lyr = paths.pop().unwrap();
        let mid = paths.pop().unwrap();
        Song {
            original_index: index,
            files: SongFiles::Ncn { mid, lyr, cur },
            metadata: SongMetadata::default(),
        }
    }

    fn member_names(path: &Path) -> Vec<String> {
        let bytes = fs::read(path).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn partition_by_position() {
        let tmp = tempdir().unwrap();
        let songs: Vec<_> = (0..7).map(|i| emk_song(tmp.path(), i, b"x")).collect();

        let batches: Vec<_> = partition(songs, 3).collect();
        let shape: Vec<_> = batches.iter().map(|b| (b.index, b.index_range())).collect();
        assert_eq!(shape, [(0, 0..3), (1, 3..6), (2, 6..7)]);
        for b in &batches {
            for s in &b.songs {
                assert_eq!(s.batch_index(3), b.index);
            }
        }
    }

    #[test]
    fn packs_members_in_song_order() {
        let tmp = tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();

        let songs = vec![ncn_song(tmp.path(), 3), emk_song(tmp.path(), 4, b"EMK!")];
        let batch = partition(songs, 2).next().unwrap();
        let batch = Batch { index: 1, ..batch };

        let done = BatchAssembler::new(OutputLayout::new(&out)).pack(&batch).unwrap();
        let archive = done.archive().unwrap();
        assert_eq!(archive.path, out.join("1.zip"));
        assert_eq!(archive.size_bytes, fs::metadata(&archive.path).unwrap().len());
        assert_eq!(member_names(&archive.path), ["3.zip", "4.emk"]);

        let bytes = fs::read(&archive.path).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let nested = read_member(&mut zip, "3.zip").unwrap();
        let ncn = unpack_ncn(&nested).unwrap();
        assert_eq!(ncn.cur, b"cur-3");
        assert_eq!(read_member(&mut zip, "4.emk").unwrap(), b"EMK!");

        let idx: Vec<_> = done.entries().iter().map(|e| (e.original_index, e.batch_index)).collect();
        assert_eq!(idx, [(3, 1), (4, 1)]);
        assert_eq!(batch.songs[0].kind(), SongKind::Ncn);
    }

    #[test]
    fn vanished_file_drops_only_that_song() {
        let tmp = tempdir().unwrap();
        let songs = vec![emk_song(tmp.path(), 0, b"a"), ncn_song(tmp.path(), 1)];
        fs::remove_file(tmp.path().join("s1.lyr")).unwrap();

        let batch = partition(songs, 10).next().unwrap();
        let done = BatchAssembler::new(OutputLayout::new(tmp.path())).pack(&batch).unwrap();

        assert_eq!(done.entries().len(), 1);
        assert_eq!(done.dropped().len(), 1);
        assert_eq!(done.dropped()[0].original_index, 1);
        assert_eq!(member_names(&tmp.path().join("0.zip")), ["0.emk"]);
    }

    #[test]
    fn all_dropped_means_no_archive() {
        let tmp = tempdir().unwrap();
        let songs = vec![emk_song(tmp.path(), 0, b"a")];
        fs::remove_file(tmp.path().join("s0.emk")).unwrap();

        let batch = partition(songs, 10).next().unwrap();
        let done = BatchAssembler::new(OutputLayout::new(tmp.path())).pack(&batch).unwrap();

        assert!(matches!(done.outcome, BatchOutcome::Empty { .. }));
        assert!(!tmp.path().join("0.zip").exists());
    }

    #[test]
    fn unwritable_destination_fails_the_batch() {
        let tmp = tempdir().unwrap();
        let songs = vec![emk_song(tmp.path(), 0, b"a")];
        let batch = partition(songs, 10).next().unwrap();

        let missing = OutputLayout::new(tmp.path().join("does/not/exist"));
        assert!(BatchAssembler::new(missing).pack(&batch).is_err());
    }
}
