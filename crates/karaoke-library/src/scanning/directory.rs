use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use karaoke_core::{SongFiles, SongMetadata};
use tracing::warn;
use walkdir::WalkDir;

use super::{Candidate, SkipReason, SongSource};

/// Colección plana: cada carpeta se agrupa por nombre base (`X.mid`, `X.lyr`,
/// `X.cur`, `X.emk`). Carpetas y ficheros se recorren ordenados por nombre.
pub struct DirectorySource {
    root: PathBuf,
    exclude: Vec<PathBuf>,
}

#[derive(Default)]
struct StemFiles {
    mid: Option<PathBuf>,
    lyr: Option<PathBuf>,
    cur: Option<PathBuf>,
    emk: Option<PathBuf>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
        }
    }

    /// Excluye una carpeta del recorrido (p. ej. la salida si cuelga de la entrada).
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude.push(path.into());
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.iter().any(|e| path.starts_with(e))
    }
}

impl SongSource for DirectorySource {
    fn candidates(&self) -> Box<dyn Iterator<Item = Candidate> + Send + '_> {
        let dirs = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()))
            .filter_map(|entry| match entry {
                Ok(e) if e.file_type().is_dir() => Some(e.into_path()),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    None
                }
            });

        Box::new(dirs.flat_map(|dir| classify_dir(&dir)))
    }
}

fn classify_dir(dir: &Path) -> Vec<Candidate> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list folder");
            return Vec::new();
        }
    };

    let mut stems: BTreeMap<String, StemFiles> = BTreeMap::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(OsStr::to_str).map(str::to_ascii_lowercase) else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(OsStr::to_str).map(str::to_owned) else {
            continue;
        };

        let slot = match ext.as_str() {
            "mid" => &mut stems.entry(stem).or_default().mid,
            "lyr" => &mut stems.entry(stem).or_default().lyr,
            "cur" => &mut stems.entry(stem).or_default().cur,
            "emk" => &mut stems.entry(stem).or_default().emk,
            _ => continue,
        };
        *slot = Some(path);
    }

    stems
        .into_iter()
        .flat_map(|(stem, files)| classify_stem(dir, stem, files))
        .collect()
}

/// Un NCN completo gana; si además hay `.emk` se informa como omitido.
fn classify_stem(dir: &Path, stem: String, files: StemFiles) -> Vec<Candidate> {
    let metadata = SongMetadata {
        title: stem.clone(),
        code: stem.clone(),
        ..Default::default()
    };

    match files {
        StemFiles {
            mid: Some(mid),
            lyr: Some(lyr),
            cur: Some(cur),
            emk,
        } => {
            let mut out = vec![Candidate::Complete {
                files: SongFiles::Ncn { mid, lyr, cur },
                metadata,
            }];
            if let Some(emk) = emk {
                out.push(Candidate::Incomplete {
                    label: emk.display().to_string(),
                    reason: SkipReason::ShadowedByNcn,
                });
            }
            out
        }
        StemFiles { emk: Some(emk), .. } => vec![Candidate::Complete {
            files: SongFiles::Emk { emk },
            metadata,
        }],
        StemFiles { mid, lyr, cur, .. } => {
            let missing = [(mid.is_none(), "mid"), (lyr.is_none(), "lyr"), (cur.is_none(), "cur")]
                .into_iter()
                .filter_map(|(gone, ext)| gone.then_some(ext))
                .collect();
            vec![Candidate::Incomplete {
                label: dir.join(stem).display().to_string(),
                reason: SkipReason::MissingFiles(missing),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karaoke_core::SongKind;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    #[test]
    fn groups_by_stem_in_name_order() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        for ext in ["mid", "lyr", "cur"] {
            touch(root, &format!("b.{ext}"));
        }
        touch(root, "a.EMK");
        touch(root, "c.mid");
        touch(root, "c.lyr");
        touch(root, "notes.txt");
        touch(&root.join("sub"), "d.emk");

        let source = DirectorySource::new(root);
        let got: Vec<_> = source
            .candidates()
            .map(|c| match c {
                Candidate::Complete { files, metadata } => (metadata.code, Some(files.kind())),
                Candidate::Incomplete { label, .. } => (label, None),
            })
            .collect();

        assert_eq!(got.len(), 4);
        assert_eq!(got[0], ("a".to_string(), Some(SongKind::Emk)));
        assert_eq!(got[1], ("b".to_string(), Some(SongKind::Ncn)));
        assert_eq!(got[2].1, None);
        assert!(got[2].0.ends_with("c"));
        assert_eq!(got[3], ("d".to_string(), Some(SongKind::Emk)));
    }

    #[test]
    fn ncn_wins_over_emk_and_reports_missing() {
        let tmp = tempdir().unwrap();
        for name in ["x.mid", "x.lyr", "x.cur", "x.emk", "y.mid"] {
            touch(tmp.path(), name);
        }

        let got: Vec<_> = DirectorySource::new(tmp.path()).candidates().collect();
        match &got[0] {
            Candidate::Complete { files, .. } => assert_eq!(files.kind(), SongKind::Ncn),
            other => panic!("Esperaba NCN, obtuve {other:?}"),
        }
        match &got[1] {
            Candidate::Incomplete { label, reason } => {
                assert_eq!(reason, &SkipReason::ShadowedByNcn);
                assert!(label.ends_with("x.emk"));
            }
            other => panic!("Esperaba el .emk omitido, obtuve {other:?}"),
        }
        match &got[2] {
            Candidate::Incomplete { reason, .. } => {
                assert_eq!(reason, &SkipReason::MissingFiles(vec!["lyr", "cur"]))
            }
            other => panic!("Esperaba Incomplete, obtuve {other:?}"),
        }
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn excluded_folder_is_not_walked() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "keep.emk");
        touch(&tmp.path().join("processed_karaoke"), "0.emk");

        let source = DirectorySource::new(tmp.path()).exclude(tmp.path().join("processed_karaoke"));
        assert_eq!(source.candidates().count(), 1);
    }
}
