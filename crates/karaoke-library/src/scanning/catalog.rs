use std::path::{Path, PathBuf};

use karaoke_catalog::{CatalogRecord, DbfTable};
use karaoke_core::{SongFiles, SongMetadata};

use super::{Candidate, SkipReason, SongSource};

/// Canciones descritas por `Data/SONG.DBF`, en orden de tabla.
///
/// Los ficheros viven en `Songs/{TYPE}/{SUB_TYPE}/...`, repartidos en
/// subcarpetas por la primera letra del código. Si no están en la subcarpeta
/// se busca directamente en el nivel superior.
pub struct CatalogSource {
    base_dir: PathBuf,
    table: DbfTable,
}

impl CatalogSource {
    pub fn new(base_dir: impl Into<PathBuf>, table: DbfTable) -> Self {
        Self {
            base_dir: base_dir.into(),
            table,
        }
    }

    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, karaoke_catalog::Error> {
        let base_dir = base_dir.into();
        let table = DbfTable::open(&base_dir.join(karaoke_catalog::CATALOG_RELATIVE_PATH))?;
        Ok(Self::new(base_dir, table))
    }

    fn classify(&self, record: CatalogRecord) -> Candidate {
        let metadata = record.metadata();
        let label = if metadata.code.is_empty() {
            format!("row {}", record.row)
        } else {
            metadata.code.clone()
        };

        if metadata.code.is_empty() || metadata.track_type.is_empty() || metadata.sub_type.is_empty() {
            return Candidate::Incomplete {
                label,
                reason: SkipReason::MissingFields,
            };
        }

        match resolve_files(&self.base_dir, &metadata) {
            Ok(files) => Candidate::Complete { files, metadata },
            Err(reason) => Candidate::Incomplete { label, reason },
        }
    }
}

impl SongSource for CatalogSource {
    fn candidates(&self) -> Box<dyn Iterator<Item = Candidate> + Send + '_> {
        Box::new(self.table.records().map(|record| self.classify(record)))
    }
}

fn locate(dir: &Path, folder: &str, file_name: &str) -> Option<PathBuf> {
    let nested = dir.join(folder).join(file_name);
    if nested.is_file() {
        return Some(nested);
    }
    let flat = dir.join(file_name);
    flat.is_file().then_some(flat)
}

fn resolve_files(base_dir: &Path, meta: &SongMetadata) -> Result<SongFiles, SkipReason> {
    let primary = base_dir
        .join("Songs")
        .join(&meta.track_type)
        .join(&meta.sub_type);
    let code = meta.code.as_str();
    let folder: String = code.chars().take(1).collect();

    match meta.sub_type.to_ascii_uppercase().as_str() {
        "EMK" => locate(&primary, &folder, &format!("{code}.emk"))
            .map(|emk| SongFiles::Emk { emk })
            .ok_or(SkipReason::MissingFiles(vec!["emk"])),
        "NCN" => {
            let mid = locate(&primary.join("Song"), &folder, &format!("{code}.mid"));
            let lyr = locate(&primary.join("Lyrics"), &folder, &format!("{code}.lyr"));
            let cur = locate(&primary.join("Cursor"), &folder, &format!("{code}.cur"));
            match (mid, lyr, cur) {
                (Some(mid), Some(lyr), Some(cur)) => Ok(SongFiles::Ncn { mid, lyr, cur }),
                (mid, lyr, cur) => {
                    let missing = [(mid.is_none(), "mid"), (lyr.is_none(), "lyr"), (cur.is_none(), "cur")]
                        .into_iter()
                        .filter_map(|(gone, ext)| gone.then_some(ext))
                        .collect();
                    Err(SkipReason::MissingFiles(missing))
                }
            }
        }
        other => Err(SkipReason::UnsupportedSubType(other.to_string())),
    }
}
