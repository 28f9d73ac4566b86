use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use config::{Config, Environment, File, FileFormat};
use derive_builder::Builder;
use karaoke_catalog::CATALOG_RELATIVE_PATH;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefijo de las variables de entorno (`KARAOKE_BATCH_SIZE`, ...).
pub const ENV_PREFIX: &str = "KARAOKE";

/// Carpeta de salida por defecto, relativa a la de entrada.
pub const DEFAULT_OUTPUT_DIR: &str = "processed_karaoke";

/// Tope de trabajos de empaquetado simultáneos.
pub const MAX_WORKERS: usize = 1024;

/// De dónde salen las canciones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Catálogo si existe `Data/SONG.DBF`; si no, recorrido de carpetas.
    #[default]
    Auto,
    Catalog,
    Directory,
}

/// Cuándo se cierra un grupo respecto al lote que cruza el límite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingPolicy {
    /// Si añadir el lote supera el límite, se cierra el grupo actual antes.
    /// Un lote más grande que el límite acaba solo en su propio grupo.
    #[default]
    SealBeforeAdd,
    /// Se añade el lote y se cierra el grupo cuando alcanza el límite.
    SealAfterAdd,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option), default)]
#[serde(default)]
pub struct PackerConfig {
    pub input_dir: PathBuf,
    /// `None` → `<input_dir>/processed_karaoke`.
    pub output_dir: Option<PathBuf>,
    pub source: SourceKind,
    pub batch_size: usize,
    pub zip_size_limit: ByteSize,
    /// Agrupa los lotes en `karaoke_{g}.zip`. Si es `false` quedan los `{b}.zip` sueltos.
    pub create_zip_files: bool,
    pub grouping_policy: GroupingPolicy,
    /// Conserva los `{b}.zip` después de meterlos en un grupo.
    pub keep_batch_archives: bool,
    pub workers: usize,
    /// Registros por fichero de preview.
    pub chunk_size: usize,
    pub create_index_zip: bool,
}

impl Default for PackerConfig {
    fn default() -> Self {
        PackerConfig {
            input_dir: PathBuf::from("."),
            output_dir: None,
            source: SourceKind::Auto,
            batch_size: 100,
            zip_size_limit: ByteSize::mib(500),
            create_zip_files: true,
            grouping_policy: GroupingPolicy::SealBeforeAdd,
            keep_batch_archives: false,
            workers: default_workers(),
            chunk_size: 1000,
            create_index_zip: true,
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get().saturating_mul(2).clamp(1, MAX_WORKERS)
}

impl PackerConfig {
    /// Carga un TOML (si existe) y encima las variables `KARAOKE_*`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let cfg = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(ConfigError::Parse)?;
        let pc = cfg
            .try_deserialize::<PackerConfig>()
            .map_err(ConfigError::Parse)?;
        Ok(pc)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.input_dir.join(DEFAULT_OUTPUT_DIR))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.input_dir.join(CATALOG_RELATIVE_PATH)
    }

    /// Resuelve `Auto` según exista o no el catálogo.
    pub fn resolved_source(&self) -> SourceKind {
        match self.source {
            SourceKind::Auto if self.catalog_path().is_file() => SourceKind::Catalog,
            SourceKind::Auto => SourceKind::Directory,
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        if self.zip_size_limit.as_u64() == 0 {
            return Err(ConfigError::ZipSizeLimit);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ChunkSize);
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::Workers);
        }
        if !self.input_dir.is_dir() {
            return Err(ConfigError::MissingInput(self.input_dir.clone()));
        }
        if self.source == SourceKind::Catalog && !self.catalog_path().is_file() {
            return Err(ConfigError::MissingCatalog(self.catalog_path()));
        }
        Ok(())
    }
}
