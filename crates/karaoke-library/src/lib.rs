//! Pipeline de empaquetado de colecciones karaoke: clasificación, lotes,
//! grupos de archivos e índice de búsqueda.

pub mod config;
pub mod error;
pub mod grouping;
pub mod indexing;
pub mod lookup;
pub mod packing;
pub mod pipeline;
pub mod reorder;
pub mod scanning;
pub mod workers;

pub use config::{GroupingPolicy, PackerConfig, PackerConfigBuilder, SourceKind};
pub use error::{ConfigError, LookupError, PackError, PipelineError};
pub use lookup::{DEFAULT_MAX_RESULTS, IndexReader, SearchHit, SongPayload};
pub use pipeline::{Pipeline, RunOutcome, RunSummary};
