//! Tipos de dominio compartidos por el catálogo, el empaquetador y la CLI.

pub mod batch;
pub mod events;
pub mod index;
pub mod song;

pub use batch::{Batch, BatchArchive, BatchCompletion, BatchOutcome, DroppedSong};
pub use events::{EventSink, NoopSink, PipelineEvent};
pub use index::{
    BatchLocation, ChunkSummary, GroupSummary, INDEX_FORMAT_VERSION, INDEX_VERSION_TAG,
    IndexEntry, MasterIndex,
};
pub use song::{Song, SongFiles, SongKind, SongMetadata};
