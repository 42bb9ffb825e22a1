//! Retrieval corpora on a managed vector-search backend.
//!
//! The tools in `tools::builtin::corpus` call through `CorpusService`, which
//! owns name resolution and session bookkeeping. The backend itself is a
//! trait so tests can swap in memory.

pub mod backend;
#[cfg(test)]
pub(crate) mod mock;
pub mod names;
pub mod service;
pub mod settings;
pub mod types;
pub mod vertex;

pub use backend::CorpusBackend;
pub use names::{corpus_resource_name, normalize_source_path, sanitize_display_name};
pub use service::CorpusService;
pub use settings::CorpusSettings;
pub use types::{CorpusFile, CorpusInfo, RetrievedContext};
pub use vertex::VertexRagClient;
