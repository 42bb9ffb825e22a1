//! Built-in tools for retrieval corpora and reply drafts.

pub mod corpus;
pub mod draft;

use std::sync::Arc;

use crate::corpus::CorpusService;
use crate::mail::DraftStore;
use crate::tools::ToolRegistry;

pub use corpus::{
    AddDataTool, CreateCorpusTool, DeleteCorpusTool, DeleteDocumentTool, GetCorpusInfoTool,
    ListCorporaTool, RagQueryTool,
};
pub use draft::CreateDraftTool;

/// Register the seven corpus tools against one shared service.
pub fn register_corpus_tools(registry: &ToolRegistry, service: Arc<CorpusService>) {
    registry.register_sync(Arc::new(CreateCorpusTool::new(Arc::clone(&service))));
    registry.register_sync(Arc::new(AddDataTool::new(Arc::clone(&service))));
    registry.register_sync(Arc::new(RagQueryTool::new(Arc::clone(&service))));
    registry.register_sync(Arc::new(ListCorporaTool::new(Arc::clone(&service))));
    registry.register_sync(Arc::new(GetCorpusInfoTool::new(Arc::clone(&service))));
    registry.register_sync(Arc::new(DeleteDocumentTool::new(Arc::clone(&service))));
    registry.register_sync(Arc::new(DeleteCorpusTool::new(service)));
}

/// Register the draft tool.
pub fn register_draft_tool(registry: &ToolRegistry, drafts: Arc<dyn DraftStore>) {
    registry.register_sync(Arc::new(CreateDraftTool::new(drafts)));
}
