//! Tools: named JSON-in, JSON-out operations over corpora and drafts.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::*;
