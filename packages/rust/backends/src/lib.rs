//! Capability backends for document parsing, archival, and RAG ingestion.
//!
//! Each capability is an async trait with one or more built-in
//! implementations. [`Services`] builds the configured set from a
//! [`docpipe_shared::PipelineConfig`] and probes them before a run.

pub mod archive;
mod blocking;
mod error;
pub mod parser;
pub mod rag;
mod services;

pub use archive::{
    ArchiveBackend, ArchiveReceipt, ArchiveRequest, DirectoryArchive, VerificationStatus,
};
pub use error::{BackendError, BackendResult};
pub use parser::{LocalParser, ParsedResult, ParserBackend};
pub use rag::{DirectoryRag, RagBackend, RagReceipt, RagRequest};
pub use services::Services;
