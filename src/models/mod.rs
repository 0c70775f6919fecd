pub mod artifacts;
pub mod document;
pub mod loaders;
pub mod passage;

pub use artifacts::{ArtifactsView, DerivedArtifacts};
pub use document::{file_name_of, DocumentRef, KnowledgeSet, KnownDocuments};
pub use loaders::{load_documents, load_session_plan, SessionPlan};
pub use passage::{Passage, PassageError, SearchRequest, SearchResponse};
