//! litfeed-llm — Language-model access for query and content generation.
//!
//! `backend` holds the transport (any OpenAI-compatible endpoint);
//! `querygen` turns research interests into PubMed queries;
//! `content` produces the four platform/length copy variants;
//! `fallback` is the deterministic no-network degradation path.

pub mod backend;
pub mod content;
pub mod fallback;
pub mod querygen;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiCompatibleBackend};
pub use content::ContentGenerator;
pub use querygen::QueryGenerator;
