//! Label classification and issue content generation for DeskLink.
//!
//! The pipeline turns a helpdesk conversation into GitHub label candidates
//! through a fixed-shape ladder (tag mapping, AI inference, keyword
//! heuristics, contextual defaults) and synthesizes issue title/body content
//! with a deterministic manual fallback.

pub mod classify;
pub mod content;
pub mod context;
pub mod similarity;

pub use classify::{
    ClassificationOutcome, ClassificationReport, ClassifierConfig, LabelClassifier, MappingEntry,
};
pub use content::{ContentGenerator, IssueContent};
pub use context::{ConversationContext, ConversationMessage, MessageAuthor};
pub use similarity::{CharOverlapScorer, SimilarityScorer};
