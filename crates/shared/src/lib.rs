// Public modules
pub mod config;
pub mod console;
pub mod content;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod models;
pub mod review;
pub mod tracker;

// Re-export commonly used types
pub use config::{Config, LlmConfig, LlmProvider};
pub use console::{Console, Prompt};
pub use content::ContentSource;
pub use error::PipelineError;
pub use extraction::ExtractionEngine;
pub use llm::{create_backend, LlmBackend, LlmReply};
pub use models::{
    Credentials, IssueCreationResult, Project, ReviewDecision, ReviewTarget, Story, StoryBatch,
};
pub use review::{select_target, DecisionSource, ReviewLoop};
pub use tracker::{IssueTracker, JiraClient};
