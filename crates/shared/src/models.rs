use serde::{Deserialize, Serialize};

/// A candidate tracker issue extracted from meeting notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub summary: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
}

/// Stories in extraction order, which is also review order
pub type StoryBatch = Vec<Story>;

/// Wire shape the model is asked to return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryList {
    pub stories: Vec<Story>,
}

/// Operator verdict for a single story
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Create,
    Skip,
    QuitRemaining,
}

impl ReviewDecision {
    /// `y` creates, `q` quits, anything else skips.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => ReviewDecision::Create,
            "q" | "quit" => ReviewDecision::QuitRemaining,
            _ => ReviewDecision::Skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCreationResult {
    pub story_index: usize,
    pub success: bool,
    pub issue_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub key: String,
    pub name: String,
}

impl Project {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// Project and issue type every accepted story is filed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTarget {
    pub project_key: String,
    pub issue_type: String,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

// Keep the token out of debug output and logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"***")
            .finish()
    }
}
