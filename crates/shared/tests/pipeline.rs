use anyhow::Result;
use async_trait::async_trait;
use shared::{
    select_target, DecisionSource, ExtractionEngine, IssueTracker, LlmBackend, LlmReply,
    PipelineError, Project, Prompt, ReviewDecision, ReviewLoop, ReviewTarget, Story,
};
use std::collections::VecDeque;
use std::sync::Mutex;

struct StubBackend {
    reply: String,
}

#[async_trait]
impl LlmBackend for StubBackend {
    fn describe(&self) -> String {
        "stub".to_string()
    }

    async fn invoke(&self, prompt: &str) -> Result<LlmReply> {
        assert!(prompt.contains("We need a login page with SSO."));
        Ok(LlmReply::Message {
            content: self.reply.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CreateCall {
    project_key: String,
    summary: String,
    description: String,
    issue_type: String,
}

#[derive(Default)]
struct RecordingTracker {
    projects: Option<Vec<Project>>,
    issue_types: Option<Vec<String>>,
    reject_summaries: Vec<String>,
    calls: Mutex<Vec<CreateCall>>,
}

impl RecordingTracker {
    fn calls(&self) -> Vec<CreateCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn list_projects(&self) -> Result<Vec<Project>, PipelineError> {
        self.projects.clone().ok_or(PipelineError::Listing {
            what: "projects",
            message: "HTTP 503".to_string(),
        })
    }

    async fn list_issue_types(&self, _project_key: &str) -> Result<Vec<String>, PipelineError> {
        self.issue_types.clone().ok_or(PipelineError::Listing {
            what: "issue types",
            message: "HTTP 503".to_string(),
        })
    }

    async fn create_issue(
        &self,
        project_key: &str,
        summary: &str,
        description: &str,
        issue_type: &str,
    ) -> Result<String, PipelineError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(CreateCall {
            project_key: project_key.to_string(),
            summary: summary.to_string(),
            description: description.to_string(),
            issue_type: issue_type.to_string(),
        });
        if self.reject_summaries.iter().any(|s| s == summary) {
            return Err(PipelineError::Creation("HTTP 400".to_string()));
        }
        Ok(format!("{}-{}", project_key, calls.len()))
    }
}

/// Hands out queued decisions and remembers which stories were shown.
struct ScriptedDecisions {
    queue: VecDeque<ReviewDecision>,
    seen: Vec<String>,
}

impl ScriptedDecisions {
    fn new(decisions: &[ReviewDecision]) -> Self {
        Self {
            queue: decisions.iter().copied().collect(),
            seen: Vec::new(),
        }
    }
}

impl DecisionSource for ScriptedDecisions {
    fn ask_decision(&mut self, story: &Story) -> ReviewDecision {
        self.seen.push(story.summary.clone());
        self.queue.pop_front().unwrap_or(ReviewDecision::QuitRemaining)
    }
}

struct ScriptedPrompt(VecDeque<String>);

impl ScriptedPrompt {
    fn new(answers: &[&str]) -> Self {
        Self(answers.iter().map(|a| a.to_string()).collect())
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, _message: &str) -> Result<String> {
        self.0
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted answer left"))
    }
}

fn story(summary: &str) -> Story {
    Story {
        summary: summary.to_string(),
        description: format!("{} description", summary),
        acceptance_criteria: vec![format!("{} works", summary)],
    }
}

fn target() -> ReviewTarget {
    ReviewTarget {
        project_key: "KAN".to_string(),
        issue_type: "Story".to_string(),
    }
}

#[tokio::test]
async fn login_notes_become_one_jira_story() {
    let reply = "Here are the stories:\n```json\n{\"stories\": [{\"summary\": \"SSO login page\", \
        \"description\": \"As a user I want to sign in with SSO.\", \
        \"acceptance_criteria\": [\"Login via company IdP\", \"Failed login shows an error\"]}]}\n```";
    let engine = ExtractionEngine::new(Box::new(StubBackend {
        reply: reply.to_string(),
    }));

    let stories = engine.generate("We need a login page with SSO.").await;
    assert_eq!(stories.len(), 1);

    let tracker = RecordingTracker::default();
    let mut decisions = ScriptedDecisions::new(&[ReviewDecision::Create]);
    let results = ReviewLoop::new(&tracker, target())
        .run(&stories, &mut decisions)
        .await;

    let calls = tracker.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].project_key, "KAN");
    assert_eq!(calls[0].summary, "SSO login page");
    assert_eq!(calls[0].issue_type, "Story");
    assert!(calls[0].description.starts_with("As a user I want to sign in with SSO."));
    assert!(calls[0].description.contains(
        "*Acceptance Criteria:*\n- Login via company IdP\n- Failed login shows an error"
    ));

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].issue_key.as_deref(), Some("KAN-1"));
}

#[tokio::test]
async fn quit_stops_before_remaining_stories() {
    let stories = vec![story("A"), story("B"), story("C")];
    let tracker = RecordingTracker::default();
    let mut decisions =
        ScriptedDecisions::new(&[ReviewDecision::Create, ReviewDecision::QuitRemaining]);

    let results = ReviewLoop::new(&tracker, target())
        .run(&stories, &mut decisions)
        .await;

    let created: Vec<String> = tracker.calls().into_iter().map(|c| c.summary).collect();
    assert_eq!(created, vec!["A"]);
    assert_eq!(decisions.seen, vec!["A", "B"]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].story_index, 0);
}

#[tokio::test]
async fn skip_and_failure_do_not_abort_the_batch() {
    let stories = vec![story("A"), story("B"), story("C"), story("B")];
    let tracker = RecordingTracker {
        reject_summaries: vec!["B".to_string()],
        ..Default::default()
    };
    let mut decisions = ScriptedDecisions::new(&[
        ReviewDecision::Skip,
        ReviewDecision::Create,
        ReviewDecision::Create,
        ReviewDecision::Skip,
    ]);

    let results = ReviewLoop::new(&tracker, target())
        .run(&stories, &mut decisions)
        .await;

    let created: Vec<String> = tracker.calls().into_iter().map(|c| c.summary).collect();
    assert_eq!(created, vec!["B", "C"]);
    assert_eq!(decisions.seen.len(), 4);

    let outcome: Vec<(usize, bool)> = results.iter().map(|r| (r.story_index, r.success)).collect();
    assert_eq!(outcome, vec![(1, false), (2, true)]);
    assert_eq!(results[0].issue_key, None);
}

#[tokio::test]
async fn malformed_reply_yields_no_stories_and_no_issues() {
    let engine = ExtractionEngine::new(Box::new(StubBackend {
        reply: "I could not find any stories, sorry!".to_string(),
    }));
    let stories = engine.generate("We need a login page with SSO.").await;
    assert!(stories.is_empty());
}

#[tokio::test]
async fn target_from_listed_project_and_default_type() {
    let tracker = RecordingTracker {
        projects: Some(vec![Project::new("KAN", "Kanban"), Project::new("OPS", "Ops")]),
        issue_types: Some(vec!["Task".to_string(), "Story".to_string()]),
        ..Default::default()
    };
    let mut prompt = ScriptedPrompt::new(&["2", ""]);

    let target = select_target(&tracker, &mut prompt).await.unwrap();
    assert_eq!(
        target,
        ReviewTarget {
            project_key: "OPS".to_string(),
            issue_type: "Story".to_string(),
        }
    );
}

#[tokio::test]
async fn target_falls_back_when_listing_fails() {
    let tracker = RecordingTracker::default();
    let mut prompt = ScriptedPrompt::new(&["", "kan"]);

    let target = select_target(&tracker, &mut prompt).await.unwrap();
    assert_eq!(target.project_key, "kan");
    assert_eq!(target.issue_type, "Story");
}

#[tokio::test]
async fn invalid_issue_type_choice_uses_first_without_story() {
    let tracker = RecordingTracker {
        projects: Some(vec![]),
        issue_types: Some(vec!["Task".to_string(), "Bug".to_string()]),
        ..Default::default()
    };
    let mut prompt = ScriptedPrompt::new(&["KAN", "42"]);

    let target = select_target(&tracker, &mut prompt).await.unwrap();
    assert_eq!(target.project_key, "KAN");
    assert_eq!(target.issue_type, "Task");
}
