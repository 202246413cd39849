//! Operator review of extracted stories and filing of the accepted ones.

use anyhow::Result;
use tracing::{debug, warn};

use crate::console::Prompt;
use crate::models::{IssueCreationResult, Project, ReviewDecision, ReviewTarget, Story};
use crate::tracker::IssueTracker;

pub const DEFAULT_ISSUE_TYPE: &str = "Story";

/// Source of the per-story verdict
pub trait DecisionSource {
    fn ask_decision(&mut self, story: &Story) -> ReviewDecision;
}

/// Description sent to the tracker: the story text plus its acceptance criteria.
pub fn render_description(story: &Story) -> String {
    let criteria = story
        .acceptance_criteria
        .iter()
        .map(|ac| format!("- {}", ac))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\n*Acceptance Criteria:*\n{}", story.description, criteria)
}

/// Number from the list, otherwise the input taken as a key.
pub fn choose_project(input: &str, projects: &[Project]) -> String {
    match input.parse::<usize>() {
        Ok(n) if (1..=projects.len()).contains(&n) => projects[n - 1].key.clone(),
        _ => input.to_uppercase(),
    }
}

/// Index of the "Story" type, or 0.
pub fn default_issue_type_index(issue_types: &[String]) -> usize {
    issue_types
        .iter()
        .position(|t| t.eq_ignore_ascii_case(DEFAULT_ISSUE_TYPE))
        .unwrap_or(0)
}

/// Resolve the operator's answer against the listed issue types.
pub fn choose_issue_type(input: &str, issue_types: &[String]) -> String {
    if issue_types.is_empty() {
        return DEFAULT_ISSUE_TYPE.to_string();
    }
    if input.is_empty() {
        return issue_types[default_issue_type_index(issue_types)].clone();
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=issue_types.len()).contains(&n) => issue_types[n - 1].clone(),
        _ => {
            println!("Invalid selection, using default/Story.");
            if issue_types.iter().any(|t| t == DEFAULT_ISSUE_TYPE) {
                DEFAULT_ISSUE_TYPE.to_string()
            } else {
                issue_types[0].clone()
            }
        }
    }
}

/// Pick the project and issue type once, before any story is reviewed.
pub async fn select_target(
    tracker: &dyn IssueTracker,
    prompt: &mut dyn Prompt,
) -> Result<ReviewTarget> {
    println!("Fetching available projects...");
    let projects = tracker.list_projects().await.unwrap_or_else(|e| {
        eprintln!("{}", e);
        Vec::new()
    });

    let mut project_key = String::new();
    if !projects.is_empty() {
        println!("\nAvailable Projects:");
        for (idx, project) in projects.iter().enumerate() {
            println!("{}. {} - {}", idx + 1, project.key, project.name);
        }
        let choice = prompt.ask("Enter Project Key (or number): ")?;
        project_key = choose_project(&choice, &projects);
    } else {
        println!("Could not fetch projects. Try entering key manually.");
    }
    while project_key.is_empty() {
        project_key = prompt.ask("Enter Jira Project Key (e.g., KAN): ")?;
    }
    println!("Using Project: {}", project_key);

    println!("\nFetching issue types...");
    let issue_types = tracker
        .list_issue_types(&project_key)
        .await
        .unwrap_or_else(|e| {
            eprintln!("{}", e);
            Vec::new()
        });

    let issue_type = if issue_types.is_empty() {
        println!("Could not fetch issue types. Defaulting to '{}'.", DEFAULT_ISSUE_TYPE);
        DEFAULT_ISSUE_TYPE.to_string()
    } else {
        println!("\nAvailable Issue Types:");
        for (idx, name) in issue_types.iter().enumerate() {
            println!("{}. {}", idx + 1, name);
        }
        let default_number = default_issue_type_index(&issue_types) + 1;
        let choice = prompt.ask(&format!(
            "Select Issue Type (number, default {}): ",
            default_number
        ))?;
        choose_issue_type(&choice, &issue_types)
    };
    println!("Using Issue Type: {}", issue_type);

    Ok(ReviewTarget {
        project_key,
        issue_type,
    })
}

/// Walks a story batch in order, filing each story the operator accepts.
pub struct ReviewLoop<'a> {
    tracker: &'a dyn IssueTracker,
    target: ReviewTarget,
}

impl<'a> ReviewLoop<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, target: ReviewTarget) -> Self {
        Self { tracker, target }
    }

    /// One result per attempted creation, in story order. Stops at `QuitRemaining`.
    pub async fn run(
        &self,
        stories: &[Story],
        decisions: &mut dyn DecisionSource,
    ) -> Vec<IssueCreationResult> {
        let mut results = Vec::new();

        for (i, story) in stories.iter().enumerate() {
            present(i, story);

            match decisions.ask_decision(story) {
                ReviewDecision::Create => results.push(self.create(i, story).await),
                ReviewDecision::Skip => debug!(story = i + 1, "run: skipped"),
                ReviewDecision::QuitRemaining => {
                    debug!(story = i + 1, remaining = stories.len() - i, "run: operator quit");
                    break;
                }
            }
        }

        let created = results.iter().filter(|r| r.success).count();
        println!(
            "\n✓ Created {} of {} stories ({} failed)",
            created,
            stories.len(),
            results.len() - created
        );
        results
    }

    async fn create(&self, index: usize, story: &Story) -> IssueCreationResult {
        let description = render_description(story);
        match self
            .tracker
            .create_issue(
                &self.target.project_key,
                &story.summary,
                &description,
                &self.target.issue_type,
            )
            .await
        {
            Ok(key) => {
                println!("Success: {} created.", key);
                IssueCreationResult {
                    story_index: index,
                    success: true,
                    issue_key: Some(key),
                }
            }
            Err(e) => {
                warn!(story = index + 1, error = %e, "create: tracker rejected story");
                eprintln!("✗ {}", e);
                IssueCreationResult {
                    story_index: index,
                    success: false,
                    issue_key: None,
                }
            }
        }
    }
}

fn present(index: usize, story: &Story) {
    println!("\n--- Story {} ---", index + 1);
    println!("Summary: {}", story.summary);
    println!("Description: {}", story.description);
    println!("Criteria:");
    for ac in &story.acceptance_criteria {
        println!("  - {}", ac);
    }
}
