use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::PipelineError;
use crate::models::{Credentials, Project};

/// Issue tracker operations the review loop depends on
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, PipelineError>;

    async fn list_issue_types(&self, project_key: &str) -> Result<Vec<String>, PipelineError>;

    /// Returns the new issue key, e.g. `KAN-12`.
    async fn create_issue(
        &self,
        project_key: &str,
        summary: &str,
        description: &str,
        issue_type: &str,
    ) -> Result<String, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct Myself {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct CreateMeta {
    #[serde(default)]
    projects: Vec<CreateMetaProject>,
}

#[derive(Debug, Deserialize)]
struct CreateMetaProject {
    #[serde(default)]
    issuetypes: Vec<IssueType>,
}

#[derive(Debug, Deserialize)]
struct IssueType {
    name: String,
}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    fields: IssueFields<'a>,
}

#[derive(Serialize)]
struct IssueFields<'a> {
    project: KeyRef<'a>,
    summary: &'a str,
    description: &'a str,
    issuetype: NameRef<'a>,
}

#[derive(Serialize)]
struct KeyRef<'a> {
    key: &'a str,
}

#[derive(Serialize)]
struct NameRef<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

/// Jira Cloud REST v2 client; one session is reused for the whole run.
pub struct JiraClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl JiraClient {
    pub fn new(base_url: &Url, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn email(&self) -> &str {
        &self.credentials.username
    }

    /// Verify the credentials; returns the account's display name.
    pub async fn connect(&self) -> Result<String, PipelineError> {
        let myself: Myself = self
            .send_json(self.get("/rest/api/2/myself"))
            .await
            .map_err(|e| PipelineError::Connection(format!("{:#}", e)))?;
        Ok(myself.display_name)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authed(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth(&self.credentials.username, Some(&self.credentials.token))
            .header("Accept", "application/json")
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T> {
        let response = builder.send().await.context("Failed to reach Jira")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("Jira API returned error: {} - {}", status, error_text);
        }

        response
            .json::<T>()
            .await
            .context("Failed to parse Jira API response")
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn list_projects(&self) -> Result<Vec<Project>, PipelineError> {
        debug!("list_projects: called");
        self.send_json(self.get("/rest/api/2/project"))
            .await
            .map_err(|e| PipelineError::Listing {
                what: "projects",
                message: format!("{:#}", e),
            })
    }

    async fn list_issue_types(&self, project_key: &str) -> Result<Vec<String>, PipelineError> {
        debug!(%project_key, "list_issue_types: called");
        let path = format!(
            "/rest/api/2/issue/createmeta?projectKeys={}&expand=projects.issuetypes",
            urlencoding::encode(project_key)
        );

        let meta: CreateMeta = self
            .send_json(self.get(&path))
            .await
            .map_err(|e| PipelineError::Listing {
                what: "issue types",
                message: format!("{:#}", e),
            })?;

        Ok(meta
            .projects
            .into_iter()
            .next()
            .map(|p| p.issuetypes.into_iter().map(|t| t.name).collect())
            .unwrap_or_default())
    }

    async fn create_issue(
        &self,
        project_key: &str,
        summary: &str,
        description: &str,
        issue_type: &str,
    ) -> Result<String, PipelineError> {
        debug!(%project_key, %issue_type, "create_issue: called");
        let request = CreateIssueRequest {
            fields: IssueFields {
                project: KeyRef { key: project_key },
                summary,
                description,
                issuetype: NameRef { name: issue_type },
            },
        };

        let url = format!("{}/rest/api/2/issue", self.base_url);
        let created: CreatedIssue = self
            .send_json(self.authed(self.client.post(url)).json(&request))
            .await
            .map_err(|e| PipelineError::Creation(format!("{:#}", e)))?;
        Ok(created.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_issue_body_shape() {
        let request = CreateIssueRequest {
            fields: IssueFields {
                project: KeyRef { key: "KAN" },
                summary: "Login page",
                description: "SSO",
                issuetype: NameRef { name: "Story" },
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fields": {
                    "project": { "key": "KAN" },
                    "summary": "Login page",
                    "description": "SSO",
                    "issuetype": { "name": "Story" }
                }
            })
        );
    }

    #[test]
    fn test_createmeta_parsing() {
        let body = r#"{"projects":[{"key":"KAN","issuetypes":[{"name":"Task"},{"name":"Story"}]}]}"#;
        let meta: CreateMeta = serde_json::from_str(body).unwrap();
        let names: Vec<String> = meta.projects[0]
            .issuetypes
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["Task", "Story"]);

        let empty: CreateMeta = serde_json::from_str("{}").unwrap();
        assert!(empty.projects.is_empty());
    }

    #[test]
    fn test_project_listing_parsing() {
        let body = r#"[{"id":"10000","key":"KAN","name":"Kanban","projectTypeKey":"software"}]"#;
        let projects: Vec<Project> = serde_json::from_str(body).unwrap();
        assert_eq!(projects, vec![Project::new("KAN", "Kanban")]);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let url = Url::parse("https://acme.atlassian.net/").unwrap();
        let client = JiraClient::new(
            &url,
            Credentials {
                username: "po@acme.test".to_string(),
                token: "t".to_string(),
            },
        )
        .unwrap();
        assert_eq!(client.base_url, "https://acme.atlassian.net");
        assert_eq!(client.email(), "po@acme.test");
    }
}
