//! Turns free-form meeting notes into a batch of user stories.
//!
//! Models routinely ignore "return only JSON" and wrap the object in prose or
//! markdown fences, so the reply goes through an ordered set of cleanup stages
//! before it is parsed:
//!
//! 1. text inside the first ```` ```json ```` fence, else
//! 2. text inside the first generic ```` ``` ```` fence, else
//! 3. the whole trimmed reply;
//! 4. then the span from the first `{` to the last `}`.

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::LlmBackend;
use crate::models::{StoryBatch, StoryList};

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

const PROMPT_TEMPLATE: &str = r#"You are an expert Agile Product Owner. Your task is to analyze meeting minutes or project documentation and extract actionable user stories for Jira.

For each story, provide:
1. A concise Summary.
2. A detailed Description explaining the 'Why', 'What', and 'Who'.
3. A list of Acceptance Criteria that must be met.

Return the result as a JSON object with a list of stories.

Meeting Minutes / Content:
{content}

{format_instructions}"#;

/// JSON schema of the reply, rendered into the prompt
pub fn story_list_schema() -> serde_json::Value {
    serde_json::json!({
        "properties": {
            "stories": {
                "description": "List of extracted Jira stories",
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "summary": {
                            "description": "A concise one-line summary of the story",
                            "type": "string"
                        },
                        "description": {
                            "description": "Detailed description of the story",
                            "type": "string"
                        },
                        "acceptance_criteria": {
                            "description": "List of acceptance criteria",
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["summary", "description", "acceptance_criteria"]
                }
            }
        },
        "required": ["stories"]
    })
}

/// Instructions telling the model exactly which JSON shape to emit
pub fn format_instructions() -> String {
    format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
        As an example, for the schema {{\"properties\": {{\"foo\": {{\"type\": \"array\", \"items\": {{\"type\": \"string\"}}}}}}, \"required\": [\"foo\"]}}\n\
        the object {{\"foo\": [\"bar\", \"baz\"]}} is a well-formatted instance of the schema. \
        The object {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not well-formatted.\n\n\
        Here is the output schema:\n```\n{}\n```",
        story_list_schema()
    )
}

/// Content plus format instructions for one extraction call
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub content: String,
    pub format_instructions: String,
}

impl ExtractionRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format_instructions: format_instructions(),
        }
    }

    pub fn render_prompt(&self) -> String {
        PROMPT_TEMPLATE
            .replace("{format_instructions}", &self.format_instructions)
            .replace("{content}", &self.content)
    }
}

/// Stage 1: body of the first ```` ```json ```` fence, up to the next fence or the end.
pub fn strip_json_fence(text: &str) -> Option<&str> {
    let start = text.find(JSON_FENCE)? + JSON_FENCE.len();
    let rest = &text[start..];
    Some(rest.find(FENCE).map_or(rest, |end| &rest[..end]))
}

/// Stage 2: body between the first generic fence and the one after it.
pub fn strip_generic_fence(text: &str) -> Option<&str> {
    let start = text.find(FENCE)? + FENCE.len();
    let rest = &text[start..];
    Some(rest.find(FENCE).map_or(rest, |end| &rest[..end]))
}

/// Stage 4: first `{` through last `}`; unchanged when either is missing.
pub fn slice_braces(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &text[start..=end],
        _ => text,
    }
}

/// Run the cleanup stages in order and return the candidate JSON text.
pub fn recover_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    let unfenced = strip_json_fence(trimmed)
        .or_else(|| strip_generic_fence(trimmed))
        .unwrap_or(trimmed);
    slice_braces(unfenced).trim()
}

/// Parse recovered JSON into stories, rejecting anything off-schema.
pub fn parse_story_batch(json_text: &str) -> Result<StoryBatch, PipelineError> {
    let list: StoryList = serde_json::from_str(json_text)
        .map_err(|e| PipelineError::Extraction(format!("reply is not a valid story list: {}", e)))?;

    if let Some(index) = list
        .stories
        .iter()
        .position(|story| story.summary.trim().is_empty())
    {
        return Err(PipelineError::Extraction(format!(
            "story {} has an empty summary",
            index + 1
        )));
    }

    Ok(list.stories)
}

pub struct ExtractionEngine {
    backend: Box<dyn LlmBackend>,
}

impl ExtractionEngine {
    pub fn new(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> String {
        self.backend.describe()
    }

    /// Extract stories from `content`. Every failure is reported and yields an empty batch.
    pub async fn generate(&self, content: &str) -> StoryBatch {
        debug!(content_len = content.len(), backend = %self.backend.describe(), "generate: called");
        let request = ExtractionRequest::new(content);

        let reply = match self.backend.invoke(&request.render_prompt()).await {
            Ok(reply) => reply.into_text(),
            Err(e) => {
                let err = PipelineError::Extraction(format!("{:#}", e));
                warn!(error = %err, "generate: backend call failed");
                report_failure(&err, None);
                return Vec::new();
            }
        };

        match parse_story_batch(recover_json(&reply)) {
            Ok(stories) => {
                debug!(count = stories.len(), "generate: parsed stories");
                stories
            }
            Err(err) => {
                warn!(error = %err, reply_len = reply.len(), "generate: could not parse reply");
                report_failure(&err, Some(&reply));
                Vec::new()
            }
        }
    }
}

fn report_failure(err: &PipelineError, raw_reply: Option<&str>) {
    eprintln!("\n⚠ Error generating stories: {}", err);
    eprintln!("\n--- RAW LLM RESPONSE ---");
    eprintln!("{}", raw_reply.unwrap_or("No response received."));
    eprintln!("------------------------\n");
}
