use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::PipelineError;
use crate::models::Credentials;

/// Longest text handed to the model, in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const SEARCH_RESULTS: usize = 3;

#[derive(Deserialize)]
struct ConfluencePage {
    body: ConfluenceBody,
}

#[derive(Deserialize)]
struct ConfluenceBody {
    storage: ConfluenceStorage,
}

#[derive(Deserialize)]
struct ConfluenceStorage {
    value: String,
}

/// Fetches meeting notes from the web, search results, or Confluence.
pub struct ContentSource {
    client: Client,
    tracker_host: String,
    max_chars: usize,
}

impl ContentSource {
    pub fn new(tracker_host: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
            )
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            tracker_host: tracker_host.into(),
            max_chars: MAX_CONTENT_CHARS,
        })
    }

    /// Web search; returns up to three result URLs in ranking order, empty on error.
    pub async fn search(&self, query: &str) -> Vec<String> {
        println!("Searching the web for: {}", query);
        match self.try_search(query).await {
            Ok(urls) => urls,
            Err(e) => {
                eprintln!("Error searching the web: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}?q={}", SEARCH_ENDPOINT, urlencoding::encode(query));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            anyhow::bail!("Search returned HTTP {}", response.status());
        }

        let html = response.text().await.context("Failed to read search results")?;
        Ok(parse_search_results(&html, SEARCH_RESULTS))
    }

    /// Page text for `url`, at most `MAX_CONTENT_CHARS` long; empty on any failure.
    pub async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> String {
        println!("Scraping URL: {}", url);

        if let Some(text) = self.fetch_confluence(url, credentials).await {
            return truncate_chars(&text, self.max_chars).to_string();
        }

        match self.try_fetch(url, credentials).await {
            Ok(text) => truncate_chars(&text, self.max_chars).to_string(),
            Err(e) => {
                eprintln!("{:#}", e);
                String::new()
            }
        }
    }

    /// Structured page body via the Confluence REST API; `None` means use the plain scrape.
    async fn fetch_confluence(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Option<String> {
        let request = self.confluence_request(url, credentials)?;
        println!("Detected Confluence page. Using API: {}", request.url());

        match self.try_fetch_confluence(request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(url = %url, error = %e, "fetch_confluence: falling back to plain scrape");
                eprintln!("{:#}", e);
                None
            }
        }
    }

    /// Authenticated content-API request for a wiki page on the tracker's own host.
    ///
    /// `None` when the URL is not a wiki page, no credentials were given, or the
    /// host is anything other than the tracker.
    pub fn confluence_request(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Option<reqwest::Request> {
        let parsed = Url::parse(url).ok()?;
        let page_id = confluence_page_id(&parsed)?;
        let creds = credentials.filter(|_| self.sends_credentials_to(&parsed))?;

        let api_url = format!(
            "{}/wiki/rest/api/content/{}?expand=body.storage",
            parsed.origin().ascii_serialization(),
            page_id
        );

        self.client
            .get(api_url)
            .basic_auth(&creds.username, Some(&creds.token))
            .build()
            .ok()
    }

    async fn try_fetch_confluence(&self, request: reqwest::Request) -> Result<String> {
        let response = self
            .client
            .execute(request)
            .await
            .context("Confluence API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Confluence API failed: {} - {}", status, body);
        }

        let page = response
            .json::<ConfluencePage>()
            .await
            .context("Failed to parse Confluence API response")?;
        Ok(storage_to_text(&page.body.storage.value))
    }

    async fn try_fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<String> {
        let request = self.build_request(url, credentials)?;
        let response = self.client.execute(request).await.map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                message: format!("status {}", status),
            }
            .into());
        }

        let html = response.text().await.context("Failed to read response body")?;
        Ok(html_to_text(&html))
    }

    /// GET request for a page; credentials are attached only for the tracker's own host.
    pub fn build_request(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<reqwest::Request> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
        let mut builder = self.client.get(parsed.clone());

        if let Some(creds) = credentials {
            if self.sends_credentials_to(&parsed) {
                debug!(host = ?parsed.host_str(), "build_request: attaching tracker credentials");
                builder = builder.basic_auth(&creds.username, Some(&creds.token));
            }
        }

        builder.build().context("Failed to build request")
    }

    fn sends_credentials_to(&self, url: &Url) -> bool {
        is_tracker_host(url, &self.tracker_host)
    }
}

/// Exact, case-insensitive host match against the tracker.
pub fn is_tracker_host(url: &Url, tracker_host: &str) -> bool {
    !tracker_host.is_empty()
        && url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(tracker_host))
}

/// Numeric id from `/wiki/.../pages/<id>/...` URLs
pub fn confluence_page_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    let wiki = segments.iter().position(|s| *s == "wiki")?;
    segments[wiki + 1..]
        .windows(2)
        .find(|pair| {
            pair[0] == "pages" && !pair[1].is_empty() && pair[1].bytes().all(|b| b.is_ascii_digit())
        })
        .map(|pair| pair[1].to_string())
}

/// Visible text of an HTML page, one chunk per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"))
        });
        if !hidden {
            text.push_str(fragment);
            text.push('\n');
        }
    }

    text.lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain text from Confluence storage-format markup
pub fn storage_to_text(markup: &str) -> String {
    html2text::from_read(markup.as_bytes(), 100)
}

/// Result links from a DuckDuckGo HTML results page.
pub fn parse_search_results(html: &str, limit: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.result__a") else {
        return Vec::new();
    };

    let mut urls: Vec<String> = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(target) = unwrap_redirect(href) else {
            continue;
        };
        if !urls.contains(&target) {
            urls.push(target);
        }
        if urls.len() == limit {
            break;
        }
    }
    urls
}

fn unwrap_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;

    let target = if url.path() == "/l/" {
        let (_, value) = url.query_pairs().find(|(key, _)| key == "uddg")?;
        Url::parse(&value).ok()?
    } else {
        url
    };

    matches!(target.scheme(), "http" | "https").then(|| target.to_string())
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
