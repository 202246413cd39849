use anyhow::{Context, Result};
use clap::Parser;
use shared::{
    create_backend, select_target, Config, Console, ContentSource, ExtractionEngine, JiraClient,
    LlmConfig, LlmProvider, Prompt, ReviewLoop,
};
use std::io::BufRead;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Search,
    Url,
    Confluence,
    Manual,
}

impl Source {
    fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "search" => Some(Source::Search),
            "url" => Some(Source::Url),
            "confluence" => Some(Source::Confluence),
            "manual" => Some(Source::Manual),
            _ => None,
        }
    }
}

fn prompt_source_selection(prompt: &mut impl Prompt) -> Result<Source> {
    println!("\n[Content Retrieval]");
    println!("1. Search the web for Meeting Minutes");
    println!("2. Scrape specific URL");
    println!("3. Scrape Configured Confluence Page");
    println!("4. Manual Input / Paste Meeting Notes");

    match prompt.ask("Select option (1/2/3/4): ")?.as_str() {
        "1" => Ok(Source::Search),
        "2" => Ok(Source::Url),
        "3" => Ok(Source::Confluence),
        "4" => Ok(Source::Manual),
        _ => anyhow::bail!("Invalid choice. Please choose 1, 2, 3, or 4."),
    }
}

fn prompt_llm_selection(prompt: &mut impl Prompt, llm: &LlmConfig) -> Result<LlmConfig> {
    println!("\n[LLM Processing]");
    println!("Current Configured Provider: {}", llm.provider);
    println!("1. Use Configured Provider");
    println!("2. Switch to OpenAI");
    println!("3. Switch to Ollama");

    let provider = match prompt.ask("Select option (1/2/3): ")?.as_str() {
        "2" => LlmProvider::OpenAi,
        "3" => LlmProvider::Ollama,
        _ => return Ok(llm.clone()),
    };

    let default_model = llm.with_override(provider, None).model().to_string();
    let model = prompt.ask(&format!("Enter {} model (default: {}): ", provider, default_model))?;
    Ok(llm.with_override(provider, Some(model)))
}

#[derive(Parser)]
#[command(name = "create-stories")]
#[command(about = "Extract user stories from meeting notes and file them in Jira")]
struct Args {
    /// Where to read meeting notes from (search, url, confluence, manual)
    #[arg(short, long)]
    source: Option<String>,

    /// LLM provider to use instead of the configured one (ollama, openai)
    #[arg(short, long)]
    provider: Option<LlmProvider>,

    /// Model name for the chosen provider
    #[arg(short, long, requires = "provider")]
    model: Option<String>,

    /// Show debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn retrieve_content<R: BufRead>(
    source: Source,
    console: &mut Console<R>,
    config: &Config,
    scraper: &ContentSource,
) -> Result<String> {
    let credentials = config.credentials();

    let content = match source {
        Source::Search => {
            let query =
                console.ask("Enter search query (e.g., 'Project Alpha meeting minutes'): ")?;
            let urls = scraper.search(&query).await;
            if urls.is_empty() {
                println!("No results found.");
                return Ok(String::new());
            }

            println!("\nFound URLs:");
            for (idx, url) in urls.iter().enumerate() {
                println!("{}. {}", idx + 1, url);
            }

            let choice = console.ask("Select URL to scrape (number): ")?;
            let target_url = choice
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| urls.get(i))
                .context("Invalid selection.")?;
            scraper.fetch(target_url, Some(&credentials)).await
        }
        Source::Url => {
            let target_url = console.ask("Enter URL: ")?;
            scraper.fetch(&target_url, Some(&credentials)).await
        }
        Source::Confluence => {
            let target_url = config
                .confluence_page_url
                .as_deref()
                .context("CONFLUENCE_PAGE_URL is not configured")?;
            println!("Using configured URL: {}", target_url);
            scraper.fetch(target_url, Some(&credentials)).await
        }
        Source::Manual => {
            println!("\nEnter/Paste your meeting notes (type 'DONE' on a new line when finished):");
            console.read_notes()?
        }
    };

    Ok(content)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = Config::from_env()?;
    let mut console = Console::stdin();

    println!("=== Agentic Jira Story Creator ===");

    println!("\n[Jira Configuration]");
    let jira = JiraClient::new(&config.jira_url, config.credentials())?;
    match jira.connect().await {
        Ok(name) => println!("✓ Connected to Jira as {}", name),
        Err(e) if e.is_fatal() => {
            eprintln!("{}", e);
            anyhow::bail!("Could not connect to Jira as {}. Exiting.", jira.email());
        }
        Err(e) => eprintln!("{}", e),
    }

    let source = match args.source {
        Some(slug) => Source::from_slug(&slug).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid source: {}. Use 'search', 'url', 'confluence', or 'manual'",
                slug
            )
        })?,
        None => prompt_source_selection(&mut console)?,
    };

    let scraper = ContentSource::new(config.tracker_host())?;
    let content = retrieve_content(source, &mut console, &config, &scraper).await?;

    if content.trim().is_empty() {
        println!("No content retrieved. Exiting.");
        return Ok(());
    }
    println!("\n✓ Retrieved {} characters of text.", content.chars().count());

    let llm = match args.provider {
        Some(provider) => config.llm.with_override(provider, args.model),
        None => prompt_llm_selection(&mut console, &config.llm)?,
    };
    let engine = ExtractionEngine::new(create_backend(&llm)?);

    println!("\n🤖 Analyzing content with {}...", engine.backend_name());
    let stories = engine.generate(&content).await;

    if stories.is_empty() {
        println!("No stories generated.");
        return Ok(());
    }
    println!("\n✓ Generated {} stories.", stories.len());

    println!("\n[Review & Create]");
    let target = select_target(&jira, &mut console).await?;
    ReviewLoop::new(&jira, target).run(&stories, &mut console).await;

    println!("\nDone.");
    Ok(())
}
