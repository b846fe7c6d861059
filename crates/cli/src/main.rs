use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use docify_core::{
    BrowserlessRenderer, DEFAULT_BROWSERLESS_URL, DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, FileBlobStore,
    GeminiGenerator, HttpFetcher, MemoryDocumentStore, Pipeline, PipelineConfig, Renderer, Services, Status,
    SystemResolver, Validator, acquire, extract, fetch_file, fetch_stdin,
};
use owo_colors::OwoColorize;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use url::Url;

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Turn documentation pages into grid-sized analysis blocks
#[derive(Parser, Debug)]
#[command(name = "docify")]
#[command(version)]
#[command(about = "Turn documentation pages into grid-sized analysis blocks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch or read a document, extract its content and report its quality
    Extract(ExtractArgs),
    /// Run the full pipeline against a URL and print the resulting record
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// HTTP timeout in seconds
    #[arg(long, default_value = "15", value_name = "SECS")]
    timeout: u64,

    /// Token for the browserless rendering fallback
    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    browserless_token: Option<String>,

    /// Base URL of the browserless service
    #[arg(long, env = "BROWSERLESS_URL", default_value = DEFAULT_BROWSERLESS_URL, value_name = "URL")]
    browserless_url: String,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// URL to fetch, local file, or "-" for stdin
    #[arg(value_name = "INPUT")]
    input: String,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Exit with an error when the content does not pass the quality gate
    #[arg(long)]
    strict: bool,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// URL of the document to analyze
    #[arg(value_name = "URL")]
    url: String,

    /// What the analysis should focus on
    #[arg(short, long, value_name = "TEXT")]
    instructions: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, value_name = "KEY")]
    api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL, value_name = "MODEL")]
    model: String,

    /// Base URL of the Gemini API
    #[arg(long, env = "GEMINI_URL", default_value = DEFAULT_GEMINI_URL, value_name = "URL", hide = true)]
    gemini_url: String,

    /// Directory for large extracted payloads (default: user cache dir)
    #[arg(long, value_name = "DIR")]
    blob_dir: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    fetch: FetchArgs,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "docify_core=debug,docify=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn pipeline_config(fetch: &FetchArgs) -> PipelineConfig {
    PipelineConfig::builder().fetch_timeout(Duration::from_secs(fetch.timeout)).build()
}

fn renderer(fetch: &FetchArgs, config: &PipelineConfig) -> anyhow::Result<Option<Arc<dyn Renderer>>> {
    let Some(token) = fetch.browserless_token.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };
    let renderer = BrowserlessRenderer::new(&fetch.browserless_url, token, config.fetch.render_timeout)
        .context("Failed to configure the rendering fallback")?;
    Ok(Some(Arc::new(renderer)))
}

fn write_output(output: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reads the input and returns its bytes, content type, source URL and the fetch method used.
async fn read_input(
    args: &ExtractArgs, config: &PipelineConfig, verbose: bool,
) -> anyhow::Result<(Vec<u8>, Option<String>, Url, String)> {
    if args.input == "-" {
        if verbose {
            echo::print_step(1, 3, "Reading from stdin");
        }
        let body = fetch_stdin().context("Failed to read from stdin")?;
        let url = Url::parse("file:///dev/stdin").context("Failed to build stdin URL")?;
        return Ok((body, None, url, "stdin".to_string()));
    }

    if is_url(&args.input) {
        let url = Url::parse(&args.input).with_context(|| format!("Invalid URL: {}", args.input))?;
        if verbose {
            echo::print_step(1, 3, &format!("Fetching from {}", url.as_str().bright_white().underline()));
        }

        let fetcher = HttpFetcher::new(&config.fetch).context("Failed to build HTTP client")?;
        let renderer = renderer(&args.fetch, config)?;
        let acquired = acquire(&url, &fetcher, renderer.as_deref(), &SystemResolver, &config.fetch)
            .await
            .context("Failed to fetch URL")?;

        if verbose {
            for attempt in &acquired.attempts {
                let outcome = if attempt.succeeded { "ok".green().to_string() } else { "failed".red().to_string() };
                echo::print_detail(&attempt.strategy, format!("{} ({})", outcome, echo::format_size(attempt.byte_length)));
            }
        }
        let response = acquired.response;
        return Ok((response.body, response.content_type, url, acquired.method));
    }

    if verbose {
        echo::print_step(1, 3, &format!("Reading from file {}", args.input.bright_white()));
    }
    let body = fetch_file(&args.input).with_context(|| format!("Failed to read file: {}", args.input))?;
    let path = fs::canonicalize(&args.input).with_context(|| format!("Failed to resolve path: {}", args.input))?;
    let url = Url::from_file_path(&path).map_err(|_| anyhow::anyhow!("Failed to build URL for {}", path.display()))?;
    Ok((body, None, url, "file".to_string()))
}

async fn run_extract(args: ExtractArgs, verbose: bool) -> anyhow::Result<()> {
    let config = pipeline_config(&args.fetch);
    let started = Instant::now();

    let (body, content_type, url, method) = read_input(&args, &config, verbose).await?;
    let fetched = started.elapsed();
    if verbose {
        echo::print_detail("Size", echo::format_size(body.len()));
        eprintln!();
        echo::print_step(2, 3, "Extracting content");
    }

    let content = extract(&body, content_type.as_deref(), &url, &config.extract).context("Failed to extract content")?;
    let extracted = started.elapsed();
    if verbose {
        echo::print_detail("Title", &content.title);
        echo::print_detail("Kind", content.kind.as_str());
        echo::print_detail("Words", content.word_count);
        eprintln!();
        echo::print_step(3, 3, "Validating content");
    }

    let validation = Validator::new(config.validation.clone()).validate(&content.text);
    let total = started.elapsed();
    if verbose {
        eprintln!();
        echo::print_timing_summary(
            total,
            &[("Acquire", fetched), ("Extract", extracted - fetched), ("Validate", total - extracted)],
        );
    }

    let output = if args.json {
        let report = json!({
            "url": url.as_str(),
            "fetch_method": method,
            "title": content.title,
            "description": content.description,
            "kind": content.kind,
            "word_count": content.word_count,
            "page_count": content.page_count,
            "validation": validation,
            "text": content.text,
        });
        format!("{}\n", serde_json::to_string_pretty(&report).context("Failed to serialize report")?)
    } else {
        format!(
            "Title: {}\nKind: {}\nWords: {}\n{}\n---\n{}\n",
            content.title,
            content.kind.as_str(),
            content.word_count,
            echo::validation_report(&validation, config.gate_threshold),
            content.text
        )
    };
    write_output(args.output.as_deref(), &output)?;

    if let Err(kind) = validation.gate(config.gate_threshold) {
        if args.strict {
            bail!("Content refused by the quality gate ({}): {}", kind, validation.issues.join("; "));
        }
        echo::print_warning(&format!("Content would be refused by the quality gate ({})", kind));
    }
    Ok(())
}

async fn run_analyze(args: AnalyzeArgs, verbose: bool) -> anyhow::Result<()> {
    let config = pipeline_config(&args.fetch);

    let Some(api_key) = args.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        bail!("A Gemini API key is required: pass --api-key or set GEMINI_API_KEY");
    };
    let generator =
        GeminiGenerator::new(&args.gemini_url, &args.model, api_key).context("Failed to configure the generator")?;

    let blob_root = match args.blob_dir.clone() {
        Some(dir) => dir,
        None => FileBlobStore::default_root().context("Failed to locate the cache directory")?,
    };

    let services = Services {
        store: Arc::new(MemoryDocumentStore::new()),
        blobs: Arc::new(FileBlobStore::new(blob_root)),
        fetcher: Arc::new(HttpFetcher::new(&config.fetch).context("Failed to build HTTP client")?),
        renderer: renderer(&args.fetch, &config)?,
        resolver: Arc::new(SystemResolver),
        generator: Arc::new(generator),
    };
    let pipeline = Pipeline::new(services, config);

    if verbose {
        echo::print_info(&format!("Analyzing {} with {}", args.url.bright_white(), args.model));
    }
    let id = pipeline.submit(&args.url, args.instructions.clone()).await.context("Failed to submit document")?;
    let record = pipeline.run(&id).await.context("Pipeline run failed")?;

    if verbose {
        echo::print_record_summary(&record);
    }

    let output = format!("{}\n", serde_json::to_string_pretty(&record).context("Failed to serialize record")?);
    write_output(args.output.as_deref(), &output)?;

    // Records live only for this run, so their blobs would be unreachable afterwards.
    match pipeline.release_payloads(&record).await {
        Ok(released) if verbose && released > 0 => echo::print_detail("Released blobs", released),
        Ok(_) => {}
        Err(e) => echo::print_warning(&format!("Failed to remove cached payloads: {}", e)),
    }

    if record.status != Status::Completed {
        let message = record.error_message.as_deref().unwrap_or("no error message recorded");
        echo::print_error(message);
        bail!("Document {} ended as {}: {}", record.id, record.status, message);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        echo::print_banner();
        echo::print_info("Debug logging enabled");
        eprintln!();
    }

    match cli.command {
        Command::Extract(args) => run_extract(args, cli.verbose).await,
        Command::Analyze(args) => run_analyze(args, cli.verbose).await,
    }
}
