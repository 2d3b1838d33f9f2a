use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use c4a_client::Crawler;
use c4a_client::crawler::DEFAULT_DOWNLOAD_EXPIRY;
use c4a_core::config::{
    API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL, MAX_RETRIES_ENV, TIMEOUT_ENV,
};
use c4a_core::{
    ClientConfig, CloudError, ContextRequest, CrawlRequest, CrawlStrategy, DeepCrawlRequest,
    DiscoveryStrategy, JobStatus, ListJobsQuery, SchemaRequest, SchemaSource, SchemaType,
    WaitOptions,
};

#[derive(Parser)]
#[command(name = "c4a", version, about = "Crawl4AI Cloud command line client")]
struct Cli {
    /// API key (sk_live_* or sk_test_*)
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: String,

    /// Service base URL
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = TIMEOUT_ENV, default_value_t = 120)]
    timeout_secs: u64,

    /// Attempts per request, including the first
    #[arg(long, env = MAX_RETRIES_ENV, default_value_t = 3)]
    max_retries: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a single URL synchronously
    Crawl {
        url: String,

        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Crawl up to 10 URLs synchronously
    Batch {
        #[arg(required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Submit URLs as a background job
    Submit {
        #[arg(required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        crawl: CrawlArgs,

        /// Block until the job finishes
        #[arg(long, default_value_t = false)]
        wait: bool,

        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// Inspect and manage crawl jobs
    #[command(subcommand)]
    Job(JobCommand),

    /// Start a deep crawl (discovery scan, optionally followed by a crawl job)
    Deep(DeepArgs),

    /// Inspect and manage discovery scans
    #[command(subcommand)]
    Scan(ScanCommand),

    /// Build a context pack from questions related to a search query
    Context {
        query: String,

        /// Related questions to expand the query into
        #[arg(long, default_value_t = 3)]
        paa_limit: u32,

        /// Search results crawled per question
        #[arg(long, default_value_t = 5)]
        results_per_paa: u32,
    },

    /// Generate an extraction schema from sample pages
    Schema(SchemaArgs),

    /// Show storage usage
    Storage,

    /// Check service health
    Health,
}

#[derive(Subcommand)]
enum JobCommand {
    /// Current status of a job
    Get {
        job_id: String,

        /// Include the results payload
        #[arg(long, default_value_t = false)]
        results: bool,
    },

    /// Poll a job until it finishes (scan ids follow their crawl job)
    Wait {
        job_id: String,

        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// List recent jobs
    List {
        /// Filter by status (pending, running, completed, partial, failed, cancelled)
        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Cancel a job
    Cancel { job_id: String },

    /// Print a presigned download URL for the job's results
    Download {
        job_id: String,

        /// Link lifetime in seconds
        #[arg(long, default_value_t = DEFAULT_DOWNLOAD_EXPIRY)]
        expires_in: u64,
    },
}

#[derive(Subcommand)]
enum ScanCommand {
    /// Current status of a scan
    Status { job_id: String },

    /// Poll a scan until it finishes
    Wait {
        job_id: String,

        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// Stop a scan, keeping what it discovered so far
    Cancel { job_id: String },
}

#[derive(Args)]
struct CrawlArgs {
    /// Fetch strategy: browser or http
    #[arg(long, default_value = "browser")]
    strategy: CrawlStrategy,

    /// Job priority, 1-10 (async jobs only)
    #[arg(long, default_value_t = 5)]
    priority: u8,

    /// Crawler configuration as inline JSON
    #[arg(long, value_parser = parse_json)]
    crawler_config: Option<Value>,

    /// Browser configuration as inline JSON
    #[arg(long, value_parser = parse_json)]
    browser_config: Option<Value>,

    /// Proxy configuration as inline JSON
    #[arg(long, value_parser = parse_json)]
    proxy: Option<Value>,

    /// Skip the service-side cache
    #[arg(long, default_value_t = false)]
    bypass_cache: bool,

    /// Webhook notified when an async job completes
    #[arg(long)]
    webhook_url: Option<String>,
}

impl CrawlArgs {
    fn into_request(self) -> CrawlRequest {
        CrawlRequest {
            strategy: self.strategy,
            priority: self.priority,
            crawler_config: self.crawler_config,
            browser_config: self.browser_config,
            proxy: self.proxy,
            bypass_cache: self.bypass_cache,
            webhook_url: self.webhook_url,
        }
    }
}

#[derive(Args)]
struct WaitArgs {
    /// Seconds between status polls
    #[arg(long, default_value_t = 2.0)]
    poll_interval: f64,

    /// Give up after this many seconds (0 waits forever)
    #[arg(long, default_value_t = 0)]
    wait_timeout: u64,

    /// Fetch results once the job finishes
    #[arg(long, default_value_t = false)]
    results: bool,
}

impl WaitArgs {
    fn options(&self) -> Result<WaitOptions> {
        let interval = Duration::try_from_secs_f64(self.poll_interval)
            .context("--poll-interval must be a non-negative number of seconds")?;
        Ok(WaitOptions::new()
            .with_poll_interval(interval)
            .with_timeout(Duration::from_secs(self.wait_timeout))
            .with_results(self.results))
    }
}

#[derive(Args)]
struct DeepArgs {
    /// Start URL (omit when replaying a scan with --source-job)
    url: Option<String>,

    /// Reuse the cached pages of a previous scan instead of fetching again
    #[arg(long, conflicts_with = "url")]
    source_job: Option<String>,

    /// Discovery strategy: map, bfs, dfs or best_first
    #[arg(long, default_value = "bfs")]
    strategy: DiscoveryStrategy,

    #[arg(long, default_value_t = 3)]
    max_depth: u32,

    #[arg(long, default_value_t = 100)]
    max_urls: u32,

    /// Only discover URLs; cache the pages for a later --source-job run
    #[arg(long, default_value_t = false)]
    scan_only: bool,

    /// Keep only URLs matching these patterns (repeatable)
    #[arg(long = "include")]
    include_patterns: Vec<String>,

    /// Drop URLs matching these patterns (repeatable)
    #[arg(long = "exclude")]
    exclude_patterns: Vec<String>,

    /// Link scorers for best_first, as inline JSON
    #[arg(long, value_parser = parse_json)]
    scorers: Option<Value>,

    /// Keep raw HTML of scanned pages
    #[arg(long, default_value_t = false)]
    include_html: bool,

    /// Seeding source for the map strategy
    #[arg(long, default_value = "sitemap")]
    source: String,

    /// URL pattern for the map strategy
    #[arg(long, default_value = "*")]
    pattern: String,

    /// Relevance query for the map strategy
    #[arg(long)]
    query: Option<String>,

    #[arg(long)]
    score_threshold: Option<f64>,

    /// Fetch strategy for the crawl phase: browser, http or auto
    #[arg(long, default_value = "auto")]
    crawl_strategy: CrawlStrategy,

    #[arg(long, default_value_t = 5)]
    priority: u8,

    #[arg(long, value_parser = parse_json)]
    crawler_config: Option<Value>,

    #[arg(long, value_parser = parse_json)]
    browser_config: Option<Value>,

    #[arg(long, value_parser = parse_json)]
    proxy: Option<Value>,

    #[arg(long, default_value_t = false)]
    bypass_cache: bool,

    #[arg(long)]
    webhook_url: Option<String>,

    /// Follow the scan (and any spawned crawl job) to the end
    #[arg(long, default_value_t = false)]
    wait: bool,

    #[command(flatten)]
    wait_args: WaitArgs,
}

impl DeepArgs {
    fn to_request(&self) -> DeepCrawlRequest {
        DeepCrawlRequest {
            url: self.url.clone(),
            source_job_id: self.source_job.clone(),
            strategy: self.strategy,
            max_depth: self.max_depth,
            max_urls: self.max_urls,
            scan_only: self.scan_only,
            crawl_strategy: self.crawl_strategy,
            priority: self.priority,
            filters: None,
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            scorers: self.scorers.clone(),
            include_html: self.include_html,
            source: self.source.clone(),
            pattern: self.pattern.clone(),
            query: self.query.clone(),
            score_threshold: self.score_threshold,
            crawler_config: self.crawler_config.clone(),
            browser_config: self.browser_config.clone(),
            proxy: self.proxy.clone(),
            bypass_cache: self.bypass_cache,
            webhook_url: self.webhook_url.clone(),
        }
    }
}

#[derive(Args)]
struct SchemaArgs {
    /// HTML sample files (repeatable)
    #[arg(long = "html-file", required_unless_present = "urls", conflicts_with = "urls")]
    html_files: Vec<PathBuf>,

    /// Pages for the service to fetch instead, at most 3 (repeatable)
    #[arg(long = "url")]
    urls: Vec<String>,

    /// What to extract, in plain words
    #[arg(long)]
    query: Option<String>,

    /// Selector language: css or xpath
    #[arg(long, default_value = "css")]
    schema_type: SchemaType,

    /// Example of one extracted item, as inline JSON
    #[arg(long, value_parser = parse_json)]
    target_json: Option<Value>,

    #[arg(long, value_parser = parse_json)]
    llm_config: Option<Value>,
}

impl SchemaArgs {
    fn to_request(&self) -> Result<SchemaRequest> {
        let source = if self.urls.is_empty() {
            let mut samples = Vec::with_capacity(self.html_files.len());
            for file in &self.html_files {
                let html = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                samples.push(html);
            }
            match <[String; 1]>::try_from(samples) {
                Ok([html]) => SchemaSource::Html(html),
                Err(samples) => SchemaSource::HtmlSamples(samples),
            }
        } else {
            SchemaSource::Urls(self.urls.clone())
        };

        Ok(SchemaRequest {
            source,
            query: self.query.clone(),
            schema_type: self.schema_type,
            target_json_example: self.target_json.clone(),
            llm_config: self.llm_config.clone(),
        })
    }
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("c4a=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::new(&cli.api_key)?
        .with_base_url(&cli.base_url)
        .with_timeout(Duration::from_secs(cli.timeout_secs.max(1)))
        .with_max_retries(cli.max_retries);
    let crawler = Crawler::new(config).context("Failed to create client")?;

    match cli.command {
        Commands::Crawl { url, crawl } => {
            let result = crawler.run(&url, &crawl.into_request()).await?;
            print_json(&result)?;
        }
        Commands::Batch { urls, crawl } => {
            let results = crawler.run_batch(&urls, &crawl.into_request()).await?;
            print_json(&results)?;
        }
        Commands::Submit {
            urls,
            crawl,
            wait,
            wait_args,
        } => {
            let request = crawl.into_request();
            if wait {
                let options = wait_args.options()?;
                let job = crawler.jobs().submit(&urls, &request).await?;
                tracing::info!(job_id = %job.id, "Waiting for job (Ctrl-C stops waiting, not the job)");
                if let Some(job) =
                    until_interrupted(crawler.wait_job(&job.id, &options)).await?
                {
                    print_json(&job)?;
                }
            } else {
                let job = crawler.run_many(&urls, &request, None).await?;
                print_json(&job)?;
            }
        }
        Commands::Job(command) => cmd_job(&crawler, command).await?,
        Commands::Deep(args) => cmd_deep(&crawler, args).await?,
        Commands::Scan(command) => cmd_scan(&crawler, command).await?,
        Commands::Context {
            query,
            paa_limit,
            results_per_paa,
        } => {
            let request = ContextRequest::new(query)
                .with_paa_limit(paa_limit)
                .with_results_per_paa(results_per_paa);
            let result = crawler.context(&request).await?;
            print_json(&result)?;
        }
        Commands::Schema(args) => {
            let schema = crawler.generate_schema(&args.to_request()?).await?;
            if !schema.success {
                tracing::warn!(
                    error = schema.error.as_deref().unwrap_or("unknown"),
                    "Schema generation failed"
                );
            }
            print_json(&schema)?;
        }
        Commands::Storage => {
            let storage = crawler.storage().await?;
            print_json(&storage)?;
        }
        Commands::Health => {
            let health = crawler.health().await?;
            print_json(&health)?;
        }
    }

    Ok(())
}

async fn cmd_job(crawler: &Crawler, command: JobCommand) -> Result<()> {
    match command {
        JobCommand::Get { job_id, results } => {
            let job = crawler.get_job(&job_id, results).await?;
            print_json(&job)?;
        }
        JobCommand::Wait { job_id, wait_args } => {
            let options = wait_args.options()?;
            if let Some(job) = until_interrupted(crawler.wait_job(&job_id, &options)).await? {
                print_json(&job)?;
            }
        }
        JobCommand::List {
            status,
            limit,
            offset,
        } => {
            let mut query = ListJobsQuery::new().with_limit(limit).with_offset(offset);
            if let Some(status) = status {
                query = query.with_status(status);
            }
            let jobs = crawler.list_jobs(&query).await?;
            print_json(&jobs)?;
        }
        JobCommand::Cancel { job_id } => {
            crawler.cancel_job(&job_id).await?;
            println!("Cancellation requested for {job_id}");
        }
        JobCommand::Download { job_id, expires_in } => {
            let url = crawler.download_url(&job_id, expires_in).await?;
            println!("{url}");
        }
    }
    Ok(())
}

async fn cmd_deep(crawler: &Crawler, args: DeepArgs) -> Result<()> {
    let request = args.to_request();

    if !args.wait {
        let outcome = crawler.deep_crawl(&request, None).await?;
        print_json(&outcome)?;
        return Ok(());
    }

    let options = args.wait_args.options()?;
    if let Some(outcome) = until_interrupted(crawler.deep_crawl(&request, Some(&options))).await? {
        if let Some(scan) = outcome.as_scan()
            && scan.cache_expires_at.is_some()
        {
            tracing::info!(
                job_id = %scan.job_id,
                expires_at = scan.cache_expires_at.as_deref().unwrap_or_default(),
                "Scan cached; replay it with --source-job"
            );
        }
        print_json(&outcome)?;
    }
    Ok(())
}

async fn cmd_scan(crawler: &Crawler, command: ScanCommand) -> Result<()> {
    match command {
        ScanCommand::Status { job_id } => {
            let scan = crawler.scan_status(&job_id).await?;
            print_json(&scan)?;
        }
        ScanCommand::Wait { job_id, wait_args } => {
            let options = wait_args.options()?;
            if let Some(scan) = until_interrupted(crawler.wait_scan(&job_id, &options)).await? {
                print_json(&scan)?;
            }
        }
        ScanCommand::Cancel { job_id } => {
            let scan = crawler.cancel_scan(&job_id).await?;
            print_json(&scan)?;
        }
    }
    Ok(())
}

/// Drive a polling future until it resolves or Ctrl-C is pressed.
///
/// Interrupting only stops the local poll loop; the server-side job is left alone.
async fn until_interrupted<T>(
    wait: impl Future<Output = Result<T, CloudError>>,
) -> Result<Option<T>> {
    let cancel_token = CancellationToken::new();
    let on_signal = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    tokio::select! {
        result = wait => Ok(Some(result?)),
        () = cancel_token.cancelled() => {
            tracing::warn!("Interrupted; stopped waiting locally, the server-side job keeps running");
            Ok(None)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
