// src/main.rs
use clap::{Args, Parser, Subcommand, ValueEnum};
use selector_scraper::batch::{BatchOptions, BatchOrchestrator, LocalPipeline, PageScraper, RemotePipeline};
use selector_scraper::capture::{PointerEvent, PointerKind};
use selector_scraper::config::ScraperConfig;
use selector_scraper::export::{export_as, ExportFormat};
use selector_scraper::extractors::{ExtractOptions, ExtractionEngine, ListScope, RemoteExtractor};
use selector_scraper::loader::ContentLoader;
use selector_scraper::model::{ScrapeResult, Selector};
use selector_scraper::session::Workspace;
use selector_scraper::storage::{FileStore, SelectorGroupRepository};
use selector_scraper::utils::error::ExportError;
use selector_scraper::utils::{self, AppError};
use std::path::{Path, PathBuf};

/// Point-and-click style selector scraper for the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug-level logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Primary proxy endpoint (overrides SCRAPER_PROXY_URL)
    #[arg(long, global = true)]
    proxy_url: Option<String>,

    /// Fallback relay endpoint (overrides SCRAPER_RELAY_URL)
    #[arg(long, global = true)]
    relay_url: Option<String>,

    /// Directory holding saved selector groups (overrides SCRAPER_STORE_DIR)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Per-request timeout in milliseconds (overrides SCRAPER_TIMEOUT_MS)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Ask the proxy not to render JavaScript
    #[arg(long, global = true)]
    no_javascript: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract records from one or more URLs and write an export file
    Scrape(ScrapeArgs),
    /// Load a page, simulate clicks on elements and print the synthesized selectors
    Inspect(InspectArgs),
    /// Manage saved selector groups
    #[command(subcommand)]
    Groups(GroupsCommand),
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// URLs to scrape, in order
    urls: Vec<String>,

    /// File with one URL per line (blank lines and # comments ignored)
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Selector as `[name=]css[@type[:attribute]]`, repeatable
    #[arg(short, long = "select")]
    selectors: Vec<String>,

    /// Saved selector group (id or name) to add to the selector set
    #[arg(short, long)]
    group: Option<String>,

    /// Export format: json, csv, sql, vector-ready
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Table name for SQL exports
    #[arg(long)]
    table: Option<String>,

    /// Output directory for the export file
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Pause between requests in milliseconds (overrides SCRAPER_DELAY_MS)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Follow "next page" links found on each page
    #[arg(long)]
    follow_pagination: bool,

    /// Stop after this many pages, pagination included (0 = no limit)
    #[arg(long, default_value = "0")]
    max_pages: usize,

    /// Where list-type selectors are evaluated on list pages
    #[arg(long, value_enum, default_value = "container")]
    list_scope: ListScopeArg,

    /// Delegate extraction to a remote endpoint (falls back to SCRAPER_REMOTE_URL)
    #[arg(long)]
    remote: bool,

    /// Remote extraction endpoint
    #[arg(long)]
    remote_url: Option<String>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Page to load
    url: String,

    /// CSS selector of an element to click in selection mode, repeatable
    #[arg(short, long = "click")]
    clicks: Vec<String>,

    /// Also run the captured selectors and print the records
    #[arg(long)]
    extract: bool,

    /// Save the captured selectors as a group with this name
    #[arg(long)]
    save_group: Option<String>,

    /// Description for the saved group
    #[arg(long)]
    description: Option<String>,
}

#[derive(Subcommand, Debug)]
enum GroupsCommand {
    /// List saved groups
    List,
    /// Print a group as JSON
    Show { id: String },
    /// Delete a group by id
    Delete { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListScopeArg {
    Container,
    Document,
}

impl From<ListScopeArg> for ListScope {
    fn from(arg: ListScopeArg) -> Self {
        match arg {
            ListScopeArg::Container => ListScope::Container,
            ListScopeArg::Document => ListScope::Document,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments
    let cli = Cli::parse();

    // 2. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging(cli.verbose);
    tracing::debug!("Starting with args: {:?}", cli);

    // 3. Resolve configuration: defaults, environment, then flags
    let config = resolve_config(&cli)?;

    let store = FileStore::new(&config.store_dir).await?;
    let groups = SelectorGroupRepository::new(store);

    match cli.command {
        Command::Scrape(args) => scrape(&config, &groups, args).await,
        Command::Inspect(args) => inspect(&config, &groups, args).await,
        Command::Groups(command) => manage_groups(&groups, command).await,
    }
}

fn resolve_config(cli: &Cli) -> Result<ScraperConfig, AppError> {
    let mut config = ScraperConfig::from_env()?;
    if let Some(proxy) = &cli.proxy_url {
        config.proxy_url = proxy.clone();
    }
    if let Some(relay) = &cli.relay_url {
        config.relay_url = relay.clone();
    }
    if let Some(dir) = &cli.store_dir {
        config.store_dir = dir.clone();
    }
    if let Some(timeout) = cli.timeout_ms {
        config.timeout_ms = timeout;
    }
    if cli.no_javascript {
        config.javascript = false;
    }
    Ok(config)
}

async fn scrape(config: &ScraperConfig, groups: &SelectorGroupRepository, args: ScrapeArgs) -> Result<(), AppError> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        urls.extend(read_url_file(path).await?);
    }

    let mut selectors = args
        .selectors
        .iter()
        .map(|s| s.parse::<Selector>())
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(id_or_name) = &args.group {
        let group = groups.find(id_or_name).await?;
        tracing::info!("Using selector group '{}' ({} selectors)", group.name, group.selectors.len());
        selectors.extend(group.selectors);
    }

    let mut format: ExportFormat = args.format.parse()?;
    if let (ExportFormat::SqlInsert { table }, Some(name)) = (&mut format, &args.table) {
        *table = name.clone();
    }

    let options = BatchOptions {
        inter_request_delay_ms: args.delay_ms.unwrap_or(config.delay_ms),
        max_pages: args.max_pages,
        follow_pagination: args.follow_pagination,
    };

    let results = if args.remote {
        let endpoint = args
            .remote_url
            .clone()
            .or_else(|| config.remote_url.clone())
            .ok_or_else(|| AppError::Config("--remote needs --remote-url or SCRAPER_REMOTE_URL".to_string()))?;
        let pipeline = RemotePipeline::new(RemoteExtractor::new(&endpoint)?, config.load_options());
        run_batch(BatchOrchestrator::new(pipeline), &urls, &selectors, &options).await?
    } else {
        let loader = ContentLoader::new(&config.proxy_url, &config.relay_url)?;
        let engine = ExtractionEngine::with_options(ExtractOptions {
            list_scope: args.list_scope.into(),
        });
        let pipeline = LocalPipeline::new(loader, engine, config.load_options());
        run_batch(BatchOrchestrator::new(pipeline), &urls, &selectors, &options).await?
    };

    let failures = results.iter().filter(|r| r.is_error()).count();
    let records: usize = results.iter().map(|r| r.records.len()).sum();
    tracing::info!(
        "Processing finished. Pages: {}, Records: {}, Failures: {}",
        results.len(),
        records,
        failures
    );

    let output = export_as(&results, &format)?;
    tokio::fs::create_dir_all(&args.output_dir).await?;
    let path = args.output_dir.join(&output.file_name);
    tokio::fs::write(&path, &output.content).await?;
    tracing::info!("Saved {} export to: {}", format, path.display());
    println!("{}", path.display());
    Ok(())
}

/// Runs the batch, logging progress and stopping cleanly on Ctrl-C.
async fn run_batch<P: PageScraper>(
    orchestrator: BatchOrchestrator<P>,
    urls: &[String],
    selectors: &[Selector],
    options: &BatchOptions,
) -> Result<Vec<ScrapeResult>, AppError> {
    let mut progress = orchestrator.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let job = progress.borrow_and_update().clone();
            tracing::info!(
                "Batch {:?}: {}% ({}/{})",
                job.status,
                job.progress_percent,
                job.current_index,
                job.urls.len()
            );
        }
    });

    let stop = orchestrator.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current page");
            stop.request_stop();
        }
    });

    let results = orchestrator.run(urls, selectors, options).await;
    interrupt.abort();
    drop(orchestrator);
    let _ = reporter.await;
    Ok(results?)
}

async fn read_url_file(path: &Path) -> Result<Vec<String>, AppError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

async fn inspect(config: &ScraperConfig, groups: &SelectorGroupRepository, args: InspectArgs) -> Result<(), AppError> {
    let loader = ContentLoader::new(&config.proxy_url, &config.relay_url)?;
    let (mut workspace, _events) = Workspace::new(loader, ExtractionEngine::new());

    workspace.load_url(&args.url, &config.load_options()).await?;
    workspace.set_selection_mode(true);
    tracing::info!("Loaded {} ({} bytes)", args.url, workspace.document().markup().len());

    for css in &args.clicks {
        let Some(target) = workspace.locate(css)?.into_iter().next() else {
            tracing::warn!("No element matches '{}', skipping", css);
            continue;
        };
        let generation = workspace.document().generation();
        workspace.dispatch(PointerEvent {
            kind: PointerKind::Over,
            target,
            generation,
        })?;
        match workspace.capture_selection(PointerEvent {
            kind: PointerKind::Click,
            target,
            generation,
        })? {
            Some(selector) => println!(
                "{}\t{}\t{}",
                selector.field_name, selector.css_selector, selector.extraction_type
            ),
            None => tracing::warn!("Click on '{}' produced no selector", css),
        }
    }

    if args.extract {
        let records = workspace.extract();
        println!("{}", serde_json::to_string_pretty(&records).map_err(ExportError::from)?);
    }

    if let Some(name) = &args.save_group {
        if workspace.active_selectors().is_empty() {
            return Err(AppError::Config("No selectors captured, nothing to save".to_string()));
        }
        let mut group = workspace.to_group(name);
        if let Some(description) = &args.description {
            group = group.with_description(description);
        }
        groups.save(&group).await?;
        println!("Saved group {} ({})", group.name, group.id);
    }
    Ok(())
}

async fn manage_groups(groups: &SelectorGroupRepository, command: GroupsCommand) -> Result<(), AppError> {
    match command {
        GroupsCommand::List => {
            for group in groups.list().await? {
                println!(
                    "{}\t{}\t{} selectors\t{}",
                    group.id,
                    group.name,
                    group.selectors.len(),
                    group.description.as_deref().unwrap_or("")
                );
            }
        }
        GroupsCommand::Show { id } => {
            let group = groups.find(&id).await?;
            let json = serde_json::to_string_pretty(&group)
                .map_err(ExportError::from)?;
            println!("{}", json);
        }
        GroupsCommand::Delete { id } => {
            groups.delete(&id).await?;
            println!("Deleted group {}", id);
        }
    }
    Ok(())
}
