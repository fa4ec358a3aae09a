use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wikisync_core::action::ActionClient;
use wikisync_core::config::{ClientSettings, load_config};
use wikisync_core::dataset::{load_dataset, save_dataset};
use wikisync_core::rest::RestPageClient;
use wikisync_core::sync::{EntityReport, SyncOptions, SyncReport, link_entities, sync_pages};
use wikisync_core::transport::JsonTransport;
use wikisync_core::validate::validate_file;

const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Parser)]
#[command(
    name = "wikisync",
    version,
    about = "Sync an organization sheet with wiki pages and structured-data items"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", default_value = "sheet.tsv")]
    dataset: PathBuf,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file [default: config.json next to the dataset]"
    )]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print the run report as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create missing pages and record their page references")]
    Pages(PagesArgs),
    #[command(about = "Re-check pages and attach structured-data items")]
    Entities,
    #[command(about = "Report duplicated organization names")]
    Validate,
}

#[derive(Debug, Args)]
struct PagesArgs {
    #[arg(long, help = "Look up pages again for records that already have a page reference")]
    recheck: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Pages(args) => run_pages(&cli, args.recheck),
        Commands::Entities => run_entities(&cli),
        Commands::Validate => run_validate(&cli.dataset),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.dataset.with_file_name(DEFAULT_CONFIG_FILE))
    }
}

fn resolve_settings(cli: &Cli) -> Result<ClientSettings> {
    let config = load_config(&cli.config_path())?;
    Ok(config.resolve())
}

fn sync_options(settings: &ClientSettings, recheck: bool) -> SyncOptions {
    SyncOptions {
        recheck,
        wiki_url: settings.wiki_url.clone(),
        site_id: settings.site_id.clone(),
    }
}

fn run_pages(cli: &Cli, recheck: bool) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let mut client =
        RestPageClient::from_settings(&settings).context("failed to set up REST client")?;

    let mut dataset = load_dataset(&cli.dataset)?;
    info!(records = dataset.len(), recheck = recheck, "starting page sync");
    let report = sync_pages(&mut dataset, &mut client, &sync_options(&settings, recheck));
    save_dataset(&cli.dataset, &dataset)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_page_report(&cli.dataset, &report, client.transport().request_count());
    }
    Ok(())
}

fn run_entities(cli: &Cli) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let mut pages =
        RestPageClient::from_settings(&settings).context("failed to set up REST client")?;
    let mut entities =
        ActionClient::from_settings(&settings).context("failed to set up action API client")?;

    let mut dataset = load_dataset(&cli.dataset)?;
    info!(records = dataset.len(), "starting entity sync");
    let report = link_entities(
        &mut dataset,
        &mut pages,
        &mut entities,
        &sync_options(&settings, true),
    );
    save_dataset(&cli.dataset, &dataset)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let request_count =
            pages.transport().request_count() + entities.transport().request_count();
        print_entity_report(&cli.dataset, &report, request_count);
    }
    Ok(())
}

fn run_validate(dataset: &Path) -> Result<()> {
    let duplicates = validate_file(dataset)?;
    for duplicate in &duplicates {
        warn!(name = %duplicate.name, count = duplicate.count, "{}", duplicate.message());
    }
    println!("validate");
    println!("dataset: {}", normalize_path(dataset));
    println!("duplicates: {}", duplicates.len());
    for duplicate in &duplicates {
        println!("  - {}", duplicate.message());
    }
    Ok(())
}

fn print_page_report(dataset: &Path, report: &SyncReport, request_count: usize) {
    println!("pages sync");
    println!("dataset: {}", normalize_path(dataset));
    println!("resolved: {}", report.resolved);
    println!("created: {}", report.created);
    println!("skipped: {}", format_names(&report.skipped));
    println!("errored: {}", format_names(&report.errored));
    println!("request_count: {request_count}");
}

fn print_entity_report(dataset: &Path, report: &EntityReport, request_count: usize) {
    println!("entities sync");
    println!("dataset: {}", normalize_path(dataset));
    println!("pages_created: {}", report.pages_created);
    println!("entities_created: {}", report.entities_created);
    println!("already_linked: {}", report.already_linked);
    println!("skipped: {}", format_names(&report.skipped));
    println!("errored: {}", format_names(&report.errored));
    println!("request_count: {request_count}");
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "<none>".to_string()
    } else {
        names.join(",")
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
