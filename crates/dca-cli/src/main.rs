use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use crossbeam_channel::Receiver;
use dca_cases::writer::CsvWriter;
use dca_cases::{
    merge_csv, CaseScraper, CaseSession, CsvSinkConfig, CsvWriterConfig, FilterCatalog,
    FilterKind,
};
use dca_crawler::{
    parse_date, CrawlEvent, CrawlerConfig, HttpRendererConfig, LogLevel, OnError, RunState,
    RunSummary, Scrapable, SessionError, SinkReport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime;

const DEFAULT_LOG_FILTER: &str = "dca_crawler=warn,dca_crawler::events=off,dca_cases=warn";

/// Disinformation Case Archive crawler
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "crawl")]
    Crawl(CrawlArgs),
    #[command(name = "scrap")]
    Scrap(ScrapArgs),
    #[command(name = "filters")]
    Filters(FiltersArgs),
    #[command(name = "merge")]
    Merge(MergeArgs),
    #[command(hide = true)]
    Completion,
}

/// Crawl the case archive and save the cases to a CSV file
///
/// While running, type `pause`, `resume` or `kill` (or `p`, `r`, `k`)
/// followed by enter. Ctrl-C kills the crawl too.
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Stop after this many extracted cases
    #[arg(long, short = 'n')]
    pub max_items: Option<usize>,
    /// Earliest publication date (dd.mm.yyyy)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Latest publication date (dd.mm.yyyy)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Country or region discussed, by label (repeatable)
    #[arg(long)]
    pub country: Vec<String>,
    /// Article language, by label (repeatable)
    #[arg(long)]
    pub language: Vec<String>,
    /// Tag, by label (repeatable)
    #[arg(long)]
    pub tag: Vec<String>,
    /// Directory holding the filter code JSON files
    #[arg(long, default_value = "filter_codes")]
    pub filter_dir: PathBuf,
    /// Directory where the CSV file is written
    #[arg(long, short, default_value = ".")]
    pub output_dir: PathBuf,
    /// Don't start the CSV file with a byte order mark
    #[arg(long)]
    pub no_bom: bool,
    /// Optional default crawler yaml configuration file
    #[arg(env = "DCA_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override the archive's listing URL
    #[arg(long)]
    pub base_url: Option<String>,
    /// Override how long a listing page may take to show its items
    #[arg(long)]
    pub listing_timeout_ms: Option<u64>,
    /// Override how many listing pages in a row may time out
    #[arg(long)]
    pub max_page_skips: Option<usize>,
    /// Override the case extraction error handling strategy
    #[arg(value_enum, long)]
    pub on_item_error: Option<OnError>,
    /// Override the listing page timeout handling strategy
    #[arg(value_enum, long)]
    pub on_page_timeout: Option<OnError>,
    /// User agent used to download pages
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Per request timeout
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,
    /// Only print warnings, errors and the final report
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(base_url) = &args.base_url {
            conf.listing.base_url = base_url.to_string();
        }
        if let Some(listing_timeout_ms) = args.listing_timeout_ms {
            conf.listing_timeout_ms = listing_timeout_ms;
        }
        if let Some(max_page_skips) = args.max_page_skips {
            conf.max_page_skips = max_page_skips;
        }
        if let Some(on_item_error) = args.on_item_error {
            conf.on_item_error = on_item_error;
        }
        if let Some(on_page_timeout) = args.on_page_timeout {
            conf.on_page_timeout = on_page_timeout;
        }
        Ok(conf)
    }
}

impl From<&CrawlArgs> for HttpRendererConfig {
    fn from(args: &CrawlArgs) -> Self {
        let mut conf = HttpRendererConfig::default();
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(request_timeout_ms) = args.request_timeout_ms {
            conf.request_timeout_ms = request_timeout_ms;
        }
        conf
    }
}

impl From<&CrawlArgs> for CsvSinkConfig {
    fn from(args: &CrawlArgs) -> Self {
        CsvSinkConfig {
            output_dir: args.output_dir.clone(),
            bom: !args.no_bom,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Kill,
}

fn parse_control(line: &str) -> Option<Control> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" => Some(Control::Pause),
        "r" | "resume" => Some(Control::Resume),
        "k" | "kill" | "q" | "quit" => Some(Control::Kill),
        _ => None,
    }
}

fn print_event(event: &CrawlEvent, quiet: bool) {
    match event {
        CrawlEvent::Log { level, message } => {
            if !quiet || *level != LogLevel::Info {
                println!("{level}: {message}");
            }
        }
        CrawlEvent::Progress { current, total } if !quiet => match total {
            Some(total) => println!("[{current}/{total}]"),
            None => println!("[{current}]"),
        },
        _ => (),
    }
}

fn print_events(events: &Receiver<CrawlEvent>, quiet: bool) {
    for event in events.try_iter() {
        print_event(&event, quiet);
    }
}

fn cancel(session: &mut CaseSession) -> anyhow::Result<Option<RunSummary>> {
    match session.cancel() {
        Ok(summary) => Ok(summary),
        Err(SessionError::NotRunning) => Ok(session.wait()),
        Err(e) => Err(e.into()),
    }
}

/// Relays terminal commands to the session until the run is over.
async fn drive(
    session: &mut CaseSession,
    events: &Receiver<CrawlEvent>,
    quiet: bool,
) -> anyhow::Result<Option<RunSummary>> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut tick = tokio::time::interval(Duration::from_millis(100));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let summary = loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                break cancel(session)?;
            }
            line = stdin.next_line(), if stdin_open => match line? {
                None => stdin_open = false,
                Some(line) if line.trim().is_empty() => (),
                Some(line) => match parse_control(&line) {
                    Some(Control::Pause) => match session.pause() {
                        Ok(true) => (),
                        Ok(false) => println!("Scraper is already paused."),
                        Err(e) => println!("{e}"),
                    },
                    Some(Control::Resume) => match session.resume() {
                        Ok(true) => (),
                        Ok(false) => println!("Scraper is not paused."),
                        Err(e) => println!("{e}"),
                    },
                    Some(Control::Kill) => break cancel(session)?,
                    None => println!("Unknown command {line:?}, expected pause, resume or kill"),
                },
            },
            _ = tick.tick() => {
                print_events(events, quiet);
                if !session.is_active() {
                    break session.wait();
                }
            }
        }
    };

    print_events(events, quiet);
    Ok(summary)
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let crawler_conf = (&args).try_into()?;
    let renderer_conf = HttpRendererConfig::from(&args);
    let sink_conf = CsvSinkConfig::from(&args);

    let catalog = FilterCatalog::load(&args.filter_dir);
    let filters = catalog.selection(&args.country, &args.language, &args.tag);

    let (mut session, events) = <CaseSession>::new(crawler_conf, (), renderer_conf, sink_conf);
    session.set_max_items(args.max_items);
    session.set_date_range(args.from, args.to);
    session.set_filters(filters.countries, filters.languages, filters.tags);
    session.start()?;

    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    let summary = rt.block_on(drive(&mut session, &events, args.quiet));
    // stdin is read on a blocking thread that would otherwise hold the runtime
    rt.shutdown_background();

    let summary = match summary? {
        Some(summary) => summary,
        None => anyhow::bail!("The crawl worker didn't report back in time"),
    };
    report(&summary)
}

fn report(summary: &RunSummary) -> anyhow::Result<()> {
    println!(
        "{}: {} cases extracted, {} visited, {} listing pages.",
        summary.termination,
        summary.items_extracted,
        summary.items_visited,
        summary.pages_visited
    );
    if let Ok(SinkReport::Written { path, .. }) = &summary.sink {
        println!("Output: {}", path.display());
    }
    match (summary.state(), &summary.sink) {
        (RunState::Failed, _) => anyhow::bail!("Crawl failed: {}", summary.termination),
        (_, Err(e)) => anyhow::bail!("Couldn't save the cases: {e}"),
        _ => Ok(()),
    }
}

/// Scrap a single case page and print it as CSV to stdout
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// A local html page to scrap
    #[arg(group = "page", long)]
    pub file: Option<PathBuf>,
    /// A distant html page to scrap
    #[arg(group = "page", long)]
    pub url: Option<String>,
    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let (page, location) = if let Some(url) = args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(ua) = args.ua {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        let page = client.get(&url).send()?.error_for_status()?.text()?;
        (page, url)
    } else if let Some(path) = args.file {
        let page = fs::read_to_string(&path)?;
        (page, path.display().to_string())
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    let record = CaseScraper::new(&())?.scrap(&page, &location)?;
    let mut wtr = CsvWriter::stdout(&CsvWriterConfig::default());
    wtr.serialize(&record)?;
    wtr.flush()?;
    Ok(())
}

/// List the labels accepted by a filter flag
#[derive(Debug, clap::Args)]
pub struct FiltersArgs {
    /// countries, languages or tags
    pub kind: FilterKind,
    /// Directory holding the filter code JSON files
    #[arg(long, default_value = "filter_codes")]
    pub filter_dir: PathBuf,
    /// Print the query code next to each label
    #[arg(long)]
    pub codes: bool,
}

pub fn filters(args: FiltersArgs) -> anyhow::Result<()> {
    let catalog = FilterCatalog::load(&args.filter_dir);
    let table = match catalog.table(args.kind) {
        Some(table) => table,
        None => anyhow::bail!(
            "No {} filters available in {}",
            args.kind,
            args.filter_dir.display()
        ),
    };
    for label in table.labels() {
        match table.code(label) {
            Some(code) if args.codes => println!("{label}\t{code}"),
            _ => println!("{label}"),
        }
    }
    Ok(())
}

/// Merge CSV files of earlier crawls, dropping duplicate rows
#[derive(Debug, clap::Args)]
pub struct MergeArgs {
    /// CSV files written by `dca crawl`
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Directory where the merged file is written
    #[arg(long, short, default_value = ".")]
    pub output_dir: PathBuf,
    /// Merged file name prefix
    #[arg(long, default_value = "euvsdisinfo_merged")]
    pub prefix: String,
}

pub fn merge(args: MergeArgs) -> anyhow::Result<()> {
    let config = CsvSinkConfig {
        output_dir: args.output_dir,
        file_prefix: args.prefix,
        ..Default::default()
    };
    match merge_csv(&args.inputs, &config)? {
        SinkReport::Written {
            path,
            rows,
            duplicates,
        } => println!(
            "Data saved to: {} ({rows} rows, {duplicates} duplicates removed)",
            path.display()
        ),
        SinkReport::Empty => println!("No data found. CSV file will not be created"),
    }
    Ok(())
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                init_logger();
            }
            crawl(args)
        }
        SubCommand::Scrap(args) => {
            init_logger();
            scrap(args)
        }
        SubCommand::Filters(args) => {
            init_logger();
            filters(args)
        }
        SubCommand::Merge(args) => {
            init_logger();
            merge(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "dca", &mut io::stdout());
            Ok(())
        }
    }
}
