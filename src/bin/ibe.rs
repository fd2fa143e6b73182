use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use firefly_ibe::config::{ConfigLoader, ResolvedConfig, default_user_agent};
use firefly_ibe::download::{FileOrigin, HttpDownloader, RequestContext};
use firefly_ibe::error::IbeError;
use firefly_ibe::ibe::Ibe;
use firefly_ibe::info::InfoMap;
use firefly_ibe::missions::MissionKind;
use firefly_ibe::output::{BatchReport, FetchReport, JsonOutput, LogProgress, UrlReport};
use firefly_ibe::registry::SourceRegistry;
use firefly_ibe::store::{Metadata, Store};
use firefly_ibe::upload::HttpFileUploader;

#[derive(Parser)]
#[command(name = "ibe")]
#[command(about = "Search and fetch images from IRSA IBE mission archives")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print the search, metadata, query and data URLs for a request")]
    Url(SourceArgs),
    #[command(about = "Download the column metadata of a mission table")]
    Metadata(OutArgs),
    #[command(about = "Run a single-position or constraint search")]
    Query(OutArgs),
    #[command(about = "Run one search per row of an uploaded position table")]
    Batch(BatchArgs),
    #[command(about = "Fetch the file a result row points at")]
    Fetch(FetchArgs),
}

#[derive(Args, Clone)]
struct SourceArgs {
    #[arg(long, value_enum)]
    mission: MissionKind,

    /// Request field as key=value; repeatable.
    #[arg(long = "param", short = 'p', value_parser = parse_key_value)]
    params: Vec<(String, String)>,
}

impl SourceArgs {
    fn info(&self) -> InfoMap {
        self.params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[derive(Args, Clone)]
struct OutArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    out: Option<String>,
}

#[derive(Args, Clone)]
struct BatchArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    positions: String,

    #[arg(long)]
    out: Option<String>,
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    dir: Option<String>,

    #[arg(long, value_parser = parse_key_value)]
    cookie: Vec<(String, String)>,
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{value}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{value}`"));
    }
    Ok((key.to_string(), val.to_string()))
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(ibe) = report.downcast_ref::<IbeError>() {
            return ExitCode::from(map_exit_code(ibe));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IbeError) -> u8 {
    match error {
        IbeError::ConfigRead(_)
        | IbeError::ConfigParse(_)
        | IbeError::UnknownMission(_)
        | IbeError::UnknownProduct { .. }
        | IbeError::MissingField(_)
        | IbeError::InvalidField { .. }
        | IbeError::InvalidWorldPt(_)
        | IbeError::InvalidQuery
        | IbeError::MissingFilePath
        | IbeError::UploaderUnavailable => 2,
        IbeError::HttpClient(_)
        | IbeError::Transport { .. }
        | IbeError::Body { .. }
        | IbeError::Status { .. } => 3,
        IbeError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(config.cache_dir.as_deref())?;
    let registry = SourceRegistry::with_defaults(&config);

    match cli.command {
        Commands::Url(args) => run_url(&registry, args),
        Commands::Metadata(args) => run_metadata(&registry, &config, &store, args),
        Commands::Query(args) => run_query(&registry, &config, &store, args),
        Commands::Batch(args) => run_batch(&registry, &config, &store, args),
        Commands::Fetch(args) => run_fetch(&registry, &config, &store, args),
    }
}

fn open(
    registry: &SourceRegistry,
    config: &ResolvedConfig,
    args: &SourceArgs,
) -> miette::Result<(Ibe<HttpDownloader>, InfoMap)> {
    let info = args.info();
    let source = registry.create(args.mission.as_str(), &info)?;
    let downloader = HttpDownloader::new(config)?;
    Ok((Ibe::new(source, downloader), info))
}

fn run_url(registry: &SourceRegistry, args: SourceArgs) -> miette::Result<()> {
    let info = args.info();
    let source = registry.create(args.mission.as_str(), &info)?;
    let report = UrlReport::from_info(source.as_ref(), &info)?;
    JsonOutput::print_urls(&report).into_diagnostic()
}

fn run_metadata(
    registry: &SourceRegistry,
    config: &ResolvedConfig,
    store: &Store,
    args: OutArgs,
) -> miette::Result<()> {
    let (ibe, _) = open(registry, config, &args.source)?;
    let out = args
        .out
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| store.results_path(ibe.source().binding(), "metadata"));
    let file = ibe.get_metadata(&out, &LogProgress)?;
    JsonOutput::print_file(&file).into_diagnostic()
}

fn run_query(
    registry: &SourceRegistry,
    config: &ResolvedConfig,
    store: &Store,
    args: OutArgs,
) -> miette::Result<()> {
    let (ibe, info) = open(registry, config, &args.source)?;
    let param = ibe.source().make_query_param(&info)?;
    let out = args
        .out
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| store.results_path(ibe.source().binding(), "query"));
    let file = ibe.query(&out, &param, &LogProgress)?;
    JsonOutput::print_file(&file).into_diagnostic()
}

fn run_batch(
    registry: &SourceRegistry,
    config: &ResolvedConfig,
    store: &Store,
    args: BatchArgs,
) -> miette::Result<()> {
    let (ibe, info) = open(registry, config, &args.source)?;
    let ibe = ibe.with_uploader(Box::new(HttpFileUploader::new(config)?));
    let param = ibe.source().make_query_param(&info)?;
    let out = args
        .out
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| store.results_path(ibe.source().binding(), "batch"));
    let positions = Utf8PathBuf::from(args.positions);
    let status = ibe.multiple_queries(&out, &positions, &param)?;
    JsonOutput::print_batch(&BatchReport {
        results: out.to_string(),
        status,
    })
    .into_diagnostic()
}

fn run_fetch(
    registry: &SourceRegistry,
    config: &ResolvedConfig,
    store: &Store,
    args: FetchArgs,
) -> miette::Result<()> {
    let (ibe, info) = open(registry, config, &args.source)?;
    let source = ibe.source();
    let param = source.make_data_param(&info)?;
    let dir = args
        .dir
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| store.data_dir(source.binding()));
    let request = args
        .cookie
        .iter()
        .fold(RequestContext::new(), |request, (name, value)| {
            request.with_cookie(name, value)
        });

    let file = ibe.get_data(&param, &request, &dir, &LogProgress)?;

    let metadata_path = match file.origin {
        FileOrigin::Local => None,
        FileOrigin::Downloaded => {
            let binding = source.binding();
            let metadata = Metadata {
                mission: binding.mission.clone(),
                dataset: binding.dataset.clone(),
                table: binding.table_name.clone(),
                url: Some(source.data_url(&param)?),
                origin: "downloaded".to_string(),
                response_code: file.response_code,
                fetched_at: Utc::now().to_rfc3339(),
                tool: default_user_agent(),
            };
            Some(Store::write_metadata(&file.path, &metadata)?.to_string())
        }
    };

    JsonOutput::print_fetch(&FetchReport {
        file,
        metadata_path,
    })
    .into_diagnostic()
}
