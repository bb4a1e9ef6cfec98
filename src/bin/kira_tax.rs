use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_taxonomy::app::{
    AnnotateOptions, App, DistanceRequest, FetchOptions, ProgressSink, TaxidSource,
};
use kira_taxonomy::config::ConfigLoader;
use kira_taxonomy::domain::{InputKind, ScorePolicy, UniprotId};
use kira_taxonomy::error::KiraError;
use kira_taxonomy::ncbi::{DownloadInfo, NcbiClient, NcbiHttpClient};
use kira_taxonomy::output::{HumanOutput, JsonOutput, LogSink, OutputMode};
use kira_taxonomy::store::Store;
use kira_taxonomy::uniprot::{UniprotClient, UniprotEntry, UniprotHttpClient};

#[derive(Parser)]
#[command(name = "kira-tax")]
#[command(about = "Taxonomic lineages and phylogenetic distances from NCBI taxonomy dumps")]
#[command(version, author)]
struct Cli {
    /// Print JSON instead of a human readable summary.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file (defaults to ./kira-tax.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download the NCBI taxonomy dump into the cache")]
    Fetch(FetchArgs),
    #[command(about = "Print root-to-leaf lineages")]
    Lineage(BatchArgs),
    #[command(about = "Print the domain of life of each organism")]
    Domain(BatchArgs),
    #[command(about = "Phylogenetic distances within a batch")]
    Distance(DistanceArgs),
    #[command(about = "Annotate UniProt accessions with taxonomy and growth properties")]
    Annotate(AnnotateArgs),
    #[command(about = "List the UniProt accessions of each taxid from the id-mapping file")]
    Accessions(AccessionsArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Clone)]
struct BatchArgs {
    /// Taxonomic ids, or organism names with `--organism`.
    ids: Vec<String>,

    #[arg(long)]
    organism: bool,
}

#[derive(Args)]
struct DistanceArgs {
    #[command(subcommand)]
    query: DistanceQuery,

    #[arg(long, global = true, value_enum)]
    policy: Option<ScorePolicy>,
}

#[derive(Subcommand)]
enum DistanceQuery {
    #[command(about = "Distance between two organisms")]
    Pair {
        first: String,
        second: String,
        #[command(flatten)]
        batch: BatchArgs,
    },
    #[command(about = "Distances between every pair")]
    All(BatchArgs),
    #[command(about = "Closest pairs of the batch")]
    Min(BatchArgs),
    #[command(about = "Most distant pairs of the batch")]
    Max(BatchArgs),
    #[command(about = "Organisms closest to a target")]
    Closest {
        target: String,
        #[command(flatten)]
        batch: BatchArgs,
    },
    #[command(about = "Organisms farthest from a target")]
    Farthest {
        target: String,
        #[command(flatten)]
        batch: BatchArgs,
    },
}

#[derive(Args)]
struct AnnotateArgs {
    #[arg(required = true)]
    uids: Vec<String>,

    /// Resolve taxids through the UniProt REST service instead of the
    /// configured id-mapping file.
    #[arg(long)]
    remote: bool,

    #[arg(long)]
    output: Option<String>,

    /// Save under `.kira-tax/annotations/<name>.tsv`.
    #[arg(long, conflicts_with = "output")]
    name: Option<String>,
}

#[derive(Args)]
struct AccessionsArgs {
    #[arg(required = true)]
    taxids: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::MissingTaxonomyFile(_)
        | KiraError::ConfigRead(_)
        | KiraError::UnknownIdentifier(_) => 2,
        KiraError::NcbiHttp(_)
        | KiraError::NcbiStatus { .. }
        | KiraError::UniprotHttp(_)
        | KiraError::UniprotStatus { .. }
        | KiraError::IncompleteTaxdump(_) => 3,
        KiraError::UnscoredRank(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &LogSink,
    };

    let store = Store::new()?;
    let config = ConfigLoader::resolve(cli.config.as_deref(), &store)?;

    match cli.command {
        Commands::Fetch(args) => {
            let app = App::new(store, config, NcbiHttpClient::new()?, NopUniprot);
            let result = app.fetch_taxonomy(
                FetchOptions {
                    force: args.force,
                    dry_run: args.dry_run,
                },
                sink,
            )?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_fetch(&result),
                OutputMode::Interactive => HumanOutput::print_fetch(&mut io::stdout(), &result),
            };
            printed.into_diagnostic()
        }
        Commands::Lineage(batch) => {
            let app = App::new(store, config, NopNcbi, NopUniprot);
            let result = app.lineages(input_kind(&batch), batch.ids.as_slice(), sink)?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_lineages(&result),
                OutputMode::Interactive => HumanOutput::print_lineages(&mut io::stdout(), &result),
            };
            printed.into_diagnostic()
        }
        Commands::Domain(batch) => {
            let app = App::new(store, config, NopNcbi, NopUniprot);
            let result = app.domains(input_kind(&batch), batch.ids.as_slice(), sink)?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_domains(&result),
                OutputMode::Interactive => HumanOutput::print_domains(&mut io::stdout(), &result),
            };
            printed.into_diagnostic()
        }
        Commands::Distance(args) => {
            let (batch, request) = distance_request(args.query);
            let app = App::new(store, config, NopNcbi, NopUniprot);
            let report = app.distance(
                input_kind(&batch),
                batch.ids.as_slice(),
                &request,
                args.policy,
                sink,
            )?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_distance(&report),
                OutputMode::Interactive => HumanOutput::print_distance(&mut io::stdout(), &report),
            };
            printed.into_diagnostic()
        }
        Commands::Annotate(args) => {
            let output = match (args.output, args.name) {
                (Some(path), _) => Some(Utf8PathBuf::from(path)),
                (None, Some(name)) => Some(store.project_annotation_path(&name)),
                (None, None) => None,
            };
            let source = if args.remote {
                TaxidSource::Remote
            } else {
                TaxidSource::Local
            };
            let app = App::new(store, config, NopNcbi, UniprotHttpClient::new()?);
            let options = AnnotateOptions { source, output };
            let result = app.annotate(args.uids.as_slice(), options, sink)?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_annotation(&result),
                OutputMode::Interactive => {
                    HumanOutput::print_annotation(&mut io::stdout(), &result)
                }
            };
            printed.into_diagnostic()
        }
        Commands::Accessions(args) => {
            let app = App::new(store, config, NopNcbi, NopUniprot);
            let result = app.accessions(args.taxids.as_slice())?;
            let printed = match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_accessions(&result),
                OutputMode::Interactive => {
                    HumanOutput::print_accessions(&mut io::stdout(), &result)
                }
            };
            printed.into_diagnostic()
        }
    }
}

fn input_kind(batch: &BatchArgs) -> InputKind {
    if batch.organism {
        InputKind::Organism
    } else {
        InputKind::TaxId
    }
}

fn distance_request(query: DistanceQuery) -> (BatchArgs, DistanceRequest) {
    match query {
        DistanceQuery::Pair {
            first,
            second,
            batch,
        } => (batch, DistanceRequest::Pair(first, second)),
        DistanceQuery::All(batch) => (batch, DistanceRequest::All),
        DistanceQuery::Min(batch) => (batch, DistanceRequest::Min),
        DistanceQuery::Max(batch) => (batch, DistanceRequest::Max),
        DistanceQuery::Closest { target, batch } => (batch, DistanceRequest::Closest(target)),
        DistanceQuery::Farthest { target, batch } => (batch, DistanceRequest::Farthest(target)),
    }
}

#[derive(Clone, Copy)]
struct NopNcbi;
struct NopUniprot;

impl NcbiClient for NopNcbi {
    fn download_taxdump(&self, _destination: &Path) -> Result<DownloadInfo, KiraError> {
        Err(KiraError::NcbiHttp("NCBI client not configured".to_string()))
    }
}

impl UniprotClient for NopUniprot {
    fn fetch_entries(
        &self,
        _ids: &[UniprotId],
    ) -> Result<BTreeMap<UniprotId, UniprotEntry>, KiraError> {
        Err(KiraError::UniprotHttp(
            "UniProt client not configured".to_string(),
        ))
    }
}
