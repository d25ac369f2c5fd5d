use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulse_core::{
    FilteredSource, JsonlSource, KeywordFilter, MemoryStore, Pipeline, PipelineConfig, PipelineError, RecordStore,
    SledStore,
};
use pulse_server::{build_app, AppState};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Stream social posts through normalization, sentiment and trending terms", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline until the feed ends or Ctrl-C
    Run {
        /// Input path (file or directory of .json/.jsonl); stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        /// JSON config file; absent fields keep their defaults
        #[arg(long)]
        config: Option<PathBuf>,
        /// Store directory
        #[arg(long, default_value = "./pulse-store", conflicts_with = "in_memory")]
        store: PathBuf,
        /// Keep records in memory only
        #[arg(long, default_value_t = false)]
        in_memory: bool,
        /// Number of trending terms to print at the end
        #[arg(long)]
        top_k: Option<usize>,
        /// Serve the query API on this address while running
        #[arg(long)]
        serve: Option<SocketAddr>,
        /// Only keep records mentioning one of these keywords or hashtags
        keywords: Vec<String>,
    },
    /// Summarize a store directory
    Stats {
        #[arg(long, default_value = "./pulse-store")]
        store: PathBuf,
    },
}

fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            return ExitCode::from(1);
        }
    };

    let outcome = match cli.command {
        Commands::Run { input, config, store, in_memory, top_k, serve, keywords } => {
            runtime.block_on(run(RunArgs { input, config, store, in_memory, top_k, serve, keywords }))
        }
        Commands::Stats { store } => stats(&store).map_err(Failure::Other),
    };
    // tokio's stdin parks a read on the blocking pool that never returns without input
    runtime.shutdown_timeout(Duration::from_secs(1));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("error: {failure:#}");
            ExitCode::from(failure.exit_code())
        }
    }
}

struct RunArgs {
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    store: PathBuf,
    in_memory: bool,
    top_k: Option<usize>,
    serve: Option<SocketAddr>,
    keywords: Vec<String>,
}

#[derive(Debug)]
enum Failure {
    Pipeline(PipelineError),
    Other(anyhow::Error),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Pipeline(err) => err.exit_code(),
            Failure::Other(_) => 1,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Pipeline(err) => write!(f, "{err}"),
            Failure::Other(err) => write!(f, "{err:#}"),
        }
    }
}

impl From<PipelineError> for Failure {
    fn from(err: PipelineError) -> Self {
        Failure::Pipeline(err)
    }
}

fn load_config(path: Option<&Path>, top_k: Option<usize>) -> Result<PipelineConfig, PipelineError> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(k) = top_k {
        config.top_k = k;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: RunArgs) -> Result<(), Failure> {
    let config = load_config(args.config.as_deref(), args.top_k)?;
    let top_k = config.top_k;

    let store: Arc<dyn RecordStore> = if args.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        let sled = SledStore::open(&args.store)
            .with_context(|| format!("opening store {}", args.store.display()))
            .map_err(Failure::Other)?;
        Arc::new(sled)
    };

    let source = match &args.input {
        Some(path) => JsonlSource::open(path).map_err(|e| Failure::Pipeline(PipelineError::Ingestion(e)))?,
        None => JsonlSource::from_reader(BufReader::new(tokio::io::stdin())),
    };
    let filter = KeywordFilter::new(&args.keywords);
    if !filter.is_empty() {
        tracing::info!(keywords = ?args.keywords, "filtering records by keyword");
    }

    let pipeline = Pipeline::new(config, store.clone())?;
    let trends = pipeline.trends();
    let handle = pipeline.handle();

    if let Some(addr) = args.serve {
        let app = build_app(AppState { trends: trends.clone(), store: store.clone(), default_k: top_k });
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))
            .map_err(Failure::Other)?;
        tracing::info!(%addr, "query server listening");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "query server stopped");
            }
        });
    }

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; draining");
            signal_handle.shutdown();
        }
    });

    let report = pipeline.run(FilteredSource::new(source, filter)).await?;

    println!("Top {top_k} trending terms:");
    for (rank, term) in trends.top_terms(top_k).iter().enumerate() {
        println!("{:>3}. {:<24} {:>10.4}  (df {})", rank + 1, term.term, term.weight, term.doc_freq);
    }
    let summary = serde_json::to_string_pretty(&report).map_err(|e| Failure::Other(e.into()))?;
    println!("{summary}");
    Ok(())
}

fn stats(path: &Path) -> Result<()> {
    let store = SledStore::open(path).with_context(|| format!("opening store {}", path.display()))?;
    let counts = store.sentiment_counts()?;
    println!("records:  {}", store.len()?);
    println!("positive: {}", counts.positive);
    println!("neutral:  {}", counts.neutral);
    println!("negative: {}", counts.negative);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_keywords() {
        let cli = Cli::try_parse_from(["pulse", "run", "--in-memory", "--top-k", "5", "#ai", "rust"]).unwrap();
        match cli.command {
            Commands::Run { in_memory, top_k, keywords, input, .. } => {
                assert!(in_memory);
                assert_eq!(top_k, Some(5));
                assert_eq!(keywords, vec!["#ai", "rust"]);
                assert!(input.is_none());
            }
            Commands::Stats { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn store_and_in_memory_conflict() {
        assert!(Cli::try_parse_from(["pulse", "run", "--in-memory", "--store", "x"]).is_err());
    }

    #[test]
    fn config_errors_exit_with_two() {
        let err = load_config(None, Some(0)).unwrap_err();
        assert_eq!(Failure::from(err).exit_code(), 2);
        let err = load_config(Some(Path::new("/nonexistent/pulse.json")), None).unwrap_err();
        assert_eq!(Failure::from(err).exit_code(), 2);
    }
}
