use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use paperlens_core::input::{latest_day, load_records, pick_one, sort_newest};
use paperlens_core::{
    BatchOptions, BatchProgress, BatchReport, Config, OpenAiCompatible, OutputStore, PaperRecord,
    ReqwestTransport, RunOptions, SummarizationPipeline, SummaryMode, SummaryStrategy, run_batch,
};
use paperlens_pdf_mupdf::MupdfBackend;
use tokio_util::sync::CancellationToken;

mod output;

use output::ColorMode;

/// Summarize arXiv papers from full text or abstracts with an OpenAI-compatible model
#[derive(Parser, Debug)]
#[command(name = "paperlens", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize the newest papers in an input file
    SummarizeNew {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of newest papers to summarize
        #[arg(long, default_value_t = 10)]
        n: usize,

        /// Summarize every paper from the newest publication day (UTC+8) instead of --n
        #[arg(long)]
        latest_day_only: bool,

        /// Also write a daily digest over the successful summaries
        #[arg(long)]
        daily_report: bool,
    },

    /// Summarize one paper picked by id or position
    SummarizeOne {
        #[command(flatten)]
        common: CommonArgs,

        /// arXiv id (version suffix optional)
        #[arg(long, conflicts_with = "index", required_unless_present = "index")]
        arxiv_id: Option<String>,

        /// 0-based position in the newest-first ordering
        #[arg(long)]
        index: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Paper metadata JSON
    #[arg(long)]
    input: PathBuf,

    /// Directory for summaries, the summary index and run records
    #[arg(long, default_value = "outputs/summaries")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = ModeArg::Fast)]
    mode: ModeArg,

    #[arg(long, value_enum, default_value_t = StrategyArg::Abstract)]
    strategy: StrategyArg,

    /// Minimum extracted characters for full text to count as available
    #[arg(long)]
    min_chars: Option<usize>,

    /// Maximum characters per chunk
    #[arg(long)]
    chunk_max_chars: Option<usize>,

    /// OpenAI-compatible endpoint base URL
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    model_fast: Option<String>,

    #[arg(long)]
    model_deep: Option<String>,

    /// Print results without writing any files
    #[arg(long)]
    no_save: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Fast,
    Deep,
}

impl From<ModeArg> for SummaryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fast => SummaryMode::Fast,
            ModeArg::Deep => SummaryMode::Deep,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Abstract,
    FullText,
    FullTextThenAbstract,
}

impl From<StrategyArg> for SummaryStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Abstract => SummaryStrategy::AbstractOnly,
            StrategyArg::FullText => SummaryStrategy::FullText,
            StrategyArg::FullTextThenAbstract => SummaryStrategy::FullTextThenAbstract,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::SummarizeNew {
            common,
            n,
            latest_day_only,
            daily_report,
        } => summarize_new(common, n, latest_day_only, daily_report).await,
        Command::SummarizeOne {
            common,
            arxiv_id,
            index,
        } => summarize_one(common, arxiv_id, index).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Resolve configuration: CLI flags > env vars > config files > defaults
fn resolve_config(common: &CommonArgs) -> Config {
    let mut config = Config::default();
    config.apply_file(&paperlens_core::config_file::load_config());
    config.apply_env(|name| std::env::var(name).ok());

    if let Some(v) = common.base_url.as_deref().filter(|v| !v.trim().is_empty()) {
        config.base_url = v.trim().to_string();
    }
    if let Some(v) = common.model_fast.as_deref().filter(|v| !v.trim().is_empty()) {
        config.model_fast = v.trim().to_string();
    }
    if let Some(v) = common.model_deep.as_deref().filter(|v| !v.trim().is_empty()) {
        config.model_deep = v.trim().to_string();
    }
    if let Some(v) = common.min_chars {
        config.min_chars = v;
    }
    if let Some(v) = common.chunk_max_chars {
        config.chunk_max_chars = v;
    }
    config
}

fn build_pipeline(config: Config) -> anyhow::Result<SummarizationPipeline> {
    let transport = ReqwestTransport::new(&config).context("building HTTP client")?;
    let chat = OpenAiCompatible::from_config(&config)?;
    Ok(SummarizationPipeline::new(
        Arc::new(config),
        Arc::new(transport),
        Arc::new(MupdfBackend::new()),
        Arc::new(chat),
    ))
}

fn load_sorted(common: &CommonArgs, document_host: &str) -> anyhow::Result<Vec<PaperRecord>> {
    let records = load_records(&common.input, document_host)
        .with_context(|| format!("loading {}", common.input.display()))?;
    Ok(sort_newest(records))
}

/// Cancel the run on Ctrl+C; the paper in flight finishes as failed.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

fn batch_options(
    common: &CommonArgs,
    config: &Config,
    daily_report: bool,
    command: &str,
) -> BatchOptions {
    BatchOptions {
        strategy: common.strategy.into(),
        run: RunOptions::from_config(config, common.mode.into()),
        save: !common.no_save,
        daily_report,
        command: command.to_string(),
    }
}

async fn summarize_new(
    common: CommonArgs,
    n: usize,
    latest_day_only: bool,
    daily_report: bool,
) -> anyhow::Result<u8> {
    let config = resolve_config(&common);
    let records = load_sorted(&common, &config.document_host)?;
    let selected = if latest_day_only {
        latest_day(&records)
    } else {
        records.into_iter().take(n).collect()
    };
    tracing::info!(
        mode = ?common.mode,
        latest_day_only,
        selected = selected.len(),
        "batch selected"
    );

    let opts = batch_options(&common, &config, daily_report, "summarize_new");
    let pipeline = build_pipeline(config)?;
    let store = OutputStore::new(&common.output_dir);
    let color = ColorMode(!common.no_color);

    let stdout: Arc<Mutex<Box<dyn Write + Send>>> =
        Arc::new(Mutex::new(Box::new(std::io::stdout())));
    let progress_cb = {
        let out = Arc::clone(&stdout);
        move |event: BatchProgress| {
            if let Ok(mut w) = out.lock() {
                let _ = output::print_progress(&mut *w, &event, color);
                let _ = w.flush();
            }
        }
    };

    let report = run_batch(
        &pipeline,
        &selected,
        &opts,
        &store,
        progress_cb,
        &cancel_on_ctrl_c(),
    )
    .await?;

    let mut w = std::io::stdout();
    output::print_artifacts(&mut w, &report, color)?;
    log_done("batch done", &report);
    Ok(report.exit_code() as u8)
}

async fn summarize_one(
    common: CommonArgs,
    arxiv_id: Option<String>,
    index: Option<usize>,
) -> anyhow::Result<u8> {
    let config = resolve_config(&common);
    let records = load_sorted(&common, &config.document_host)?;
    let paper = pick_one(&records, arxiv_id.as_deref(), index)?;

    let opts = batch_options(&common, &config, false, "summarize_one");
    let pipeline = build_pipeline(config)?;
    let store = OutputStore::new(&common.output_dir);
    let color = ColorMode(!common.no_color);

    let report = run_batch(
        &pipeline,
        std::slice::from_ref(&paper),
        &opts,
        &store,
        |_| {},
        &cancel_on_ctrl_c(),
    )
    .await?;

    let mut w = std::io::stdout();
    let Some(outcome) = report.outcomes.first() else {
        anyhow::bail!("run cancelled before {} started", paper.arxiv_id);
    };
    if let Some(summary) = &outcome.summary {
        output::print_final(&mut w, summary)?;
    }
    output::print_artifacts(&mut w, &report, color)?;
    output::print_single_result(&mut w, &outcome.record, color)?;
    log_done("single done", &report);
    Ok(if outcome.record.is_success() { 0 } else { 2 })
}

fn log_done(message: &str, report: &BatchReport) {
    tracing::info!(
        success = report.succeeded(),
        failed = report.failed(),
        "{message}"
    );
}
