//! Tribunal CLI
//!
//! A command-line tool for judging solutions locally against a problem
//! archive, using the same pipeline the backend runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;
use tribunal::archive::{ArchiveInfo, inspect_archive};
use tribunal::supervisor::{ProblemInfo, Problems};
use tribunal::{
    Config, DockerExecutor, EXAMPLE_CONFIG, Error, Language, MemoryRepo, Orchestrator, Publisher,
    SolutionCreation, State, Supervisor,
};

#[derive(Parser)]
#[command(name = "tribunal")]
#[command(about = "A contest judge: run solutions against problem archives in sandboxes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: tribunal.toml)
        #[arg(short, long, default_value = "tribunal.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List configured languages
    Languages,

    /// Validate a problem archive and print its manifest
    Inspect {
        /// Problem archive (zip)
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },

    /// Judge a solution against a problem archive
    Judge {
        /// Source file to judge
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language key (cpp, go, python) or wire code (20, 10, 30)
        #[arg(short, long)]
        language: String,

        /// Problem archive (zip)
        #[arg(short, long)]
        archive: PathBuf,

        /// Override the archive's time limit (ms)
        #[arg(short, long)]
        time_limit: Option<i64>,

        /// Override the archive's memory limit (MiB)
        #[arg(short, long)]
        memory_limit: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::Inspect { archive } => {
            let info = inspect_archive(&archive).context("invalid problem archive")?;
            print_archive(&info);
            Ok(())
        }
        Commands::Judge {
            source,
            language,
            archive,
            time_limit,
            memory_limit,
        } => judge(&config, &source, &language, &archive, time_limit, memory_limit).await,
    }
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

fn list_languages(config: &Config) {
    println!("Configured languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(key, _)| *key);

    for (key, lang) in languages {
        let kind = if lang.needs_compile() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<10} {} [{}] ({})", key, lang.name, lang.image, kind);
    }
}

fn print_archive(info: &ArchiveInfo) {
    println!("Problem: {}", info.properties.title);
    println!("Time limit: {} ms", info.properties.time_limit_ms);
    println!("Memory limit: {} MiB", info.properties.memory_limit_mib);
    println!("Tests: {}", info.manifest.count);
    for name in &info.manifest.names {
        println!("  {name}");
    }
}

async fn judge(
    config: &Config,
    source: &Path,
    language: &str,
    archive: &Path,
    time_limit: Option<i64>,
    memory_limit: Option<i64>,
) -> Result<()> {
    let language = parse_language(language)?;
    let source_text = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let info = inspect_archive(archive).context("invalid problem archive")?;
    let time_limit_ms = time_limit.unwrap_or(info.properties.time_limit_ms);
    let memory_limit_mib = memory_limit.unwrap_or(info.properties.memory_limit_mib);

    info!(
        problem = %info.properties.title,
        tests = info.manifest.count,
        time_limit_ms,
        memory_limit_mib,
        "judging solution"
    );

    let config = Arc::new(config.clone());
    let executor = Arc::new(
        DockerExecutor::connect(config.docker_host.as_deref())
            .context("failed to connect to docker")?,
    );
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&config), executor));
    let repo = Arc::new(MemoryRepo::new());
    let problems = Arc::new(LocalProblems {
        archive: archive.to_path_buf(),
        info: info.clone(),
        time_limit_ms,
        memory_limit_mib,
    });
    let supervisor = Supervisor::new(
        Arc::clone(&repo) as _,
        problems,
        Arc::new(EventPrinter),
        orchestrator,
    );

    let creation = SolutionCreation {
        source: source_text,
        user_id: 1,
        username: "local".into(),
        contest_id: 1,
        contest_title: "local".into(),
        problem_id: 1,
        problem_title: info.properties.title.clone(),
        position: 1,
        language,
        penalty: 0,
    };

    let cancel = CancellationToken::new();
    let id = supervisor
        .create_solution(&cancel, creation)
        .await
        .context("submission rejected")?;

    // Testing runs as a background task; watch the row until it reaches a
    // terminal state. A lost verdict leaves the row in Saved forever, so
    // bound the wait by a generous pipeline-wide ceiling.
    let per_test = time_limit_ms.max(0) as u64 + config.wall_timeout_margin_ms;
    let ceiling = Duration::from_millis(120_000 + per_test * info.manifest.count.max(1) as u64);
    let deadline = tokio::time::Instant::now() + ceiling;

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;

        let solution = supervisor_repo_get(&repo, id).await?;
        if solution.state.is_terminal() {
            println!();
            println!("Verdict: {:?} (state {})", solution.state, solution.state.code());
            println!("Score: {}", solution.score);
            println!("Time: {} ms", solution.time_stat);
            println!("Memory: {} KiB", solution.memory_stat);
            if solution.state != State::Accepted {
                std::process::exit(1);
            }
            return Ok(());
        }

        if tokio::time::Instant::now() >= deadline {
            bail!("judging did not reach a verdict (solution {id} still in Saved state)");
        }
    }
}

async fn supervisor_repo_get(repo: &Arc<MemoryRepo>, id: i32) -> Result<tribunal::Solution> {
    use tribunal::SolutionRepo;
    repo.get_solution(id)
        .await
        .context("failed to read solution state")
}

fn parse_language(value: &str) -> Result<Language> {
    if let Ok(code) = value.parse::<i32>() {
        return Ok(Language::from_code(code)?);
    }
    Language::from_key(value)
        .with_context(|| format!("unknown language '{value}' (expected cpp, go, or python)"))
}

/// Serves problem metadata straight from the inspected archive.
struct LocalProblems {
    archive: PathBuf,
    info: ArchiveInfo,
    time_limit_ms: i64,
    memory_limit_mib: i64,
}

#[async_trait]
impl Problems for LocalProblems {
    async fn get_problem(&self, problem_id: i32) -> Result<ProblemInfo, Error> {
        Ok(ProblemInfo {
            id: problem_id,
            title: self.info.properties.title.clone(),
            time_limit_ms: self.time_limit_ms,
            memory_limit_mib: self.memory_limit_mib,
            updated_at: 0,
            manifest: self.info.manifest.clone(),
        })
    }

    async fn download_tests(&self, _problem_id: i32) -> Result<PathBuf, Error> {
        Ok(self.archive.clone())
    }
}

/// Prints solution events as they are published.
struct EventPrinter;

#[async_trait]
impl Publisher for EventPrinter {
    async fn publish(&self, _subject: &str, payload: &[u8]) -> Result<(), Error> {
        if let Ok(event) = serde_json::from_slice::<serde_json::Value>(payload) {
            let kind = event["message_type"].as_str().unwrap_or("?");
            match event["message"].as_str() {
                Some(message) => println!("[{kind}] {message}"),
                None => println!(
                    "[{kind}] state={} score={}",
                    event["solution"]["state"], event["solution"]["score"]
                ),
            }
        }
        Ok(())
    }
}
