mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tutor-cli")]
#[command(about = "Tutor CLI - Grade JavaScript submissions against problem test cases", long_about = None)]
struct Cli {
    /// Grader configuration file (defaults to config/grader.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the test cases come from
#[derive(Args)]
#[group(required = true, multiple = false)]
struct CaseSource {
    /// JSON file holding an array of test cases
    #[arg(short, long)]
    tests: Option<PathBuf>,

    /// Problem id looked up in the content store
    #[arg(short, long)]
    problem: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a submission and print per-test results
    Run {
        /// Submission source file
        #[arg(short, long)]
        code: PathBuf,

        #[command(flatten)]
        cases: CaseSource,

        /// Content store directory
        #[arg(long, default_value = "content")]
        content: PathBuf,

        /// Pre-processing source (overrides the problem's)
        #[arg(long)]
        pre: Option<PathBuf>,

        /// Post-processing source (overrides the problem's)
        #[arg(long)]
        post: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Check a submission for syntax errors without running it
    Validate {
        /// Submission source file
        #[arg(short, long)]
        code: PathBuf,
    },

    /// Time a submission and estimate its complexity
    Analyze {
        /// Submission source file
        #[arg(short, long)]
        code: PathBuf,

        #[command(flatten)]
        cases: CaseSource,

        /// Content store directory
        #[arg(long, default_value = "content")]
        content: PathBuf,
    },

    /// List problems from the content store
    Problems {
        /// Content store directory
        #[arg(long, default_value = "content")]
        content: PathBuf,

        /// Only list problems of this topic
        #[arg(long)]
        topic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays machine readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    let success = match cli.command {
        Commands::Run {
            code,
            cases,
            content,
            pre,
            post,
            json,
        } => {
            let request = commands::RunRequest {
                code,
                tests: cases.tests,
                problem: cases.problem,
                content,
                pre,
                post,
                json,
            };
            commands::run(config, request).await?
        }
        Commands::Validate { code } => commands::validate(&code)?,
        Commands::Analyze { code, cases, content } => {
            commands::analyze(config, &code, cases.tests.as_deref(), cases.problem.as_deref(), &content).await?
        }
        Commands::Problems { content, topic } => commands::list_problems(&content, topic.as_deref())?,
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}
