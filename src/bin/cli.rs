use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bqdm::error::{BigQueryError, BqdmError};
use bqdm::reconcile::{default_parallelism, ReconcileOptions, Session, Summary};
use bqdm::{BigQueryStore, Console, DatasetFilter, MigrationMode};

#[derive(Parser)]
#[command(name = "bqdm")]
#[command(about = "Declarative BigQuery dataset and table management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GCP project ID
    #[arg(short, long, env = "GCP_PROJECT_ID", global = true)]
    project: Option<String>,

    /// Service account key file (application default credentials when omitted)
    #[arg(short, long, env = "GOOGLE_APPLICATION_CREDENTIALS", global = true)]
    credential_file: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Maximum concurrent resource operations (default: 5 per CPU)
    #[arg(long, global = true)]
    parallelism: Option<usize>,

    /// Seconds to wait for a single query or copy job
    #[arg(long, default_value = "3600", global = true)]
    job_timeout_secs: u64,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// Only manage these datasets (repeatable)
    #[arg(short = 'i', long = "dataset")]
    include: Vec<String>,

    /// Never manage these datasets (repeatable)
    #[arg(short = 'e', long = "exclude")]
    exclude: Vec<String>,
}

impl FilterArgs {
    fn into_filter(self) -> DatasetFilter {
        DatasetFilter::new(self.include, self.exclude)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export remote datasets and tables as configuration files
    Export {
        /// Directory to write configuration files into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show changes required by the configuration
    Plan {
        /// Configuration directory
        #[arg(short = 'd', long)]
        conf_dir: PathBuf,

        /// Exit 2 when there are changes, 0 when there are none
        #[arg(long)]
        detailed_exitcode: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Apply the configuration to BigQuery
    Apply {
        /// Configuration directory
        #[arg(short = 'd', long)]
        conf_dir: PathBuf,

        /// Schema migration mode (select_insert, select_insert_backup, replace,
        /// replace_backup, drop_create, drop_create_backup)
        #[arg(short, long, default_value = "select_insert")]
        mode: MigrationMode,

        /// Dataset receiving backup tables (default: the table's own dataset)
        #[arg(short, long)]
        backup_dataset: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Remove declared datasets and tables
    Destroy {
        #[command(subcommand)]
        action: DestroyAction,
    },
}

#[derive(Subcommand)]
enum DestroyAction {
    /// Show what destroy would remove
    Plan {
        /// Configuration directory
        #[arg(short = 'd', long)]
        conf_dir: PathBuf,

        /// Exit 2 when there are changes, 0 when there are none
        #[arg(long)]
        detailed_exitcode: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Delete every declared dataset and table that exists
    Apply {
        /// Configuration directory
        #[arg(short = 'd', long)]
        conf_dir: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("bqdm=debug,info")
    } else {
        EnvFilter::new("bqdm=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if cli.no_color || !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight steps");
            on_signal.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: &BqdmError) {
    if let BqdmError::BigQuery(bq) = err {
        print_bq_error(bq);
        return;
    }

    eprintln!("{} {}", "✗ Error:".red(), err);
}

fn print_bq_error(err: &BigQueryError) {
    eprintln!("\n{}", format!("✗ BigQuery Error [{}]", err.error_code()).red());
    eprintln!("  {}", err);
    eprintln!("\n{}", "Suggestion:".yellow());
    for line in err.suggestion().lines() {
        eprintln!("  {}", line);
    }
    eprintln!();
}

fn plan_exit(summary: &Summary, detailed_exitcode: bool) -> ExitCode {
    if detailed_exitcode && !summary.is_empty() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> bqdm::Result<ExitCode> {
    let project = cli
        .project
        .clone()
        .ok_or_else(|| BqdmError::Config("Project ID required (--project or GCP_PROJECT_ID)".into()))?;

    let store = Arc::new(BigQueryStore::new(project, cli.credential_file.as_deref()).await?);
    let console = Arc::new(Console::stdout());
    let options = ReconcileOptions::default()
        .with_parallelism(cli.parallelism.unwrap_or_else(default_parallelism))
        .with_job_timeout(Duration::from_secs(cli.job_timeout_secs))
        .with_cancel(cancel);

    let session = |filter: FilterArgs, options: ReconcileOptions| {
        Session::new(store.clone(), console.clone(), options.with_filter(filter.into_filter()))
    };

    match cli.command {
        Commands::Export { output_dir, filter } => {
            let exported = session(filter, options).export(&output_dir).await?;
            info!(datasets = exported, output = %output_dir.display(), "Export finished");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Plan { conf_dir, detailed_exitcode, filter } => {
            let summary = session(filter, options).plan(&conf_dir).await?;
            Ok(plan_exit(&summary, detailed_exitcode))
        }

        Commands::Apply { conf_dir, mode, backup_dataset, filter } => {
            let mut options = options.with_mode(mode);
            if let Some(backup) = backup_dataset {
                options = options.with_backup_dataset(backup);
            }
            session(filter, options).apply(&conf_dir).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Destroy { action } => match action {
            DestroyAction::Plan { conf_dir, detailed_exitcode, filter } => {
                let summary = session(filter, options).destroy_plan(&conf_dir).await?;
                Ok(plan_exit(&summary, detailed_exitcode))
            }
            DestroyAction::Apply { conf_dir, filter } => {
                session(filter, options).destroy_apply(&conf_dir).await?;
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}
