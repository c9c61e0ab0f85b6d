use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use stride_cli::commands::{self, SyncOverrides};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about = "Mirror a remote fitness-activity history into a local file tree")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one synchronization pass
    Sync {
        #[arg(long, env = "STRIDE_DOWNLOAD_DIR")]
        root: Utf8PathBuf,
        #[arg(long, env = "STRIDE_API_URL")]
        api_url: String,
        #[arg(long, help = "Activities per listing page (overrides BATCH_SIZE)")]
        batch_size: Option<usize>,
        #[arg(
            long,
            help = "Seconds between remote calls (overrides REQUEST_DELAY_SECONDS)"
        )]
        request_delay: Option<f64>,
        #[arg(long, help = "Walk the entire remote history instead of the incremental window")]
        recheck_all: bool,
    },
    /// Show record-store contents and the pass checkpoint
    Status {
        #[arg(long, env = "STRIDE_DOWNLOAD_DIR")]
        root: Utf8PathBuf,
        #[arg(long, env = "STRIDE_STATE_DIR")]
        state_dir: Option<Utf8PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    match cli.command {
        Commands::Sync {
            root,
            api_url,
            batch_size,
            request_delay,
            recheck_all,
        } => {
            commands::cmd_sync(
                root,
                api_url,
                SyncOverrides {
                    batch_size,
                    request_delay,
                    recheck_all,
                },
            )
            .await?
        }
        Commands::Status { root, state_dir } => commands::cmd_status(root, state_dir)?,
    }

    Ok(())
}
