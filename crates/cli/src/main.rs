mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

/// Plotline narrative-planning backend.
#[derive(Parser)]
#[command(name = "plotline", version, about = "Plotline narrative planning backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP JSON API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8787)]
        port: u16,
        /// JSON file of fixture collections to pre-load: {"collection": [rows]}
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Path to TLS certificate (PEM); requires --tls-key
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key (PEM); requires --tls-cert
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Print the workflow phase progression in order
    Phases,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            port,
            seed,
            tls_cert,
            tls_key,
        } => {
            if tls_cert.is_some() != tls_key.is_some() {
                eprintln!("Error: --tls-cert and --tls-key must be given together");
                process::exit(1);
            }
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            if let Err(e) = rt.block_on(serve::start_server(port, seed, tls_cert, tls_key)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }

        Commands::Phases => {
            for phase in plotline_workflow::WorkflowPhase::ALL {
                println!("{}", phase);
            }
        }
    }
}
