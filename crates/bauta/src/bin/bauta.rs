use anyhow::Result;
use bauta::{
    backend::{create_device, get_backend_name},
    cli::TrainArgs,
    run_training,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bauta")]
#[command(about = "Bauta: instance segmentation with mask refinement")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a Bauta model
    Train(TrainArgs),

    /// Show backend information
    Info {
        /// GPU index
        #[arg(long, default_value_t = 0)]
        gpu: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => run_training(args.resolve()?),
        Commands::Info { gpu } => {
            println!("Bauta Information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {:?}", create_device(gpu));
            Ok(())
        }
    }
}
