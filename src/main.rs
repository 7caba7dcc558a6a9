use anyhow::Result;
use clap::{Parser, Subcommand};

mod cli;

use cli::config::ConfigCommand;
use cli::connect::ConnectCommand;
use cli::job::JobCommand;
use cli::run::RunCommand;
use cli::status::StatusCommand;
use cli::submit::SubmitCommand;
use cli::ConnectionArgs;

#[derive(Parser)]
#[command(name = "hpc-bridge")]
#[command(about = "Run commands and manage Slurm jobs on a remote cluster over SSH", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Connect(ConnectCommand),
    Run(RunCommand),
    Submit(SubmitCommand),
    Status(StatusCommand),
    Job(JobCommand),
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let connection = &cli.connection;
    match &cli.command {
        Commands::Connect(cmd) => cmd.execute(connection),
        Commands::Run(cmd) => cmd.execute(connection),
        Commands::Submit(cmd) => cmd.execute(connection),
        Commands::Status(cmd) => cmd.execute(connection),
        Commands::Job(cmd) => cmd.execute(connection),
        Commands::Config(cmd) => cmd.execute(connection),
    }
}
