//! cascade CLI entrypoint.

use clap::Parser;
use console::style;

mod commands;
mod handlers;
mod logging;

use commands::Commands;
use logging::LogFormat;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(author, version, about = "Change-driven build scheduler", long_about = None)]
struct Cli {
    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    if let Err(e) = run(cli.command).await {
        eprintln!("{} {}", style("✗").red(), e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Init { path, force } => handlers::init(&path, force)?,
        Commands::Validate { config } => handlers::validate(&config)?,
        Commands::Classify { config, branch } => handlers::classify(&config, branch)?,
        Commands::Force {
            config,
            builders,
            revision,
            branch,
            reason,
        } => handlers::force(&config, builders, revision, branch, reason)?,
        Commands::Serve {
            config,
            exit_on_eof,
        } => handlers::serve(&config, exit_on_eof).await?,
        Commands::Schema => handlers::schema()?,
    }

    Ok(())
}
