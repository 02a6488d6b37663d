use anyhow::Result;
use clap::Parser;

use planboard::{
    cli::{self, RootCommand},
    logging::init_logging,
    settings::Settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "planboard",
    about = "Kanban board core for a personal planner",
    long_about = "Moves, reorders and schedules planner tasks against a REST backend, with optimistic updates and rollback.",
    version,
    author
)]
struct Cli {
    /// Backend base URL, overriding the settings file
    #[arg(long, global = true, value_name = "URL")]
    api: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: RootCommand,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = init_logging() {
        eprintln!("warning: failed to initialize logging: {err}");
    }

    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(api) = cli.api {
        settings.api_base_url = api;
        settings.validate();
    }

    let code = cli::run(cli.command, settings, cli.json, cli.quiet).await;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
