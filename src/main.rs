//! autows: drive a local infrastructure-as-code workspace from the shell.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "autows",
    version,
    about = "Local workspace for infrastructure-as-code projects: settings and stack lifecycle"
)]
struct Cli {
    #[command(flatten)]
    global: automation_workspace::cli::GlobalArgs,

    #[command(subcommand)]
    command: automation_workspace::cli::Commands,
}

#[tokio::main]
async fn main() {
    automation_workspace::logging::init();
    let cli = Cli::parse();
    if let Err(e) = automation_workspace::cli::dispatch(cli.global, cli.command).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
