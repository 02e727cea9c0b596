#![forbid(unsafe_code)]

mod cli;
mod commands;
mod shutdown;
mod startup;

use anyhow::Result;

use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    match cli.command {
        Some(Command::Version) => {
            println!("ctflow-agent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Some(Command::Dump { zone }) => commands::cmd_dump(&cli, zone),

        // No subcommand = run the agent daemon
        None => startup::run(&cli).await,
    }
}
