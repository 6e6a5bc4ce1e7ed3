mod config;
mod driver;
mod formatter;
mod getlist;
mod logging;
mod walk;

use clap::Parser;

use crate::config::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let logging_args = match &cli.command {
        Command::Webdav(args) => &args.logging,
        Command::Getlist(args) => &args.logging,
    };
    logging::init(logging_args);

    let code = match cli.command {
        Command::Webdav(args) => driver::run(args).await?,
        Command::Getlist(args) => getlist::run(args).await?,
    };
    std::process::exit(code);
}
