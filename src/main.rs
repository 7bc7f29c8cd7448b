mod backend;
mod client;
mod config;
mod consumer;
mod conversation;
mod error;
mod protocol;
mod server;
mod translate;
mod ui;

use clap::Parser;
use client::ChatClient;
use config::{ChatArgs, Cli, Command};
use std::error::Error;
use std::fs::File;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "thoughtline=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            init_logging(None)?;
            server::run(args.into_config()).await
        }
        Command::Chat(args) => {
            if let Some(path) = &args.log_file {
                init_logging(Some(File::create(path)?))?;
            }
            run_chat(args)
        }
    }
}

fn run_chat(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let client = ChatClient::new(args.client_config());
    tracing::info!(server = %client.base_url(), mode = ?args.mode, "starting chat");
    ui::run_tui(client, args.mode.into(), args.system)
}

fn init_logging(file: Option<File>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match file {
        Some(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
        None => builder.try_init(),
    }
}
