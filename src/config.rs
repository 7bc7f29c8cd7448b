use crate::client::ClientConfig;
use crate::conversation::{AgentMode, BackendDefaults};
use crate::server::ServerConfig;
use crate::translate::Pacing;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "thoughtline", version, about = "Chat stream translator and terminal front end for an agent backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the chat stream translator.
    Serve(ServeArgs),
    /// Open the terminal chat front end against a running translator.
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "THOUGHTLINE_LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: String,
    #[arg(long, env = "AGENT_BACKEND_URL", default_value = "http://localhost:8000")]
    pub backend_url: String,
    #[arg(long, env = "AGENT_PROVIDER", default_value = "openai")]
    pub provider: String,
    #[arg(long, env = "AGENT_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,
    /// Pause after each replayed thought card.
    #[arg(long, env = "THOUGHTLINE_CARD_DELAY_MS", default_value_t = 200)]
    pub card_delay_ms: u64,
    /// Pause after each replayed text frame.
    #[arg(long, env = "THOUGHTLINE_TEXT_DELAY_MS", default_value_t = 100)]
    pub text_delay_ms: u64,
    /// Replay atomic answers without any pauses.
    #[arg(long, env = "THOUGHTLINE_NO_PACING")]
    pub no_pacing: bool,
}

impl ServeArgs {
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen: self.listen,
            backend_url: self.backend_url,
            defaults: BackendDefaults {
                provider: self.provider,
                model: self.model,
            },
            pacing: if self.no_pacing {
                Pacing::none()
            } else {
                Pacing {
                    after_card: Duration::from_millis(self.card_delay_ms),
                    after_text: Duration::from_millis(self.text_delay_ms),
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Chat,
    Agent,
    Auto,
}

impl From<ModeArg> for AgentMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Chat => AgentMode::Chat,
            ModeArg::Agent => AgentMode::Agent,
            ModeArg::Auto => AgentMode::Auto,
        }
    }
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[arg(long, env = "THOUGHTLINE_URL", default_value = "http://127.0.0.1:3000")]
    pub server: String,
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    pub mode: ModeArg,
    /// System prompt sent with every turn.
    #[arg(long)]
    pub system: Option<String>,
    /// Write logs here; the terminal belongs to the UI.
    #[arg(long, env = "THOUGHTLINE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl ChatArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.server.clone(),
        }
    }
}
