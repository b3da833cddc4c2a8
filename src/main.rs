//! Game client runner (default binary).
//!
//! Connects to a game server, resolves the requested game, and plays one
//! session with the bundled AI for that game.

use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use joueur::chess::{self, ChessAi};
use joueur::client::{ClientConfig, ClientError, GameOutcome, Session};
use joueur::types::ExitCode;

/// Play a game against a game server.
#[derive(Parser, Debug)]
#[command(name = "joueur")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Name or alias of the game to play
    game: String,

    /// Game server host, optionally as host:port
    #[arg(short, long)]
    server: Option<String>,

    /// Game server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Player name, instead of the AI's own
    #[arg(short, long)]
    name: Option<String>,

    /// Player index in the game
    #[arg(short, long)]
    index: Option<i64>,

    /// Session to join or create ("*" for any open session)
    #[arg(short = 'r', long)]
    session: Option<String>,

    /// Password needed to join the session
    #[arg(short = 'w', long)]
    password: Option<String>,

    /// Url-encoded settings forced on the game (key=value&key=value)
    #[arg(long)]
    game_settings: Option<String>,

    /// Settings handed to the AI (key=value&key=value)
    #[arg(long)]
    ai_settings: Option<String>,

    /// Echo every frame sent and received to stderr
    #[arg(long)]
    print_io: bool,

    /// Append every frame sent and received to this file
    #[arg(long)]
    wire_log: Option<String>,

    /// Seconds to wait for each handshake reply (0 waits forever)
    #[arg(long)]
    handshake_timeout: Option<u64>,
}

impl Cli {
    fn into_config(self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        config.game_alias = self.game;
        if let Some(server) = self.server.as_deref() {
            config.set_server(server);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.player_name = self.name.or(config.player_name);
        config.player_index = self.index.or(config.player_index);
        if let Some(session) = self.session {
            config.requested_session = session;
        }
        config.password = self.password;
        config.game_settings = self.game_settings;
        config.ai_settings = self.ai_settings;
        config.print_io |= self.print_io;
        if self.wire_log.is_some() {
            config.wire_log_path = self.wire_log;
        }
        if let Some(secs) = self.handshake_timeout {
            config.handshake_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(ExitCode::InvalidArgs.code());
        }
    };

    match run(cli.into_config()).await {
        Ok(outcome) => {
            info!(won = outcome.won, reason = %outcome.reason, "done");
        }
        Err(err) => {
            error!(error = %err, "client stopped");
            std::process::exit(err.exit_code().code());
        }
    }
}

async fn run(config: ClientConfig) -> Result<GameOutcome, ClientError> {
    info!(server = %config.server_addr(), game = %config.game_alias, "connecting");
    let mut session = Session::connect(config).await?;
    let result = play(&mut session).await;
    // Flush the wire log before the process exits.
    session.close().await;
    result
}

async fn play(session: &mut Session) -> Result<GameOutcome, ClientError> {
    let game_name = session.alias().await?;

    match game_name.as_str() {
        chess::GAME_NAME => {
            let mut ai = ChessAi::new();
            session.play_game(chess::registry(), &mut ai).await
        }
        other => Err(ClientError::GameNotFound(other.to_string())),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
