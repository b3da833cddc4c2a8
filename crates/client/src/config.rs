//! Client configuration.

use std::time::Duration;

use crate::types::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUESTED_SESSION};

/// Default wait for `named` and `lobbied`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to connect, negotiate a session, and play it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Game name or alias sent in `alias`.
    pub game_alias: String,
    /// Overrides the AI's own name when set.
    pub player_name: Option<String>,
    pub player_index: Option<i64>,
    pub requested_session: String,
    pub password: Option<String>,
    /// Url-encoded settings forced on the game server (`key=value&..`).
    pub game_settings: Option<String>,
    /// Settings handed to the AI (`key=value&..`).
    pub ai_settings: Option<String>,
    /// Echo every raw frame to stderr.
    pub print_io: bool,
    /// Append every raw frame to this file.
    pub wire_log_path: Option<String>,
    /// Bound on waiting for `named` and `lobbied`; `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Bound on waiting for `start` (opponents may take a while to join).
    pub start_timeout: Option<Duration>,
    /// How many `run` orders may be awaiting a reply at once.
    pub max_outstanding_orders: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            game_alias: String::new(),
            player_name: None,
            player_index: None,
            requested_session: DEFAULT_REQUESTED_SESSION.to_string(),
            password: None,
            game_settings: None,
            ai_settings: None,
            print_io: false,
            wire_log_path: None,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            start_timeout: None,
            max_outstanding_orders: 1,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `JOUEUR_*` environment variables.
    pub fn from_env() -> Self {
        use std::env;

        let mut config = Self::default();

        if let Ok(server) = env::var("JOUEUR_SERVER") {
            config.set_server(&server);
        }
        if let Some(port) = env::var("JOUEUR_PORT").ok().and_then(|s| s.parse().ok()) {
            config.port = port;
        }
        config.print_io = env::var("JOUEUR_PRINT_IO")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config.wire_log_path = env::var("JOUEUR_WIRE_LOG")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(secs) = env::var("JOUEUR_HANDSHAKE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.handshake_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config
    }

    /// Set the host from `host` or `host:port`.
    pub fn set_server(&mut self, server: &str) {
        match server.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                self.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.port = port;
                }
            }
            _ => self.host = server.to_string(),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_framework() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
        assert_eq!(config.requested_session, "*");
        assert_eq!(config.max_outstanding_orders, 1);
        assert_eq!(config.handshake_timeout, Some(DEFAULT_HANDSHAKE_TIMEOUT));
        assert_eq!(config.start_timeout, None);
    }

    #[test]
    fn server_argument_may_carry_port() {
        let mut config = ClientConfig::default();
        config.set_server("games.example.org:3088");
        assert_eq!(config.host, "games.example.org");
        assert_eq!(config.port, 3088);

        config.set_server("localhost");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3088);
    }
}
