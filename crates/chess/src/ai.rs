//! A minimal Chess AI: plays scripted moves, then asks a human on stdin.

use std::collections::VecDeque;

use anyhow::{anyhow, bail, Context};
use joueur_client::{Ai, AiSettings, GameContext, OrderRequest, TurnContext};
use joueur_core::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use crate::fen::pretty_fen;
use crate::game::{ChessGame, Color};

/// Order the server sends when it is this player's move.
pub const MAKE_MOVE: &str = "makeMove";

pub struct ChessAi {
    name: String,
    moves: VecDeque<String>,
    interactive: bool,
    log_moves: bool,
    stdin: Option<Lines<BufReader<Stdin>>>,
}

impl Default for ChessAi {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessAi {
    pub fn new() -> Self {
        Self {
            name: "Chess Rust Player".to_string(),
            moves: VecDeque::new(),
            interactive: true,
            log_moves: false,
            stdin: None,
        }
    }

    /// Play `moves` in order before falling back to stdin.
    pub fn with_moves<I, S>(mut self, moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.moves.extend(moves.into_iter().map(Into::into));
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn remaining_moves(&self) -> usize {
        self.moves.len()
    }

    async fn prompt(&mut self, board: &str) -> anyhow::Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(board.as_bytes()).await?;
        stdout.write_all(b"Your move: ").await?;
        stdout.flush().await?;

        let lines = self
            .stdin
            .get_or_insert_with(|| BufReader::new(tokio::io::stdin()).lines());
        let line = lines
            .next_line()
            .await
            .context("reading a move from stdin")?
            .ok_or_else(|| anyhow!("stdin closed before a move was entered"))?;
        Ok(line.trim().to_string())
    }

    async fn make_move(&mut self, turn: &mut TurnContext<'_>) -> anyhow::Result<String> {
        let player_id = turn
            .player_id()
            .cloned()
            .context("no player id assigned")?;
        let board = {
            let game = ChessGame::new(turn.graph());
            let color = game
                .player(&player_id)
                .and_then(|player| player.color())
                .unwrap_or(Color::White);
            pretty_fen(game.fen(), color)
        };

        let mv = match self.moves.pop_front() {
            Some(mv) => {
                debug!("\n{board}");
                mv
            }
            None if self.interactive => self.prompt(&board).await?,
            None => bail!("no scripted move left"),
        };
        if mv.is_empty() {
            bail!("empty move");
        }

        if self.log_moves {
            turn.log(&player_id, &format!("playing {mv}")).await?;
        }
        Ok(mv)
    }
}

impl Ai for ChessAi {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_settings(&mut self, settings: AiSettings) {
        self.moves
            .extend(settings.get_list("moves").into_iter().map(str::to_string));
        if let Some(interactive) = settings.get_parsed("interactive") {
            self.interactive = interactive;
        }
        if let Some(log_moves) = settings.get_parsed("log") {
            self.log_moves = log_moves;
        }
        if let Some(name) = settings.get("name").filter(|n| !n.is_empty()) {
            self.name = name.to_string();
        }
    }

    fn start(&mut self, game: &GameContext<'_>) -> anyhow::Result<()> {
        let chess = ChessGame::new(game.graph());
        let me = game.player_id().and_then(|id| chess.player(id));
        info!(
            color = ?me.and_then(|p| p.color()),
            opponent = me.and_then(|p| p.opponent()).map(|p| p.name()).unwrap_or(""),
            "playing chess"
        );
        Ok(())
    }

    fn game_updated(&mut self, game: &GameContext<'_>) -> anyhow::Result<()> {
        let chess = ChessGame::new(game.graph());
        debug!(moves = chess.history().len(), fen = chess.fen(), "board updated");
        Ok(())
    }

    async fn take_turn(
        &mut self,
        order: &OrderRequest,
        turn: &mut TurnContext<'_>,
    ) -> anyhow::Result<Value> {
        match order.name.as_str() {
            MAKE_MOVE => Ok(Value::from(self.make_move(turn).await?)),
            other => bail!("unknown order {other:?}"),
        }
    }

    fn ended(&mut self, _game: &GameContext<'_>, won: bool, reason: &str) -> anyhow::Result<()> {
        info!(won, %reason, "game ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_script_moves() {
        let mut ai = ChessAi::new().with_moves(["e2e4"]);
        ai.set_settings(AiSettings::parse("moves=d2d4,c2c4&interactive=false&name=Deep Rust"));
        assert_eq!(ai.remaining_moves(), 3);
        assert!(!ai.interactive);
        assert_eq!(ai.name(), "Deep Rust");
        assert_eq!(ai.moves.front().map(String::as_str), Some("e2e4"));
    }

    #[test]
    fn default_name() {
        assert_eq!(ChessAi::default().name(), "Chess Rust Player");
    }
}
