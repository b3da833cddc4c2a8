//! Human readable board rendering from a FEN string.

use std::fmt::Write;

use crate::game::Color;

/// Render the board part of `fen` as an 8x8 grid, with the move number and
/// whose turn it is relative to `us`.
///
/// ```
/// use joueur_chess::{pretty_fen, Color};
///
/// let board = pretty_fen("8/8/8/8/8/8/8/4K3 w - - 0 12", Color::White);
/// assert!(board.starts_with("Move: 12\nSide to move: w (us)"));
/// assert!(board.contains(" 1 | . . . . K . . . |"));
/// ```
pub fn pretty_fen(fen: &str, us: Color) -> String {
    let mut parts = fen.split_whitespace();
    let placement = parts.next().unwrap_or("");
    let side = parts.next().unwrap_or("?");
    let fullmove = parts.nth(3).unwrap_or("?");
    let whose = if side.starts_with(us.fen_side()) {
        "us"
    } else {
        "them"
    };

    let mut out = String::with_capacity(256);
    let _ = write!(
        out,
        "Move: {fullmove}\nSide to move: {side} ({whose})\n   +-----------------+"
    );
    for (i, rank) in placement.split('/').enumerate() {
        let _ = write!(out, "\n {} |", 8usize.saturating_sub(i));
        for square in rank.chars() {
            match square.to_digit(10) {
                Some(empty) => (0..empty).for_each(|_| out.push_str(" .")),
                None => {
                    out.push(' ');
                    out.push(square);
                }
            }
        }
        out.push_str(" |");
    }
    out.push_str("\n   +-----------------+\n     a b c d e f g h\n");
    out
}
