//! Poker engine: cards, hand evaluation, and the betting state machine.
//!
//! The engine is a single-owner state machine. All mutation is serialized
//! by the owning table replica's event loop; nothing in this module spawns
//! tasks or touches channels. Because actions are only applied after a
//! commit is accepted, every replica reaches the same accept/reject
//! decision for the same commit stream.

pub mod entities;
pub mod eval;
pub mod state;

pub use entities::{Card, Chips, Phase, PlayerId, Rank, Seat, Suit, new_deck};
pub use eval::{HandCategory, HandValue, best_hand_from_seven};
pub use state::{EngineError, EngineSnapshot, GameState, SeatView, ShowdownSummary, ShowdownWinner};
