//! Core table entities: cards, seats, phases, and chip amounts.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Whole chips. All stacks, bets, and pots are whole chip counts.
pub type Chips = u64;

/// Card rank, `2..=14` where 14 is the ace.
pub type Rank = u8;

pub const RANK_TWO: Rank = 2;
pub const RANK_FIVE: Rank = 5;
pub const RANK_TEN: Rank = 10;
pub const RANK_JACK: Rank = 11;
pub const RANK_QUEEN: Rank = 12;
pub const RANK_KING: Rank = 13;
pub const RANK_ACE: Rank = 14;

/// Card suit. The derived order (clubs < diamonds < hearts < spades) is the
/// deterministic tie-break when the evaluator picks among equal-ranked
/// cards, so identical inputs produce byte-identical chosen-card sets on
/// every node.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];

    fn to_char(self) -> char {
        match self {
            Self::Clubs => 'c',
            Self::Diamonds => 'd',
            Self::Hearts => 'h',
            Self::Spades => 's',
        }
    }

    fn from_char(ch: char) -> Option<Self> {
        match ch.to_ascii_lowercase() {
            'c' => Some(Self::Clubs),
            'd' => Some(Self::Diamonds),
            'h' => Some(Self::Hearts),
            's' => Some(Self::Spades),
            _ => None,
        }
    }
}

/// A playing card: rank plus suit.
///
/// The canonical text form is two ASCII characters, uppercase rank then
/// lowercase suit: `"As"`, `"Th"`, `"2c"`. Parsing accepts either case.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Card(pub Rank, pub Suit);

impl Card {
    #[must_use]
    pub fn rank(&self) -> Rank {
        self.0
    }

    #[must_use]
    pub fn suit(&self) -> Suit {
        self.1
    }
}

/// Error parsing the two-character card text form.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CardParseError {
    #[error("invalid card literal {0:?} (want 2 chars like As, Td)")]
    BadLength(String),
    #[error("invalid rank char {0:?}")]
    BadRank(char),
    #[error("invalid suit char {0:?} (use c/d/h/s)")]
    BadSuit(char),
}

fn rank_to_char(rank: Rank) -> char {
    match rank {
        RANK_TEN => 'T',
        RANK_JACK => 'J',
        RANK_QUEEN => 'Q',
        RANK_KING => 'K',
        RANK_ACE => 'A',
        r => (b'0' + r) as char,
    }
}

fn rank_from_char(ch: char) -> Option<Rank> {
    match ch.to_ascii_uppercase() {
        '2'..='9' => Some(ch as u8 - b'0'),
        'T' => Some(RANK_TEN),
        'J' => Some(RANK_JACK),
        'Q' => Some(RANK_QUEEN),
        'K' => Some(RANK_KING),
        'A' => Some(RANK_ACE),
        _ => None,
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", rank_to_char(self.0), self.1.to_char())
    }
}

impl FromStr for Card {
    type Err = CardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let (Some(rank_ch), Some(suit_ch), None) = (chars.next(), chars.next(), chars.next())
        else {
            return Err(CardParseError::BadLength(trimmed.to_string()));
        };
        let rank = rank_from_char(rank_ch).ok_or(CardParseError::BadRank(rank_ch))?;
        let suit = Suit::from_char(suit_ch).ok_or(CardParseError::BadSuit(suit_ch))?;
        Ok(Card(rank, suit))
    }
}

impl Serialize for Card {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Card {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Build a fresh 52-card deck, Fisher-Yates shuffled with `rng`.
///
/// Replicas seed `rng` from the `start_hand` action id so every node deals
/// the same hand.
pub fn new_deck<R: Rng>(rng: &mut R) -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for suit in Suit::ALL {
        for rank in RANK_TWO..=RANK_ACE {
            deck.push(Card(rank, suit));
        }
    }
    deck.shuffle(rng);
    deck
}

/// A stable player identifier, in practice the seated node's id.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&crate::protocol::NodeId> for PlayerId {
    fn from(value: &crate::protocol::NodeId) -> Self {
        Self(value.as_str().to_string())
    }
}

/// The five streets of a hand.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
        };
        write!(f, "{repr}")
    }
}

/// One seat at the table.
///
/// `committed` is the chip count contributed to the *current* betting round
/// only; it resets to zero on every phase advance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Seat {
    pub player: PlayerId,
    pub stack: Chips,
    pub committed: Chips,
    pub in_hand: bool,
    pub all_in: bool,
    pub folded: bool,
}

impl Seat {
    #[must_use]
    pub fn new(player: PlayerId, stack: Chips) -> Self {
        Self {
            player,
            stack,
            committed: 0,
            in_hand: false,
            all_in: false,
            folded: false,
        }
    }

    /// Reset the per-hand flags at the start of a hand.
    pub fn reset_for_hand(&mut self) {
        self.committed = 0;
        self.in_hand = true;
        self.all_in = false;
        self.folded = false;
    }
}
