//! Seven-card hand evaluation.
//!
//! [`best_hand_from_seven`] returns a totally ordered [`HandValue`] plus
//! the exact five cards that make it. Whenever several copies of a rank
//! could fill a slot, the highest suit wins, so two nodes evaluating the
//! same board and holes produce byte-identical chosen-card sets.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entities::{Card, RANK_ACE, RANK_FIVE, RANK_TWO, Rank};

/// Standard poker hand class, ascending.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum HandCategory {
    HighCard,
    OnePair,
    TwoPair,
    Trips,
    Straight,
    Flush,
    FullHouse,
    Quads,
    StraightFlush,
}

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "High Card",
            Self::OnePair => "One Pair",
            Self::TwoPair => "Two Pair",
            Self::Trips => "Three of a Kind",
            Self::Straight => "Straight",
            Self::Flush => "Flush",
            Self::FullHouse => "Full House",
            Self::Quads => "Four of a Kind",
            Self::StraightFlush => "Straight Flush",
        };
        write!(f, "{repr}")
    }
}

/// A comparable hand encoding: category first, then tiebreaker ranks in
/// descending priority. Unused rank slots are zero. The derived ordering is
/// exactly the poker ordering; equal values are true ties.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HandValue {
    pub category: HandCategory,
    pub ranks: [Rank; 5],
}

impl HandValue {
    fn new(category: HandCategory, kickers: &[Rank]) -> Self {
        let mut ranks = [0; 5];
        ranks[..kickers.len()].copy_from_slice(kickers);
        Self { category, ranks }
    }
}

/// Top rank of the best straight within a rank bitset, if any.
///
/// A run of five consecutive ranks wins over the wheel, which is only used
/// as the fallback and scores as a 5-high straight.
fn straight_top(bits: u16) -> Option<Rank> {
    let mut run = 0;
    for rank in (RANK_TWO..=RANK_ACE).rev() {
        if bits & (1 << rank) != 0 {
            run += 1;
            if run == 5 {
                return Some(rank + 4);
            }
        } else {
            run = 0;
        }
    }
    const WHEEL: u16 = (1 << RANK_ACE) | (1 << 5) | (1 << 4) | (1 << 3) | (1 << 2);
    if bits & WHEEL == WHEEL {
        return Some(RANK_FIVE);
    }
    None
}

/// The highest-suited card of `rank` among `cards`.
fn card_of_rank(cards: &[Card], rank: Rank) -> Card {
    let mut best: Option<Card> = None;
    for &card in cards {
        if card.rank() == rank && best.is_none_or(|b| card.suit() > b.suit()) {
            best = Some(card);
        }
    }
    // Callers only ask for ranks known to be present.
    best.unwrap_or(cards[0])
}

/// Up to `want` cards of `rank`, highest suits first.
fn cards_of_rank(cards: &[Card], rank: Rank, want: usize) -> Vec<Card> {
    let mut matching: Vec<Card> = cards.iter().copied().filter(|c| c.rank() == rank).collect();
    matching.sort_by(|a, b| b.suit().cmp(&a.suit()));
    matching.truncate(want);
    matching
}

/// The top `want` distinct ranks, high to low, skipping `exclude`.
fn top_kickers(rank_count: &[u8; 15], exclude: &[Rank], want: usize) -> Vec<Rank> {
    let mut out = Vec::with_capacity(want);
    for rank in (RANK_TWO..=RANK_ACE).rev() {
        if out.len() == want {
            break;
        }
        if exclude.contains(&rank) || rank_count[rank as usize] == 0 {
            continue;
        }
        out.push(rank);
    }
    out
}

/// The exact five cards of a straight topped by `top` (wheel when `top == 5`),
/// each slot filled by the highest-suited copy of its rank.
fn pick_straight(cards: &[Card], top: Rank) -> [Card; 5] {
    let need: [Rank; 5] = if top == RANK_FIVE {
        [5, 4, 3, 2, RANK_ACE]
    } else {
        [top, top - 1, top - 2, top - 3, top - 4]
    };
    need.map(|rank| card_of_rank(cards, rank))
}

fn take_five(cards: &[Card]) -> [Card; 5] {
    [cards[0], cards[1], cards[2], cards[3], cards[4]]
}

/// Evaluate the best five-card hand from board plus hole cards.
///
/// Requires at least five cards in total; at showdown the board alone
/// satisfies that, so a seat with unknown holes still evaluates.
pub fn best_hand_from_seven(board: &[Card], holes: &[Card]) -> (HandValue, [Card; 5]) {
    let mut all: Vec<Card> = Vec::with_capacity(board.len() + holes.len());
    all.extend_from_slice(board);
    all.extend_from_slice(holes);
    debug_assert!(all.len() >= 5, "hand evaluation needs at least five cards");

    let mut rank_count = [0u8; 15];
    let mut by_suit: [Vec<Card>; 4] = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
    let mut present: u16 = 0;
    for &card in &all {
        rank_count[card.rank() as usize] += 1;
        by_suit[card.suit() as usize].push(card);
        present |= 1 << card.rank();
    }

    // Flush / straight flush. (With seven cards a flush can never coexist
    // with a full house or quads, so the early return is safe.)
    if let Some(suited) = by_suit.iter().find(|cards| cards.len() >= 5) {
        let suit_bits = suited.iter().fold(0u16, |bits, c| bits | 1 << c.rank());
        if let Some(top) = straight_top(suit_bits) {
            let five = pick_straight(suited, top);
            return (HandValue::new(HandCategory::StraightFlush, &[top]), five);
        }
        let mut sorted = suited.clone();
        sorted.sort_by(|a, b| b.rank().cmp(&a.rank()));
        let five = take_five(&sorted);
        let kickers: Vec<Rank> = five.iter().map(Card::rank).collect();
        return (HandValue::new(HandCategory::Flush, &kickers), five);
    }

    // Ranks grouped by multiplicity: higher count first, then higher rank.
    let mut groups: Vec<(u8, Rank)> = (RANK_TWO..=RANK_ACE)
        .rev()
        .filter(|&rank| rank_count[rank as usize] > 0)
        .map(|rank| (rank_count[rank as usize], rank))
        .collect();
    groups.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    // Four of a kind.
    if groups[0].0 == 4 {
        let quad = groups[0].1;
        let kicker = top_kickers(&rank_count, &[quad], 1)[0];
        let mut five = cards_of_rank(&all, quad, 4);
        five.push(card_of_rank(&all, kicker));
        return (
            HandValue::new(HandCategory::Quads, &[quad, kicker]),
            take_five(&five),
        );
    }

    // Full house (a second trip counts as the pair).
    if groups[0].0 == 3 {
        if let Some(&(_, pair)) = groups[1..].iter().find(|(count, _)| *count >= 2) {
            let trip = groups[0].1;
            let mut five = cards_of_rank(&all, trip, 3);
            five.extend(cards_of_rank(&all, pair, 2));
            return (
                HandValue::new(HandCategory::FullHouse, &[trip, pair]),
                take_five(&five),
            );
        }
    }

    // Straight.
    if let Some(top) = straight_top(present) {
        let five = pick_straight(&all, top);
        return (HandValue::new(HandCategory::Straight, &[top]), five);
    }

    // Three of a kind.
    if groups[0].0 == 3 {
        let trip = groups[0].1;
        let kickers = top_kickers(&rank_count, &[trip], 2);
        let mut five = cards_of_rank(&all, trip, 3);
        five.extend(kickers.iter().map(|&k| card_of_rank(&all, k)));
        let mut ranks = vec![trip];
        ranks.extend(&kickers);
        return (
            HandValue::new(HandCategory::Trips, &ranks),
            take_five(&five),
        );
    }

    // Two pair.
    if groups.len() > 1 && groups[0].0 == 2 && groups[1].0 == 2 {
        let (high, low) = (groups[0].1, groups[1].1);
        let kicker = top_kickers(&rank_count, &[high, low], 1)[0];
        let mut five = cards_of_rank(&all, high, 2);
        five.extend(cards_of_rank(&all, low, 2));
        five.push(card_of_rank(&all, kicker));
        return (
            HandValue::new(HandCategory::TwoPair, &[high, low, kicker]),
            take_five(&five),
        );
    }

    // One pair.
    if groups[0].0 == 2 {
        let pair = groups[0].1;
        let kickers = top_kickers(&rank_count, &[pair], 3);
        let mut five = cards_of_rank(&all, pair, 2);
        five.extend(kickers.iter().map(|&k| card_of_rank(&all, k)));
        let mut ranks = vec![pair];
        ranks.extend(&kickers);
        return (
            HandValue::new(HandCategory::OnePair, &ranks),
            take_five(&five),
        );
    }

    // High card.
    let kickers = top_kickers(&rank_count, &[], 5);
    let five: Vec<Card> = kickers.iter().map(|&k| card_of_rank(&all, k)).collect();
    (
        HandValue::new(HandCategory::HighCard, &kickers),
        take_five(&five),
    )
}
