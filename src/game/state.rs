//! The betting state machine for a single table.
//!
//! [`GameState`] owns everything a hand needs: seats, deck, board, hole
//! cards, and the per-street betting bookkeeping. Every action validates
//! its named precondition and either mutates atomically or returns an
//! error with no state change, so replicas that apply the same commit
//! stream reach the same state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::entities::{Card, Chips, Phase, PlayerId, Seat, new_deck};
use super::eval::{HandValue, best_hand_from_seven};

/// Named engine precondition failures.
///
/// Surfaced by the action functions; the table replica logs and drops the
/// offending action without touching state.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum EngineError {
    #[error("already seated")]
    AlreadySeated,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("insufficient chips")]
    InsufficientChips,
    #[error("not player's turn")]
    NotPlayersTurn,
    #[error("cannot check; unmatched to current bet")]
    CannotCheckUnmatched,
    #[error("nothing to call")]
    NothingToCall,
    #[error("already matched")]
    AlreadyMatched,
    #[error("raise too small (below min-raise)")]
    RaiseBelowMin,
    #[error("bet must be at least the big blind")]
    BetBelowBigBlind,
    #[error("cannot bet; a bet already exists (use raise)")]
    BetWhenBetExists,
    #[error("need at least 2 players")]
    NotEnoughPlayers,
    #[error("deck underflow")]
    DeckUnderflow,
}

/// Live engine state. Owned exclusively by one table replica's loop.
#[derive(Clone, Debug)]
pub struct GameState {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub dealer_idx: usize,
    /// Seated players sorted by id, for deterministic indices across nodes.
    pub order: Vec<PlayerId>,
    pub turn_idx: usize,
    pub phase: Phase,
    pub pot: Chips,
    pub seats: HashMap<PlayerId, Seat>,
    pub deck: Vec<Card>,
    pub board: Vec<Card>,
    pub holes: HashMap<PlayerId, [Card; 2]>,
    /// Highest per-round committed amount of any seat.
    pub current_bet: Chips,
    /// Eligible seats that still owe action this street.
    pub actors_to_act: usize,
    /// Size of the last full raise increment (the opening forced bet counts
    /// as a raise from zero to the big blind).
    pub last_raise_size: Chips,
    pub hand_active: bool,
}

/// Serializable public engine state for snapshots.
///
/// Carries everything observable; the deck and hole cards stay local.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub dealer_idx: usize,
    pub order: Vec<PlayerId>,
    pub turn_idx: usize,
    pub phase: Phase,
    pub pot: Chips,
    pub board: Vec<Card>,
    pub seats: HashMap<PlayerId, Seat>,
    pub current_bet: Chips,
    pub actors_to_act: usize,
    pub last_raise_size: Chips,
    pub hand_active: bool,
}

/// Read-only seat view for summaries.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeatView {
    pub player: PlayerId,
    pub stack: Chips,
    pub committed: Chips,
    pub in_hand: bool,
    pub all_in: bool,
    pub folded: bool,
}

/// One showdown winner with the hand that won.
#[derive(Clone, Debug, PartialEq)]
pub struct ShowdownWinner {
    pub player: PlayerId,
    pub value: HandValue,
    pub cards: [Card; 5],
}

/// Outcome of resolving a showdown.
#[derive(Clone, Debug, PartialEq)]
pub struct ShowdownSummary {
    /// Winners in seat order.
    pub winners: Vec<ShowdownWinner>,
    /// Even share paid to each winner.
    pub payout_per: Chips,
    /// Odd chips distributed one-by-one left of the dealer.
    pub remainder: Chips,
    pub total_payout: Chips,
}

impl GameState {
    #[must_use]
    pub fn new(small_blind: Chips, big_blind: Chips) -> Self {
        Self {
            small_blind,
            big_blind,
            dealer_idx: 0,
            order: Vec::new(),
            turn_idx: 0,
            phase: Phase::Preflop,
            pot: 0,
            seats: HashMap::new(),
            deck: Vec::new(),
            board: Vec::new(),
            holes: HashMap::new(),
            current_bet: 0,
            actors_to_act: 0,
            last_raise_size: 0,
            hand_active: false,
        }
    }

    // === Seating ===

    /// Seat a new player with `buyin` chips.
    pub fn sit(&mut self, player: PlayerId, buyin: Chips) -> Result<(), EngineError> {
        if self.seats.contains_key(&player) {
            return Err(EngineError::AlreadySeated);
        }
        self.seats.insert(player.clone(), Seat::new(player.clone(), buyin));
        self.order.push(player);
        self.order.sort();
        Ok(())
    }

    /// Remove a player's seat, holes, and order entry.
    pub fn leave(&mut self, player: &PlayerId) {
        self.seats.remove(player);
        self.holes.remove(player);
        self.order.retain(|id| id != player);
        if self.turn_idx >= self.order.len() {
            self.turn_idx = 0;
        }
        if self.dealer_idx >= self.order.len() {
            self.dealer_idx = 0;
        }
    }

    // === Dealing ===

    /// Start a new hand: reset seats, rotate the dealer, post blinds, deal.
    ///
    /// The caller supplies the rng (seeded from the committed action id) so
    /// every replica shuffles identically.
    pub fn start_hand<R: Rng>(&mut self, rng: &mut R) -> Result<(), EngineError> {
        if self.order.len() < 2 {
            return Err(EngineError::NotEnoughPlayers);
        }
        self.pot = 0;
        for seat in self.seats.values_mut() {
            seat.reset_for_hand();
        }
        self.hand_active = true;
        self.dealer_idx = (self.dealer_idx + 1) % self.order.len();

        let sb_idx = (self.dealer_idx + 1) % self.order.len();
        let bb_idx = (self.dealer_idx + 2) % self.order.len();
        self.post_blind(&self.order[sb_idx].clone(), self.small_blind);
        self.post_blind(&self.order[bb_idx].clone(), self.big_blind);

        self.turn_idx = (bb_idx + 1) % self.order.len();
        self.phase = Phase::Preflop;
        self.current_bet = self.big_blind;
        self.last_raise_size = self.big_blind;
        self.actors_to_act = self.count_need_to_act();

        self.deck = new_deck(rng);
        self.board.clear();
        self.holes.clear();
        for player in self.order.clone() {
            let seat = &self.seats[&player];
            if seat.in_hand && !seat.folded {
                if self.deck.len() < 2 {
                    return Err(EngineError::DeckUnderflow);
                }
                let first = self.deck.remove(0);
                let second = self.deck.remove(0);
                self.holes.insert(player, [first, second]);
            }
        }
        Ok(())
    }

    fn post_blind(&mut self, player: &PlayerId, amount: Chips) {
        let Some(seat) = self.seats.get_mut(player) else {
            return;
        };
        if seat.stack == 0 {
            seat.all_in = true;
            return;
        }
        let pay = amount.min(seat.stack);
        if pay < amount {
            seat.all_in = true;
        }
        seat.stack -= pay;
        seat.committed += pay;
        self.pot += pay;
    }

    // === Round bookkeeping ===

    fn eligible(&self, player: &PlayerId) -> bool {
        self.seats
            .get(player)
            .is_some_and(|seat| seat.in_hand && !seat.folded && !seat.all_in)
    }

    /// How many eligible seats still owe action this street: with no live
    /// bet everyone eligible acts once, otherwise everyone behind the bet.
    fn count_need_to_act(&self) -> usize {
        self.order
            .iter()
            .filter(|player| self.eligible(player))
            .filter(|player| {
                self.current_bet == 0 || self.seats[*player].committed < self.current_bet
            })
            .count()
    }

    /// True when betting is closed this street: nobody left to act, or at
    /// most one eligible seat remains. The authority auto-advances on this.
    #[must_use]
    pub fn round_closed(&self) -> bool {
        if !self.hand_active {
            return false;
        }
        let eligible = self.order.iter().filter(|p| self.eligible(p)).count();
        self.actors_to_act == 0 || eligible <= 1
    }

    /// The player whose turn it is, if any.
    #[must_use]
    pub fn current_player(&self) -> Option<&PlayerId> {
        self.order.get(self.turn_idx)
    }

    /// The dealer, if any.
    #[must_use]
    pub fn dealer(&self) -> Option<&PlayerId> {
        self.order.get(self.dealer_idx)
    }

    fn ensure_turn(&self, player: &PlayerId) -> Result<(), EngineError> {
        if self.current_player() != Some(player) {
            return Err(EngineError::NotPlayersTurn);
        }
        Ok(())
    }

    fn advance_turn(&mut self) {
        if self.order.is_empty() {
            return;
        }
        for _ in 0..self.order.len() {
            self.turn_idx = (self.turn_idx + 1) % self.order.len();
            if self.eligible(&self.order[self.turn_idx]) {
                return;
            }
        }
        // No eligible seat left; the round-closed check takes it from here.
    }

    // === Betting actions ===

    /// Check: allowed with no live bet, or when already matched to it.
    pub fn check(&mut self, player: &PlayerId) -> Result<(), EngineError> {
        let seat = self.seats.get(player).ok_or(EngineError::UnknownPlayer)?;
        self.ensure_turn(player)?;
        if self.current_bet != 0 && seat.committed != self.current_bet {
            return Err(EngineError::CannotCheckUnmatched);
        }
        self.actors_to_act = self.actors_to_act.saturating_sub(1);
        self.advance_turn();
        Ok(())
    }

    /// Fold: the seat leaves the hand.
    pub fn fold(&mut self, player: &PlayerId) -> Result<(), EngineError> {
        if !self.seats.contains_key(player) {
            return Err(EngineError::UnknownPlayer);
        }
        self.ensure_turn(player)?;
        let behind = {
            let seat = &self.seats[player];
            self.current_bet > 0 && seat.committed < self.current_bet
        };
        if behind {
            self.actors_to_act = self.actors_to_act.saturating_sub(1);
        }
        let seat = self.seats.get_mut(player).ok_or(EngineError::UnknownPlayer)?;
        seat.folded = true;
        seat.in_hand = false;
        self.advance_turn();
        Ok(())
    }

    /// Open the betting this street.
    pub fn bet(&mut self, player: &PlayerId, amount: Chips) -> Result<(), EngineError> {
        let seat = self.seats.get(player).ok_or(EngineError::UnknownPlayer)?;
        self.ensure_turn(player)?;
        if self.current_bet > 0 {
            return Err(EngineError::BetWhenBetExists);
        }
        if amount < self.big_blind {
            return Err(EngineError::BetBelowBigBlind);
        }
        if seat.stack < amount {
            return Err(EngineError::InsufficientChips);
        }
        let seat = self.seats.get_mut(player).ok_or(EngineError::UnknownPlayer)?;
        seat.stack -= amount;
        seat.committed += amount;
        self.pot += amount;
        self.current_bet = seat.committed;
        self.last_raise_size = amount;
        self.actors_to_act = self.count_need_to_act();
        self.advance_turn();
        Ok(())
    }

    /// Call the live bet; pays the whole stack as a short all-in when the
    /// stack cannot cover. A short call does not change `current_bet` or
    /// `last_raise_size` and does not reopen action.
    pub fn call(&mut self, player: &PlayerId) -> Result<(), EngineError> {
        let seat = self.seats.get(player).ok_or(EngineError::UnknownPlayer)?;
        self.ensure_turn(player)?;
        if self.current_bet == 0 {
            return Err(EngineError::NothingToCall);
        }
        if seat.committed >= self.current_bet {
            return Err(EngineError::AlreadyMatched);
        }
        let need = self.current_bet - seat.committed;
        if seat.stack == 0 {
            return Err(EngineError::InsufficientChips);
        }
        let seat = self.seats.get_mut(player).ok_or(EngineError::UnknownPlayer)?;
        let pay = need.min(seat.stack);
        if pay < need {
            seat.all_in = true;
        }
        seat.stack -= pay;
        seat.committed += pay;
        self.pot += pay;
        self.actors_to_act = self.actors_to_act.saturating_sub(1);
        self.advance_turn();
        Ok(())
    }

    /// Raise by `add` on top of the amount needed to call.
    ///
    /// A full raise (`add >= last_raise_size`, stack covers) resets the
    /// obligation of every other seat. A short all-in shove below the
    /// minimum raise is allowed but does not reopen action. A short raise
    /// that is not all-in is rejected.
    pub fn raise(&mut self, player: &PlayerId, add: Chips) -> Result<(), EngineError> {
        let seat = self.seats.get(player).ok_or(EngineError::UnknownPlayer)?;
        self.ensure_turn(player)?;
        if self.current_bet == 0 {
            return Err(EngineError::NothingToCall);
        }
        if add == 0 {
            return Err(EngineError::RaiseBelowMin);
        }
        let need = self.current_bet.saturating_sub(seat.committed);
        let total = need + add;

        if add >= self.last_raise_size && seat.stack >= total {
            // Full raise: everyone else must respond again.
            let seat = self.seats.get_mut(player).ok_or(EngineError::UnknownPlayer)?;
            seat.stack -= total;
            seat.committed += total;
            self.pot += total;
            self.current_bet = seat.committed;
            self.last_raise_size = add;
            self.actors_to_act = self.count_need_to_act();
            self.advance_turn();
            return Ok(());
        }

        if seat.stack < total {
            // Short all-in: call what the stack covers, shove the rest.
            let call_part = need.min(seat.stack);
            let shove = seat.stack - call_part;
            if shove == 0 {
                return Err(EngineError::InsufficientChips);
            }
            let was_behind = need > 0;
            let seat = self.seats.get_mut(player).ok_or(EngineError::UnknownPlayer)?;
            seat.stack = 0;
            seat.all_in = true;
            seat.committed += call_part + shove;
            self.pot += call_part + shove;
            // No reopen: current_bet and last_raise_size stay put, only this
            // actor's own obligation clears.
            if was_behind {
                self.actors_to_act = self.actors_to_act.saturating_sub(1);
            }
            self.advance_turn();
            return Ok(());
        }

        Err(EngineError::RaiseBelowMin)
    }

    // === Phase progression ===

    /// Deal the next street and reset the per-round betting state.
    /// River to showdown sets the phase and ends the live hand.
    pub fn advance_phase(&mut self) {
        match self.phase {
            Phase::Preflop => {
                self.deal_board(3);
                self.reset_round();
                self.phase = Phase::Flop;
            }
            Phase::Flop => {
                self.deal_board(1);
                self.reset_round();
                self.phase = Phase::Turn;
            }
            Phase::Turn => {
                self.deal_board(1);
                self.reset_round();
                self.phase = Phase::River;
            }
            Phase::River => {
                self.phase = Phase::Showdown;
                self.hand_active = false;
            }
            Phase::Showdown => {}
        }
    }

    fn deal_board(&mut self, count: usize) {
        // A snapshot-restored replica has no deck; the board it saw in the
        // snapshot is already in place, so a short deck is not fatal here.
        let take = count.min(self.deck.len());
        self.board.extend(self.deck.drain(..take));
    }

    fn reset_round(&mut self) {
        for seat in self.seats.values_mut() {
            seat.committed = 0;
        }
        self.current_bet = 0;
        self.last_raise_size = self.big_blind;
        if self.order.is_empty() {
            self.turn_idx = 0;
            self.actors_to_act = 0;
            return;
        }
        self.turn_idx = (self.dealer_idx + 1) % self.order.len();
        self.actors_to_act = self.count_need_to_act();
        if !self.eligible(&self.order[self.turn_idx]) {
            self.advance_turn();
        }
    }

    // === Showdown ===

    /// Evaluate the surviving seats, split the pot among the best hands,
    /// distribute odd chips in seat order starting left of the dealer, and
    /// end the hand.
    pub fn resolve_showdown(&mut self) -> ShowdownSummary {
        let mut evals: Vec<(PlayerId, HandValue, [Card; 5])> = Vec::new();
        for player in &self.order {
            let Some(seat) = self.seats.get(player) else {
                continue;
            };
            if !seat.in_hand || seat.folded {
                continue;
            }
            // A seat whose holes we never saw (mid-hand attach) plays the
            // board only.
            let holes = self.holes.get(player).map_or(&[][..], |cards| &cards[..]);
            let (value, cards) = best_hand_from_seven(&self.board, holes);
            evals.push((player.clone(), value, cards));
        }

        if evals.is_empty() {
            self.pot = 0;
            self.hand_active = false;
            return ShowdownSummary {
                winners: Vec::new(),
                payout_per: 0,
                remainder: 0,
                total_payout: 0,
            };
        }

        let best = evals.iter().map(|(_, value, _)| *value).max().unwrap_or(evals[0].1);
        let mut winners: Vec<ShowdownWinner> = evals
            .into_iter()
            .filter(|(_, value, _)| *value == best)
            .map(|(player, value, cards)| ShowdownWinner { player, value, cards })
            .collect();

        let count = winners.len() as Chips;
        let payout_per = self.pot / count;
        let mut remainder = self.pot % count;
        let distributed = remainder;

        for winner in &winners {
            if let Some(seat) = self.seats.get_mut(&winner.player) {
                seat.stack += payout_per;
            }
        }
        // Odd chips: +1 per winner walking seat order from left of dealer.
        if remainder > 0 && !self.order.is_empty() {
            let start = (self.dealer_idx + 1) % self.order.len();
            for offset in 0..self.order.len() {
                if remainder == 0 {
                    break;
                }
                let player = &self.order[(start + offset) % self.order.len()];
                if winners.iter().any(|w| &w.player == player) {
                    if let Some(seat) = self.seats.get_mut(player) {
                        seat.stack += 1;
                        remainder -= 1;
                    }
                }
            }
        }

        let total_payout = payout_per * count + distributed;
        self.pot = 0;
        self.hand_active = false;

        // Stable presentation: winners in seat order.
        winners.sort_by_key(|w| {
            self.order
                .iter()
                .position(|p| p == &w.player)
                .unwrap_or(usize::MAX)
        });

        ShowdownSummary {
            winners,
            payout_per,
            remainder: distributed,
            total_payout,
        }
    }

    // === Snapshots & views ===

    /// Capture the observable public state.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            small_blind: self.small_blind,
            big_blind: self.big_blind,
            dealer_idx: self.dealer_idx,
            order: self.order.clone(),
            turn_idx: self.turn_idx,
            phase: self.phase,
            pot: self.pot,
            board: self.board.clone(),
            seats: self.seats.clone(),
            current_bet: self.current_bet,
            actors_to_act: self.actors_to_act,
            last_raise_size: self.last_raise_size,
            hand_active: self.hand_active,
        }
    }

    /// Install a snapshot, replacing local state. The deck and hole cards
    /// are not carried; they stay empty until the next hand starts.
    pub fn restore(&mut self, snapshot: EngineSnapshot) {
        self.small_blind = snapshot.small_blind;
        self.big_blind = snapshot.big_blind;
        self.dealer_idx = snapshot.dealer_idx;
        self.order = snapshot.order;
        self.turn_idx = snapshot.turn_idx;
        self.phase = snapshot.phase;
        self.pot = snapshot.pot;
        self.board = snapshot.board;
        self.seats = snapshot.seats;
        self.current_bet = snapshot.current_bet;
        self.actors_to_act = snapshot.actors_to_act;
        self.last_raise_size = snapshot.last_raise_size;
        self.hand_active = snapshot.hand_active;
        self.deck.clear();
        self.holes.clear();
    }

    /// Seat views in seat order.
    #[must_use]
    pub fn seat_views(&self) -> Vec<SeatView> {
        self.order
            .iter()
            .filter_map(|player| self.seats.get(player))
            .map(|seat| SeatView {
                player: seat.player.clone(),
                stack: seat.stack,
                committed: seat.committed,
                in_hand: seat.in_hand,
                all_in: seat.all_in,
                folded: seat.folded,
            })
            .collect()
    }
}
