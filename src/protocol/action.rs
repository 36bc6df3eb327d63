//! The tagged action sum committed by table authorities.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::ids::ActionId;
use crate::game::PlayerId;

/// Discriminator for [`Action`].
///
/// The `Unknown` variant absorbs tags introduced by newer peers: receivers
/// must not abort on an unrecognized action, they log and drop it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    CreateTable,
    Join,
    Leave,
    Kick,
    StartHand,
    Bet,
    Check,
    Call,
    Raise,
    Fold,
    AdvancePhase,
    Showdown,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::CreateTable => "create_table",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Kick => "kick",
            Self::StartHand => "start_hand",
            Self::Bet => "bet",
            Self::Check => "check",
            Self::Call => "call",
            Self::Raise => "raise",
            Self::Fold => "fold",
            Self::AdvancePhase => "advance_phase",
            Self::Showdown => "showdown",
            Self::Unknown => "unknown",
        };
        write!(f, "{repr}")
    }
}

/// A single user- or authority-originated event in a table's log.
///
/// `id` is the dedup key: replaying or re-broadcasting an action has no
/// effect the second time. For `bet`/`raise`, `amount` is the target bet
/// level ("raise to"); the replica translates it into the engine's
/// increment at apply time.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Action {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub player_id: PlayerId,
    #[serde(default)]
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, String>>,
}

impl Action {
    /// New action with a fresh id and no amount.
    #[must_use]
    pub fn new(kind: ActionKind, player_id: PlayerId) -> Self {
        Self {
            id: ActionId::generate(),
            kind,
            player_id,
            amount: 0,
            meta: None,
        }
    }

    /// New action carrying a chip amount (`bet`, `raise`).
    #[must_use]
    pub fn with_amount(kind: ActionKind, player_id: PlayerId, amount: u64) -> Self {
        Self {
            amount,
            ..Self::new(kind, player_id)
        }
    }

    /// A `kick` action targeting another player.
    #[must_use]
    pub fn kick(by: PlayerId, target: &PlayerId) -> Self {
        let mut action = Self::new(ActionKind::Kick, by);
        let mut meta = HashMap::new();
        meta.insert("target".to_string(), target.to_string());
        action.meta = Some(meta);
        action
    }

    /// The kick target, if this is a well-formed `kick`.
    #[must_use]
    pub fn kick_target(&self) -> Option<PlayerId> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("target"))
            .map(|target| PlayerId::from(target.as_str()))
    }
}
