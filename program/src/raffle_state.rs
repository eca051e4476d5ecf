use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::raffle_error::RaffleError;

/// Lifecycle status of a raffle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaffleStatus {
    /// Created, accepting scores
    Open,
    /// Organizer triggered the payout, eligible set is frozen
    Distributing,
    /// Every winner reached a terminal payout state
    Completed,
}

impl RaffleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaffleStatus::Open => "open",
            RaffleStatus::Distributing => "distributing",
            RaffleStatus::Completed => "completed",
        }
    }

    /// Only `open -> distributing -> completed` is allowed.
    pub fn can_transition_to(self, next: RaffleStatus) -> bool {
        matches!(
            (self, next),
            (RaffleStatus::Open, RaffleStatus::Distributing)
                | (RaffleStatus::Distributing, RaffleStatus::Completed)
        )
    }

    pub fn transition(self, next: RaffleStatus) -> Result<RaffleStatus, RaffleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(RaffleError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn accepts_scores(self) -> bool {
        self == RaffleStatus::Open
    }

    /// Entries and provisional ranking need an open raffle whose final cut
    /// has not been made yet.
    pub fn ensure_accepts_scores(self, finalized: bool) -> Result<(), RaffleError> {
        if !self.accepts_scores() {
            return Err(RaffleError::RaffleNotOpen);
        }
        if finalized {
            return Err(RaffleError::EligibilityFinalized);
        }
        Ok(())
    }
}

impl FromStr for RaffleStatus {
    type Err = RaffleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RaffleStatus::Open),
            "distributing" => Ok(RaffleStatus::Distributing),
            "completed" => Ok(RaffleStatus::Completed),
            other => Err(RaffleError::Storage(format!("unknown raffle status `{}`", other))),
        }
    }
}

impl fmt::Display for RaffleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standing of one participant inside one raffle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Score recorded, outside the provisional top-N
    Pending,
    /// Ranked within the winner count
    Eligible,
    /// Excluded by the final cut
    NotEligible,
    /// Reward transferred
    Paid,
    /// Transfer abandoned or rejected
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Eligible => "eligible",
            ResultStatus::NotEligible => "not_eligible",
            ResultStatus::Paid => "paid",
            ResultStatus::Failed => "failed",
        }
    }

    /// Rows in a terminal state are never rewritten by a ranking pass.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResultStatus::NotEligible | ResultStatus::Paid | ResultStatus::Failed
        )
    }

    /// Rows that made the cut, whatever happened to their transfer since.
    pub fn is_winner(self) -> bool {
        matches!(
            self,
            ResultStatus::Eligible | ResultStatus::Paid | ResultStatus::Failed
        )
    }
}

impl FromStr for ResultStatus {
    type Err = RaffleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResultStatus::Pending),
            "eligible" => Ok(ResultStatus::Eligible),
            "not_eligible" => Ok(ResultStatus::NotEligible),
            "paid" => Ok(ResultStatus::Paid),
            "failed" => Ok(ResultStatus::Failed),
            other => Err(RaffleError::Storage(format!("unknown result status `{}`", other))),
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raffle row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raffle {
    /// Internal numeric id
    pub id: i64,
    /// Public identifier handed to clients
    pub uuid: Uuid,
    /// Owning event
    pub event_id: i64,
    /// Number of winners
    pub top_n: u32,
    pub status: RaffleStatus,
    /// Funded pool in the token's smallest unit, unset until funded
    pub prize_pool: Option<u64>,
    /// Reward token
    pub token_id: i64,
    /// Set by the first final cut; entries are closed from then on
    pub eligibility_finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Raffle {
    pub fn is_finalized(&self) -> bool {
        self.eligibility_finalized_at.is_some()
    }

    pub fn ensure_accepts_scores(&self) -> Result<(), RaffleError> {
        self.status.ensure_accepts_scores(self.is_finalized())
    }
}

/// One participant's recorded score within one raffle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Internal id, doubles as insertion order
    pub id: i64,
    pub raffle_id: i64,
    pub user_id: i64,
    pub score: i64,
    /// Wallet captured at submission time
    pub wallet_address: String,
    /// 1-based position, unset until ranked
    pub rank: Option<u32>,
    pub status: ResultStatus,
    /// Amount transferred, set once on payout
    pub reward_amount: Option<u64>,
    /// On-chain transaction hash, set once on payout
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payable currency reference data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Jetton master address, `None` for the native coin
    pub master_address: Option<String>,
    pub is_native: bool,
    pub logo_url: Option<String>,
}

/// Display fields of a participant profile
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Insert payload for a score submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScore {
    pub raffle_id: i64,
    pub user_id: i64,
    pub score: i64,
    pub wallet_address: String,
}

/// Partial update of a raffle's setup fields. `None` leaves a field as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RafflePatch {
    pub top_n: Option<u32>,
    pub prize_pool: Option<u64>,
    pub token_id: Option<i64>,
}

impl RafflePatch {
    pub fn is_empty(&self) -> bool {
        self.top_n.is_none() && self.prize_pool.is_none() && self.token_id.is_none()
    }
}

/// Outcome of a final eligibility cut
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalCut {
    /// Winner row ids, in rank order
    pub eligible: Vec<i64>,
    pub not_eligible: Vec<i64>,
}

impl FinalCut {
    pub fn participants(&self) -> usize {
        self.eligible.len() + self.not_eligible.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_moves_forward() {
        assert!(RaffleStatus::Open.can_transition_to(RaffleStatus::Distributing));
        assert!(RaffleStatus::Distributing.can_transition_to(RaffleStatus::Completed));

        assert!(!RaffleStatus::Open.can_transition_to(RaffleStatus::Completed));
        assert!(!RaffleStatus::Completed.can_transition_to(RaffleStatus::Open));
        assert!(!RaffleStatus::Distributing.can_transition_to(RaffleStatus::Open));
        assert!(!RaffleStatus::Distributing.can_transition_to(RaffleStatus::Distributing));

        assert!(matches!(
            RaffleStatus::Completed.transition(RaffleStatus::Distributing),
            Err(RaffleError::InvalidTransition {
                from: RaffleStatus::Completed,
                to: RaffleStatus::Distributing
            })
        ));
    }

    #[test]
    fn entries_close_with_the_final_cut() {
        assert!(RaffleStatus::Open.ensure_accepts_scores(false).is_ok());
        assert!(matches!(
            RaffleStatus::Open.ensure_accepts_scores(true),
            Err(RaffleError::EligibilityFinalized)
        ));
        assert!(matches!(
            RaffleStatus::Distributing.ensure_accepts_scores(true),
            Err(RaffleError::RaffleNotOpen)
        ));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [RaffleStatus::Open, RaffleStatus::Distributing, RaffleStatus::Completed] {
            assert_eq!(status.as_str().parse::<RaffleStatus>().unwrap(), status);
        }
        for status in [
            ResultStatus::Pending,
            ResultStatus::Eligible,
            ResultStatus::NotEligible,
            ResultStatus::Paid,
            ResultStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ResultStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<RaffleStatus>().is_err());
    }

    #[test]
    fn terminal_and_winner_states() {
        assert!(!ResultStatus::Pending.is_terminal());
        assert!(!ResultStatus::Eligible.is_terminal());
        assert!(ResultStatus::Paid.is_terminal());
        assert!(ResultStatus::Failed.is_terminal());
        assert!(ResultStatus::NotEligible.is_terminal());

        assert!(ResultStatus::Failed.is_winner());
        assert!(!ResultStatus::NotEligible.is_winner());
        assert!(!ResultStatus::Pending.is_winner());
    }
}
