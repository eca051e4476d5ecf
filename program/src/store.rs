//! Persistence seam of the raffle ledger.
//!
//! Every method is one database round-trip or one transaction. Backends must
//! give `finalize_eligibility` and `mark_paid` all-or-nothing semantics and
//! must serialize concurrent finalizations of the same raffle.

use async_trait::async_trait;
use uuid::Uuid;

use crate::raffle_error::Result;
use crate::raffle_ranker::RankAssignment;
use crate::raffle_state::{
    FinalCut, NewScore, Raffle, RafflePatch, RaffleStatus, ResultStatus, ScoreResult, Token,
    UserProfile,
};

#[async_trait]
pub trait RaffleStore: Send + Sync {
    /// Insert a new `open` raffle. Fails with `RaffleAlreadyExists` when the
    /// event already owns one.
    async fn insert_raffle(&self, event_id: i64, top_n: u32, token_id: i64) -> Result<Raffle>;

    async fn raffle_by_id(&self, raffle_id: i64) -> Result<Option<Raffle>>;

    async fn raffle_by_uuid(&self, uuid: &Uuid) -> Result<Option<Raffle>>;

    async fn raffle_by_event(&self, event_id: i64) -> Result<Option<Raffle>>;

    async fn raffles_by_status(&self, status: RaffleStatus) -> Result<Vec<Raffle>>;

    /// Apply the provided fields and bump `updated_at`
    async fn update_raffle(&self, raffle_id: i64, patch: &RafflePatch) -> Result<Raffle>;

    /// Set `status = to` only if the raffle is currently `from`.
    /// Returns whether the row changed.
    async fn transition_raffle(&self, raffle_id: i64, from: RaffleStatus, to: RaffleStatus)
        -> Result<bool>;

    /// Insert a score unless the (raffle, user) pair already exists.
    /// Returns whether a row was inserted. Fails with `RaffleNotOpen` if the
    /// raffle left `open` and with `EligibilityFinalized` once the final cut
    /// was made, so no entry slips in behind it.
    async fn insert_score(&self, score: &NewScore) -> Result<bool>;

    async fn score_by_id(&self, id: i64) -> Result<Option<ScoreResult>>;

    async fn score_for(&self, raffle_id: i64, user_id: i64) -> Result<Option<ScoreResult>>;

    async fn count_scores(&self, raffle_id: i64) -> Result<u64>;

    /// All rows of a raffle ordered by score descending, id ascending
    async fn scores_by_standing(&self, raffle_id: i64) -> Result<Vec<ScoreResult>>;

    /// Rows of a raffle in the given status, ordered by rank
    async fn scores_with_status(&self, raffle_id: i64, status: ResultStatus)
        -> Result<Vec<ScoreResult>>;

    async fn count_with_status(&self, raffle_id: i64, status: ResultStatus) -> Result<u64>;

    /// Write provisional ranks. Fails like `insert_score` once the raffle
    /// left `open` or its final cut was made, so a late pass cannot undo it.
    /// Rows in a terminal status keep their rank and status.
    async fn apply_ranks(&self, raffle_id: i64, assignments: &[RankAssignment]) -> Result<()>;

    /// Lock every row of an `open` raffle, recompute the final cut and write
    /// it, recording `top_n` and the finalization time on the raffle. A
    /// repeated cut must use the recorded `top_n` (`EligibilityFinalized`
    /// otherwise). With `advance`, the raffle moves `open -> advance` in the
    /// same transaction.
    async fn finalize_eligibility(
        &self,
        raffle_id: i64,
        top_n: u32,
        advance: Option<RaffleStatus>,
    ) -> Result<FinalCut>;

    /// `eligible -> paid` for every id whose raffle is `distributing`, all or
    /// nothing. Returns the number of rows updated.
    async fn mark_paid(&self, ids: &[i64], amount: u64, tx_hash: &str) -> Result<u64>;

    /// `eligible -> failed` while the raffle is `distributing`.
    /// Returns whether the row changed.
    async fn mark_failed(&self, id: i64) -> Result<bool>;

    async fn token_by_id(&self, token_id: i64) -> Result<Option<Token>>;

    async fn user_profiles(&self, user_ids: &[i64]) -> Result<Vec<UserProfile>>;

    /// Payout wallet configured for an event
    async fn event_wallet(&self, event_id: i64) -> Result<Option<String>>;
}
