//! In-process store.
//!
//! Every operation runs while holding one async mutex over all tables, which
//! makes each call serializable and all-or-nothing, the same guarantees the
//! relational backend gets from its transactions and row locks.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::raffle_error::{RaffleError, Result};
use crate::raffle_ranker::{final_cut, rank_scores, RankAssignment, RankPass};
use crate::raffle_state::{
    FinalCut, NewScore, Raffle, RafflePatch, RaffleStatus, ResultStatus, ScoreResult, Token,
    UserProfile,
};
use crate::store::RaffleStore;

#[derive(Default)]
struct Tables {
    raffles: BTreeMap<i64, Raffle>,
    scores: BTreeMap<i64, ScoreResult>,
    tokens: HashMap<i64, Token>,
    users: HashMap<i64, UserProfile>,
    wallets: HashMap<i64, String>,
    last_raffle_id: i64,
    last_score_id: i64,
}

impl Tables {
    fn raffle_mut(&mut self, raffle_id: i64) -> Result<&mut Raffle> {
        self.raffles
            .get_mut(&raffle_id)
            .ok_or(RaffleError::RaffleNotFound)
    }

    fn scores_of(&self, raffle_id: i64) -> Vec<ScoreResult> {
        self.scores
            .values()
            .filter(|row| row.raffle_id == raffle_id)
            .cloned()
            .collect()
    }

    /// `eligible` row of a `distributing` raffle
    fn payable(&self, id: i64) -> bool {
        self.scores.get(&id).map_or(false, |row| {
            row.status == ResultStatus::Eligible
                && self
                    .raffles
                    .get(&row.raffle_id)
                    .map_or(false, |r| r.status == RaffleStatus::Distributing)
        })
    }

    fn write_ranks(&mut self, raffle_id: i64, assignments: &[RankAssignment]) {
        for assignment in assignments {
            if let Some(row) = self.scores.get_mut(&assignment.id) {
                if row.raffle_id == raffle_id && !row.status.is_terminal() {
                    row.rank = Some(assignment.rank);
                    row.status = assignment.status;
                }
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_token(&self, token: Token) {
        self.tables.lock().await.tokens.insert(token.id, token);
    }

    pub async fn insert_user(&self, user: UserProfile) {
        self.tables.lock().await.users.insert(user.user_id, user);
    }

    pub async fn set_event_wallet(&self, event_id: i64, address: &str) {
        self.tables
            .lock()
            .await
            .wallets
            .insert(event_id, address.to_string());
    }
}

#[async_trait]
impl RaffleStore for MemoryStore {
    async fn insert_raffle(&self, event_id: i64, top_n: u32, token_id: i64) -> Result<Raffle> {
        let mut tables = self.tables.lock().await;
        if tables.raffles.values().any(|r| r.event_id == event_id) {
            return Err(RaffleError::RaffleAlreadyExists { event_id });
        }

        tables.last_raffle_id += 1;
        let now = Utc::now();
        let raffle = Raffle {
            id: tables.last_raffle_id,
            uuid: Uuid::new_v4(),
            event_id,
            top_n,
            status: RaffleStatus::Open,
            prize_pool: None,
            token_id,
            eligibility_finalized_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.raffles.insert(raffle.id, raffle.clone());
        Ok(raffle)
    }

    async fn raffle_by_id(&self, raffle_id: i64) -> Result<Option<Raffle>> {
        Ok(self.tables.lock().await.raffles.get(&raffle_id).cloned())
    }

    async fn raffle_by_uuid(&self, uuid: &Uuid) -> Result<Option<Raffle>> {
        let tables = self.tables.lock().await;
        Ok(tables.raffles.values().find(|r| &r.uuid == uuid).cloned())
    }

    async fn raffle_by_event(&self, event_id: i64) -> Result<Option<Raffle>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .raffles
            .values()
            .find(|r| r.event_id == event_id)
            .cloned())
    }

    async fn raffles_by_status(&self, status: RaffleStatus) -> Result<Vec<Raffle>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .raffles
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn update_raffle(&self, raffle_id: i64, patch: &RafflePatch) -> Result<Raffle> {
        let mut tables = self.tables.lock().await;
        let raffle = tables.raffle_mut(raffle_id)?;
        if let Some(top_n) = patch.top_n {
            raffle.top_n = top_n;
        }
        if let Some(prize_pool) = patch.prize_pool {
            raffle.prize_pool = Some(prize_pool);
        }
        if let Some(token_id) = patch.token_id {
            raffle.token_id = token_id;
        }
        raffle.updated_at = Utc::now();
        Ok(raffle.clone())
    }

    async fn transition_raffle(
        &self,
        raffle_id: i64,
        from: RaffleStatus,
        to: RaffleStatus,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let raffle = tables.raffle_mut(raffle_id)?;
        if raffle.status != from {
            return Ok(false);
        }
        raffle.status = to;
        raffle.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_score(&self, score: &NewScore) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        tables.raffle_mut(score.raffle_id)?.ensure_accepts_scores()?;
        let exists = tables
            .scores
            .values()
            .any(|row| row.raffle_id == score.raffle_id && row.user_id == score.user_id);
        if exists {
            return Ok(false);
        }

        tables.last_score_id += 1;
        let row = ScoreResult {
            id: tables.last_score_id,
            raffle_id: score.raffle_id,
            user_id: score.user_id,
            score: score.score,
            wallet_address: score.wallet_address.clone(),
            rank: None,
            status: ResultStatus::Pending,
            reward_amount: None,
            tx_hash: None,
            created_at: Utc::now(),
        };
        tables.scores.insert(row.id, row);
        Ok(true)
    }

    async fn score_by_id(&self, id: i64) -> Result<Option<ScoreResult>> {
        Ok(self.tables.lock().await.scores.get(&id).cloned())
    }

    async fn score_for(&self, raffle_id: i64, user_id: i64) -> Result<Option<ScoreResult>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .scores
            .values()
            .find(|row| row.raffle_id == raffle_id && row.user_id == user_id)
            .cloned())
    }

    async fn count_scores(&self, raffle_id: i64) -> Result<u64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .scores
            .values()
            .filter(|row| row.raffle_id == raffle_id)
            .count() as u64)
    }

    async fn scores_by_standing(&self, raffle_id: i64) -> Result<Vec<ScoreResult>> {
        let mut rows = self.tables.lock().await.scores_of(raffle_id);
        rows.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn scores_with_status(
        &self,
        raffle_id: i64,
        status: ResultStatus,
    ) -> Result<Vec<ScoreResult>> {
        let mut rows: Vec<ScoreResult> = self
            .tables
            .lock()
            .await
            .scores_of(raffle_id)
            .into_iter()
            .filter(|row| row.status == status)
            .collect();
        // unranked rows last, like NULLS LAST
        rows.sort_by_key(|row| (row.rank.is_none(), row.rank, row.id));
        Ok(rows)
    }

    async fn count_with_status(&self, raffle_id: i64, status: ResultStatus) -> Result<u64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .scores
            .values()
            .filter(|row| row.raffle_id == raffle_id && row.status == status)
            .count() as u64)
    }

    async fn apply_ranks(&self, raffle_id: i64, assignments: &[RankAssignment]) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.raffle_mut(raffle_id)?.ensure_accepts_scores()?;
        tables.write_ranks(raffle_id, assignments);
        Ok(())
    }

    async fn finalize_eligibility(
        &self,
        raffle_id: i64,
        top_n: u32,
        advance: Option<RaffleStatus>,
    ) -> Result<FinalCut> {
        let mut tables = self.tables.lock().await;
        let raffle = tables.raffle_mut(raffle_id)?;
        let status = raffle.status;
        if raffle.is_finalized() && raffle.top_n != top_n {
            return Err(RaffleError::EligibilityFinalized);
        }
        match advance {
            Some(next) => {
                status.transition(next)?;
            }
            None if !status.accepts_scores() => return Err(RaffleError::RaffleNotOpen),
            None => {}
        }

        let rows = tables.scores_of(raffle_id);
        let assignments = rank_scores(&rows, top_n, RankPass::Final);
        tables.write_ranks(raffle_id, &assignments);

        let now = Utc::now();
        let raffle = tables.raffle_mut(raffle_id)?;
        raffle.top_n = top_n;
        raffle.eligibility_finalized_at.get_or_insert(now);
        if let Some(next) = advance {
            raffle.status = next;
        }
        raffle.updated_at = now;
        Ok(final_cut(&assignments))
    }

    async fn mark_paid(&self, ids: &[i64], amount: u64, tx_hash: &str) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let eligible = ids.iter().filter(|&&id| tables.payable(id)).count() as u64;
        if eligible != ids.len() as u64 {
            return Err(RaffleError::PayoutBatchRejected {
                requested: ids.len() as u64,
                updated: eligible,
            });
        }

        for id in ids {
            if let Some(row) = tables.scores.get_mut(id) {
                row.status = ResultStatus::Paid;
                row.reward_amount = Some(amount);
                row.tx_hash = Some(tx_hash.to_string());
            }
        }
        Ok(eligible)
    }

    async fn mark_failed(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.payable(id) {
            return Ok(false);
        }
        match tables.scores.get_mut(&id) {
            Some(row) => {
                row.status = ResultStatus::Failed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn token_by_id(&self, token_id: i64) -> Result<Option<Token>> {
        Ok(self.tables.lock().await.tokens.get(&token_id).cloned())
    }

    async fn user_profiles(&self, user_ids: &[i64]) -> Result<Vec<UserProfile>> {
        let tables = self.tables.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.users.get(id).cloned())
            .collect())
    }

    async fn event_wallet(&self, event_id: i64) -> Result<Option<String>> {
        Ok(self.tables.lock().await.wallets.get(&event_id).cloned())
    }
}
