// Score ledger: one row per (raffle, participant), first submission wins
use log::debug;
use serde::Serialize;

use crate::chain::BalanceSource;
use crate::raffle_error::{RaffleError, Result};
use crate::raffle_state::{NewScore, ScoreResult};
use crate::service::RaffleService;
use crate::store::RaffleStore;

/// Result of a participant's entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSubmission {
    /// The participant had already entered; nothing was written
    pub already_played: bool,
    /// The participant's row as stored after the entry
    pub result: ScoreResult,
}

impl<S: RaffleStore, B: BalanceSource> RaffleService<S, B> {
    /// Insert a score for a participant. A second submission for the same
    /// (raffle, participant) pair is ignored and returns `false`.
    pub async fn record_score(
        &self,
        raffle_id: i64,
        user_id: i64,
        score: i64,
        wallet_address: &str,
    ) -> Result<bool> {
        let raffle = self.load_raffle(raffle_id).await?;
        raffle.ensure_accepts_scores()?;

        let inserted = self
            .store()
            .insert_score(&NewScore {
                raffle_id: raffle.id,
                user_id,
                score,
                wallet_address: wallet_address.to_string(),
            })
            .await?;

        if inserted {
            debug!("Recorded score {} for user {} in raffle {}", score, user_id, raffle.id);
        } else {
            debug!("User {} already entered raffle {}, score ignored", user_id, raffle.id);
        }
        Ok(inserted)
    }

    pub async fn get_score(&self, raffle_id: i64, user_id: i64) -> Result<Option<ScoreResult>> {
        self.store().score_for(raffle_id, user_id).await
    }

    pub async fn count_participants(&self, raffle_id: i64) -> Result<u64> {
        self.store().count_scores(raffle_id).await
    }

    /// Record a participant's entry and refresh the provisional standings
    pub async fn submit_score(
        &self,
        raffle_id: i64,
        user_id: i64,
        score: i64,
        wallet_address: &str,
    ) -> Result<ScoreSubmission> {
        if let Some(existing) = self.get_score(raffle_id, user_id).await? {
            return Ok(ScoreSubmission {
                already_played: true,
                result: existing,
            });
        }

        let inserted = self
            .record_score(raffle_id, user_id, score, wallet_address)
            .await?;
        if inserted {
            self.compute_ranks(raffle_id).await?;
        }

        let result = self
            .get_score(raffle_id, user_id)
            .await?
            .ok_or_else(|| RaffleError::Storage(format!("score for user {} vanished", user_id)))?;
        Ok(ScoreSubmission {
            already_played: !inserted,
            result,
        })
    }
}
