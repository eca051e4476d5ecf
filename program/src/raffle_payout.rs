// Payout state machine: eligible -> paid | failed
//
// Transfers happen elsewhere; this module only records their outcome. Every
// transition is conditional on the row still being `eligible` and its raffle
// being `distributing`, so a repeated or racing confirmation can never
// overwrite an earlier payout.
use log::{info, warn};
use serde::Serialize;

use crate::chain::BalanceSource;
use crate::raffle_error::{RaffleError, Result};
use crate::raffle_state::{RaffleStatus, ResultStatus, ScoreResult};
use crate::service::RaffleService;
use crate::store::RaffleStore;
use crate::utils::{check_amount, per_user_share};

/// One winner to be paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutTarget {
    pub result_id: i64,
    pub rank: Option<u32>,
    pub wallet_address: String,
}

/// Winners of a distributing raffle, chunked for the payment submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutPlan {
    pub raffle_id: i64,
    /// Amount each winner receives, in the token's smallest unit
    pub per_user: u64,
    pub batches: Vec<Vec<PayoutTarget>>,
}

impl PayoutPlan {
    pub fn winner_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

fn validate_confirmation(amount: u64, tx_hash: &str) -> Result<()> {
    if amount == 0 {
        return Err(RaffleError::InvalidAmount(amount.to_string()));
    }
    check_amount(amount)?;
    if tx_hash.trim().is_empty() {
        return Err(RaffleError::MissingTxHash);
    }
    Ok(())
}

impl<S: RaffleStore, B: BalanceSource> RaffleService<S, B> {
    /// Eligible rows of a raffle, ordered by rank
    pub async fn list_eligible(&self, raffle_id: i64) -> Result<Vec<ScoreResult>> {
        self.store()
            .scores_with_status(raffle_id, ResultStatus::Eligible)
            .await
    }

    /// Record a confirmed transfer for one winner of a distributing raffle
    pub async fn mark_paid(&self, result_id: i64, amount: u64, tx_hash: &str) -> Result<ScoreResult> {
        validate_confirmation(amount, tx_hash)?;
        self.ensure_payable(result_id).await.map_err(|e| {
            warn!("Rejected payout for result {}: {}", result_id, e);
            e
        })?;

        match self.store().mark_paid(&[result_id], amount, tx_hash).await {
            Ok(_) => {}
            Err(RaffleError::PayoutBatchRejected { .. }) => {
                // lost a race against another confirmation or a status change
                let err = self.rejection(result_id).await;
                warn!("Rejected payout for result {}: {}", result_id, err);
                return Err(err);
            }
            Err(e) => return Err(e),
        }

        info!("Result {} paid {} in tx {}", result_id, amount, tx_hash);
        self.load_score(result_id).await
    }

    /// Record one on-chain transaction that paid several winners the same
    /// amount. Either every row moves to `paid` or none does.
    pub async fn mark_many_paid(&self, result_ids: &[i64], amount: u64, tx_hash: &str) -> Result<u64> {
        let mut ids = result_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(0);
        }
        validate_confirmation(amount, tx_hash)?;

        let updated = self
            .store()
            .mark_paid(&ids, amount, tx_hash)
            .await
            .map_err(|e| {
                warn!("Rejected payout batch for tx {}: {}", tx_hash, e);
                e
            })?;
        info!("{} results paid {} each in tx {}", updated, amount, tx_hash);
        Ok(updated)
    }

    /// Record an abandoned or rejected transfer
    pub async fn mark_failed(&self, result_id: i64) -> Result<ScoreResult> {
        self.ensure_payable(result_id).await?;
        if !self.store().mark_failed(result_id).await? {
            return Err(self.rejection(result_id).await);
        }

        warn!("Payout for result {} marked failed", result_id);
        self.load_score(result_id).await
    }

    /// Winners still awaiting payment, split into wallet-message sized batches
    pub async fn plan_payout(&self, raffle_id: i64) -> Result<PayoutPlan> {
        let raffle = self.load_raffle(raffle_id).await?;
        if raffle.status != RaffleStatus::Distributing {
            return Err(RaffleError::RaffleNotDistributing);
        }

        let chunk_size = self.config().payout_chunk_size.max(1) as usize;
        let targets: Vec<PayoutTarget> = self
            .list_eligible(raffle.id)
            .await?
            .into_iter()
            .map(|row| PayoutTarget {
                result_id: row.id,
                rank: row.rank,
                wallet_address: row.wallet_address,
            })
            .collect();

        Ok(PayoutPlan {
            raffle_id: raffle.id,
            per_user: per_user_share(raffle.prize_pool, raffle.top_n),
            batches: targets.chunks(chunk_size).map(<[PayoutTarget]>::to_vec).collect(),
        })
    }

    /// The row is `eligible` and its raffle is `distributing`
    async fn ensure_payable(&self, result_id: i64) -> Result<()> {
        let row = self.load_score(result_id).await?;
        if row.status != ResultStatus::Eligible {
            return Err(RaffleError::NotEligibleForPayout {
                id: result_id,
                status: row.status,
            });
        }
        let raffle = self.load_raffle(row.raffle_id).await?;
        if raffle.status != RaffleStatus::Distributing {
            return Err(RaffleError::RaffleNotDistributing);
        }
        Ok(())
    }

    /// Why a conditional payout update touched nothing
    async fn rejection(&self, result_id: i64) -> RaffleError {
        match self.ensure_payable(result_id).await {
            Err(e) => e,
            Ok(()) => RaffleError::Storage(format!("payout update for result {} was not applied", result_id)),
        }
    }

    async fn load_score(&self, result_id: i64) -> Result<ScoreResult> {
        self.store()
            .score_by_id(result_id)
            .await?
            .ok_or(RaffleError::ScoreResultNotFound(result_id))
    }
}
