// Raffle lifecycle: open -> distributing -> completed
use log::{debug, info, warn};
use uuid::Uuid;

use crate::chain::BalanceSource;
use crate::raffle_error::{RaffleError, Result};
use crate::raffle_state::{FinalCut, Raffle, RafflePatch, RaffleStatus, ResultStatus};
use crate::service::RaffleService;
use crate::store::RaffleStore;
use crate::utils::check_amount;

impl<S: RaffleStore, B: BalanceSource> RaffleService<S, B> {
    /// Create the raffle of an event. An event owns at most one raffle.
    pub async fn create_raffle(&self, event_id: i64, top_n: u32, token_id: i64) -> Result<Raffle> {
        self.validate_top_n(top_n)?;
        self.ensure_token(token_id).await?;

        let raffle = self.store().insert_raffle(event_id, top_n, token_id).await?;
        info!(
            "Raffle created: id={}, uuid={}, event={}, top_n={}, token={}",
            raffle.id, raffle.uuid, event_id, top_n, token_id
        );
        Ok(raffle)
    }

    /// Create the event's raffle if it has none, otherwise update its winner
    /// count, prize pool and token while it is open and not yet finalized.
    pub async fn define_or_update(
        &self,
        event_id: i64,
        top_n: u32,
        prize_pool: Option<u64>,
        token_id: i64,
    ) -> Result<Raffle> {
        let prize_pool = prize_pool.map(check_amount).transpose()?;
        let existing = match self.store().raffle_by_event(event_id).await? {
            Some(existing) => existing,
            None => {
                let raffle = self.create_raffle(event_id, top_n, token_id).await?;
                return match prize_pool {
                    Some(amount) => self.set_prize_pool(raffle.id, amount).await,
                    None => Ok(raffle),
                };
            }
        };

        existing.ensure_accepts_scores()?;
        self.validate_top_n(top_n)?;

        let mut patch = RafflePatch::default();
        if existing.top_n != top_n {
            patch.top_n = Some(top_n);
        }
        if prize_pool.is_some() && prize_pool != existing.prize_pool {
            patch.prize_pool = prize_pool;
        }
        if existing.token_id != token_id {
            self.ensure_token(token_id).await?;
            patch.token_id = Some(token_id);
        }

        if patch.is_empty() {
            return Ok(existing);
        }
        let raffle = self.store().update_raffle(existing.id, &patch).await?;
        info!("Raffle {} updated: {:?}", raffle.id, patch);
        Ok(raffle)
    }

    pub async fn fetch_raffle_by_uuid(&self, uuid: &Uuid) -> Result<Option<Raffle>> {
        self.store().raffle_by_uuid(uuid).await
    }

    pub async fn fetch_raffle_by_event(&self, event_id: i64) -> Result<Option<Raffle>> {
        self.store().raffle_by_event(event_id).await
    }

    pub async fn list_by_status(&self, status: RaffleStatus) -> Result<Vec<Raffle>> {
        self.store().raffles_by_status(status).await
    }

    /// Record the funded pool size, in the token's smallest unit. Allowed in
    /// any lifecycle state.
    pub async fn set_prize_pool(&self, raffle_id: i64, amount: u64) -> Result<Raffle> {
        let patch = RafflePatch {
            prize_pool: Some(check_amount(amount)?),
            ..RafflePatch::default()
        };
        let raffle = self.store().update_raffle(raffle_id, &patch).await?;
        info!("Raffle {} prize pool set to {}", raffle_id, amount);
        Ok(raffle)
    }

    /// Freeze the eligible set and move `open -> distributing`, atomically.
    pub async fn trigger_distribution(&self, raffle_id: i64) -> Result<FinalCut> {
        let raffle = self.load_raffle(raffle_id).await?;
        raffle.status.transition(RaffleStatus::Distributing)?;

        if self.count_participants(raffle.id).await? == 0 {
            return Err(RaffleError::NoParticipants);
        }

        let cut = self
            .store()
            .finalize_eligibility(raffle.id, raffle.top_n, Some(RaffleStatus::Distributing))
            .await?;
        info!(
            "Raffle {} distributing to {} winners ({} participants)",
            raffle.id,
            cut.eligible.len(),
            cut.participants()
        );
        Ok(cut)
    }

    /// `distributing -> completed`, once no winner is left in `eligible`
    pub async fn complete_raffle(&self, raffle_id: i64) -> Result<Raffle> {
        let raffle = self.load_raffle(raffle_id).await?;
        raffle.status.transition(RaffleStatus::Completed)?;

        let remaining = self
            .store()
            .count_with_status(raffle.id, ResultStatus::Eligible)
            .await?;
        if remaining > 0 {
            warn!("Raffle {} cannot complete: {} unpaid winners", raffle.id, remaining);
            return Err(RaffleError::PayoutsOutstanding { remaining });
        }

        let moved = self
            .store()
            .transition_raffle(raffle.id, RaffleStatus::Distributing, RaffleStatus::Completed)
            .await?;
        let current = self.load_raffle(raffle.id).await?;
        if !moved {
            return Err(RaffleError::InvalidTransition {
                from: current.status,
                to: RaffleStatus::Completed,
            });
        }

        info!("Raffle {} completed", raffle.id);
        Ok(current)
    }

    pub(crate) fn validate_top_n(&self, top_n: u32) -> Result<()> {
        let max = self.config().max_top_n;
        if top_n == 0 || top_n > max {
            return Err(RaffleError::InvalidTopN { top_n, max });
        }
        Ok(())
    }

    async fn ensure_token(&self, token_id: i64) -> Result<()> {
        if self.store().token_by_id(token_id).await?.is_none() {
            debug!("Unknown reward token {}", token_id);
            return Err(RaffleError::TokenNotFound(token_id));
        }
        Ok(())
    }
}
