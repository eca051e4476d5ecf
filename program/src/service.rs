use std::sync::Arc;

use crate::chain::BalanceSource;
use crate::config::Config;
use crate::raffle_error::{RaffleError, Result};
use crate::raffle_state::Raffle;
use crate::store::RaffleStore;

/// Entry point for every raffle operation.
///
/// Operations are grouped by concern in `score_ledger`, `raffle_ranker`,
/// `raffle_payout`, `raffle_lifecycle` and `raffle_view`.
pub struct RaffleService<S, B> {
    store: Arc<S>,
    balances: Arc<B>,
    config: Config,
}

impl<S, B> Clone for RaffleService<S, B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            balances: Arc::clone(&self.balances),
            config: self.config,
        }
    }
}

impl<S: RaffleStore, B: BalanceSource> RaffleService<S, B> {
    pub fn new(store: Arc<S>, balances: Arc<B>, config: Config) -> Self {
        Self {
            store,
            balances,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn balances(&self) -> &B {
        &self.balances
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) async fn load_raffle(&self, raffle_id: i64) -> Result<Raffle> {
        self.store
            .raffle_by_id(raffle_id)
            .await?
            .ok_or(RaffleError::RaffleNotFound)
    }
}
