//! Read models for organizers and participants.
//!
//! Monetary amounts leave this module as decimal strings so transports that
//! decode numbers as IEEE-754 doubles cannot lose precision.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::chain::BalanceSource;
use crate::config::Config;
use crate::raffle_error::Result;
use crate::raffle_state::{Raffle, RaffleStatus, ResultStatus, ScoreResult, Token, UserProfile};
use crate::service::RaffleService;
use crate::store::RaffleStore;
use crate::utils::{payout_batches, per_user_share};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaffleView {
    pub id: i64,
    pub uuid: Uuid,
    pub event_id: i64,
    pub top_n: u32,
    pub status: RaffleStatus,
    pub prize_pool: Option<String>,
    pub token_id: i64,
    pub eligibility_finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Raffle> for RaffleView {
    fn from(raffle: &Raffle) -> Self {
        Self {
            id: raffle.id,
            uuid: raffle.uuid,
            event_id: raffle.event_id,
            top_n: raffle.top_n,
            status: raffle.status,
            prize_pool: raffle.prize_pool.map(|p| p.to_string()),
            token_id: raffle.token_id,
            eligibility_finalized_at: raffle.eligibility_finalized_at,
            created_at: raffle.created_at,
            updated_at: raffle.updated_at,
        }
    }
}

/// A participant's own row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreView {
    pub id: i64,
    pub raffle_id: i64,
    pub user_id: i64,
    pub score: i64,
    pub wallet_address: String,
    pub rank: Option<u32>,
    pub status: ResultStatus,
    pub reward_amount: Option<String>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&ScoreResult> for ScoreView {
    fn from(row: &ScoreResult) -> Self {
        Self {
            id: row.id,
            raffle_id: row.raffle_id,
            user_id: row.user_id,
            score: row.score,
            wallet_address: row.wallet_address.clone(),
            rank: row.rank,
            status: row.status,
            reward_amount: row.reward_amount.map(|a| a.to_string()),
            tx_hash: row.tx_hash.clone(),
            created_at: row.created_at,
        }
    }
}

/// Score row joined with the participant's profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinnerView {
    pub user_id: i64,
    pub rank: Option<u32>,
    pub score: i64,
    pub status: ResultStatus,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
    pub reward_amount: Option<String>,
    pub tx_hash: Option<String>,
}

impl WinnerView {
    fn new(row: &ScoreResult, profile: Option<&UserProfile>) -> Self {
        Self {
            user_id: row.user_id,
            rank: row.rank,
            score: row.score,
            status: row.status,
            username: profile.and_then(|p| p.username.clone()),
            first_name: profile.and_then(|p| p.first_name.clone()),
            last_name: profile.and_then(|p| p.last_name.clone()),
            photo_url: profile.and_then(|p| p.photo_url.clone()),
            reward_amount: row.reward_amount.map(|a| a.to_string()),
            tx_hash: row.tx_hash.clone(),
        }
    }
}

/// Payout wallet of the event and its live balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletView {
    pub address: Option<String>,
    pub ton_balance: String,
    /// Balance in the reward token; equals `ton_balance` for the native coin
    pub token_balance: String,
    pub token_wallet_address: Option<String>,
}

/// What the payout wallet must hold before distribution can start
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingReport {
    pub ton_required: String,
    pub token_required: String,
    pub ton_sufficient: bool,
    pub token_sufficient: bool,
    pub funded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizerSummary {
    pub raffle: RaffleView,
    pub token: Token,
    pub wallet: WalletView,
    pub funding: FundingReport,
    pub eligible_count: u64,
    pub per_user_nano: String,
    /// Rows that made the cut, in rank order
    pub winners: Vec<WinnerView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub raffle: RaffleView,
    pub token: Option<Token>,
    pub my: Option<ScoreView>,
    /// Paid winners in rank order, disclosed once the raffle is completed
    pub winners: Vec<WinnerView>,
}

/// Fees and balances needed to pay every winner of `raffle`
pub fn funding_report(
    config: &Config,
    raffle: &Raffle,
    token: &Token,
    ton_balance: u64,
    token_balance: u64,
) -> FundingReport {
    let pool = u128::from(raffle.prize_pool.unwrap_or(0));
    let winners = u128::from(raffle.top_n);
    let batches = u128::from(payout_batches(raffle.top_n, config.payout_chunk_size));

    let reserve = u128::from(config.deploy_fee)
        + u128::from(config.safety_floor)
        + u128::from(config.state_flip_buffer);
    let ton_required = if token.is_native {
        reserve + u128::from(config.ext_fee) * batches + u128::from(config.int_fee) * winners + pool
    } else {
        reserve + (u128::from(config.jetton_transfer) + u128::from(config.jetton_forward)) * winners
    };
    let token_required = pool;

    let ton_sufficient = u128::from(ton_balance) >= ton_required;
    let token_sufficient = u128::from(token_balance) >= token_required;
    FundingReport {
        ton_required: ton_required.to_string(),
        token_required: token_required.to_string(),
        ton_sufficient,
        token_sufficient,
        funded: ton_sufficient && token_sufficient,
    }
}

impl<S: RaffleStore, B: BalanceSource> RaffleService<S, B> {
    /// Organizer dashboard for a raffle. `None` if the uuid or the raffle's
    /// token does not resolve.
    pub async fn get_raffle_summary_for_organizer(&self, uuid: &Uuid) -> Result<Option<OrganizerSummary>> {
        let raffle = match self.store().raffle_by_uuid(uuid).await? {
            Some(raffle) => raffle,
            None => return Ok(None),
        };
        let token = match self.store().token_by_id(raffle.token_id).await? {
            Some(token) => token,
            None => return Ok(None),
        };

        let (wallet, ton_balance, token_balance) = self.wallet_view(raffle.event_id, &token).await?;
        let funding = funding_report(self.config(), &raffle, &token, ton_balance, token_balance);

        let rows: Vec<ScoreResult> = self
            .store()
            .scores_by_standing(raffle.id)
            .await?
            .into_iter()
            .filter(|row| row.status.is_winner())
            .collect();
        let winners = self.join_profiles(&rows).await?;

        debug!(
            "Organizer summary for raffle {}: {} winners, funded={}",
            raffle.id,
            winners.len(),
            funding.funded
        );
        Ok(Some(OrganizerSummary {
            raffle: RaffleView::from(&raffle),
            token,
            wallet,
            funding,
            eligible_count: rows.len() as u64,
            per_user_nano: per_user_share(raffle.prize_pool, raffle.top_n).to_string(),
            winners,
        }))
    }

    /// Participant's view of a raffle. `None` if the uuid does not resolve.
    pub async fn get_user_view(&self, uuid: &Uuid, user_id: i64) -> Result<Option<UserView>> {
        let raffle = match self.store().raffle_by_uuid(uuid).await? {
            Some(raffle) => raffle,
            None => return Ok(None),
        };
        let token = self.store().token_by_id(raffle.token_id).await?;
        let my = self
            .store()
            .score_for(raffle.id, user_id)
            .await?
            .as_ref()
            .map(ScoreView::from);

        let winners = if raffle.status == RaffleStatus::Completed {
            let paid = self
                .store()
                .scores_with_status(raffle.id, ResultStatus::Paid)
                .await?;
            self.join_profiles(&paid).await?
        } else {
            Vec::new()
        };

        Ok(Some(UserView {
            raffle: RaffleView::from(&raffle),
            token,
            my,
            winners,
        }))
    }

    /// Wallet view plus the raw TON and reward-token balances behind it
    async fn wallet_view(&self, event_id: i64, token: &Token) -> Result<(WalletView, u64, u64)> {
        let address = self.store().event_wallet(event_id).await?;
        let ton_balance = match &address {
            Some(address) => self.balances().ton_balance(address).await?,
            None => 0,
        };

        let (token_balance, token_wallet_address) = if token.is_native {
            (ton_balance, address.clone())
        } else {
            match (&address, &token.master_address) {
                (Some(owner), Some(master)) => match self.balances().jetton_balance(owner, master).await? {
                    Some(probe) => (probe.balance, Some(probe.wallet_address)),
                    None => (0, None),
                },
                _ => (0, None),
            }
        };

        let view = WalletView {
            address,
            ton_balance: ton_balance.to_string(),
            token_balance: token_balance.to_string(),
            token_wallet_address,
        };
        Ok((view, ton_balance, token_balance))
    }

    async fn join_profiles(&self, rows: &[ScoreResult]) -> Result<Vec<WinnerView>> {
        let user_ids: Vec<i64> = rows.iter().map(|row| row.user_id).collect();
        let profiles: HashMap<i64, UserProfile> = self
            .store()
            .user_profiles(&user_ids)
            .await?
            .into_iter()
            .map(|p| (p.user_id, p))
            .collect();

        Ok(rows
            .iter()
            .map(|row| WinnerView::new(row, profiles.get(&row.user_id)))
            .collect())
    }
}
