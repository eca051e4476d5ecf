//! Postgres backend.
//!
//! Finalization and bulk payouts run inside one transaction each. The raffle
//! row is locked `FOR UPDATE` while a final cut is computed and `FOR SHARE`
//! while scores or provisional ranks are written, so nothing is inserted or
//! re-ranked behind a cut that is being made.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::raffle_error::{RaffleError, Result};
use crate::raffle_ranker::{final_cut, rank_scores, RankAssignment, RankPass};
use crate::raffle_state::{
    FinalCut, NewScore, Raffle, RafflePatch, RaffleStatus, ResultStatus, ScoreResult, Token,
    UserProfile,
};
use crate::store::RaffleStore;

const RAFFLE_COLUMNS: &str = "raffle_id, raffle_uuid, event_id, top_n, status, \
     prize_pool_nanoton, token_id, eligibility_finalized_at, created_at, updated_at";

const RESULT_COLUMNS: &str = "id, raffle_id, user_id, score, wallet_address, rank, status, \
     reward_nanoton, tx_hash, created_at";

#[derive(FromRow)]
struct RaffleRow {
    raffle_id: i64,
    raffle_uuid: Uuid,
    event_id: i64,
    top_n: i32,
    status: String,
    prize_pool_nanoton: Option<i64>,
    token_id: i64,
    eligibility_finalized_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Raffle fields read under a row lock
#[derive(FromRow)]
struct RaffleLock {
    status: String,
    top_n: i32,
    finalized: bool,
}

impl TryFrom<RaffleRow> for Raffle {
    type Error = RaffleError;

    fn try_from(row: RaffleRow) -> Result<Self> {
        Ok(Raffle {
            id: row.raffle_id,
            uuid: row.raffle_uuid,
            event_id: row.event_id,
            top_n: read_u32(row.top_n, "top_n")?,
            status: row.status.parse()?,
            prize_pool: row
                .prize_pool_nanoton
                .map(|p| read_u64(p, "prize_pool_nanoton"))
                .transpose()?,
            token_id: row.token_id,
            eligibility_finalized_at: row.eligibility_finalized_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ResultRow {
    id: i64,
    raffle_id: i64,
    user_id: i64,
    score: i64,
    wallet_address: String,
    rank: Option<i32>,
    status: String,
    reward_nanoton: Option<i64>,
    tx_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResultRow> for ScoreResult {
    type Error = RaffleError;

    fn try_from(row: ResultRow) -> Result<Self> {
        Ok(ScoreResult {
            id: row.id,
            raffle_id: row.raffle_id,
            user_id: row.user_id,
            score: row.score,
            wallet_address: row.wallet_address,
            rank: row.rank.map(|r| read_u32(r, "rank")).transpose()?,
            status: row.status.parse()?,
            reward_amount: row
                .reward_nanoton
                .map(|a| read_u64(a, "reward_nanoton"))
                .transpose()?,
            tx_hash: row.tx_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct TokenRow {
    token_id: i64,
    symbol: String,
    name: String,
    decimals: i16,
    master_address: Option<String>,
    is_native: bool,
    logo_url: Option<String>,
}

impl TryFrom<TokenRow> for Token {
    type Error = RaffleError;

    fn try_from(row: TokenRow) -> Result<Self> {
        Ok(Token {
            id: row.token_id,
            symbol: row.symbol,
            name: row.name,
            decimals: u8::try_from(row.decimals)
                .map_err(|_| RaffleError::Storage(format!("decimals out of range: {}", row.decimals)))?,
            master_address: row.master_address,
            is_native: row.is_native,
            logo_url: row.logo_url,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    photo_url: Option<String>,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        UserProfile {
            user_id: row.user_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            photo_url: row.photo_url,
        }
    }
}

fn read_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| RaffleError::Storage(format!("negative {}: {}", column, value)))
}

fn read_u64(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| RaffleError::Storage(format!("negative {}: {}", column, value)))
}

fn write_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| RaffleError::Storage(format!("{} does not fit INTEGER", value)))
}

fn write_i64(amount: u64) -> Result<i64> {
    i64::try_from(amount).map_err(|_| RaffleError::InvalidAmount(amount.to_string()))
}

fn to_results(rows: Vec<ResultRow>) -> Result<Vec<ScoreResult>> {
    rows.into_iter().map(ScoreResult::try_from).collect()
}

fn to_raffles(rows: Vec<RaffleRow>) -> Result<Vec<Raffle>> {
    rows.into_iter().map(Raffle::try_from).collect()
}

pub struct PgRaffleStore {
    pool: PgPool,
}

impl PgRaffleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Connected to raffle database ({} connections)", max_connections);
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RaffleError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Status, winner count and finalization flag of a raffle, locking its
    /// row for the rest of the transaction
    async fn lock_raffle(
        tx: &mut Transaction<'_, Postgres>,
        raffle_id: i64,
        exclusive: bool,
    ) -> Result<(RaffleStatus, u32, bool)> {
        let sql = if exclusive {
            "SELECT status, top_n, eligibility_finalized_at IS NOT NULL AS finalized \
             FROM event_raffles WHERE raffle_id = $1 FOR UPDATE"
        } else {
            "SELECT status, top_n, eligibility_finalized_at IS NOT NULL AS finalized \
             FROM event_raffles WHERE raffle_id = $1 FOR SHARE"
        };
        let lock: Option<RaffleLock> = sqlx::query_as(sql)
            .bind(raffle_id)
            .fetch_optional(&mut **tx)
            .await?;
        let lock = lock.ok_or(RaffleError::RaffleNotFound)?;
        Ok((lock.status.parse()?, read_u32(lock.top_n, "top_n")?, lock.finalized))
    }

    /// Share-lock an open, unfinalized raffle
    async fn lock_for_entries(tx: &mut Transaction<'_, Postgres>, raffle_id: i64) -> Result<()> {
        let (status, _, finalized) = Self::lock_raffle(tx, raffle_id, false).await?;
        status.ensure_accepts_scores(finalized)
    }

    async fn write_ranks(
        tx: &mut Transaction<'_, Postgres>,
        raffle_id: i64,
        assignments: &[RankAssignment],
    ) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = assignments.iter().map(|a| a.id).collect();
        let ranks = assignments
            .iter()
            .map(|a| write_i32(a.rank))
            .collect::<Result<Vec<i32>>>()?;
        let statuses: Vec<String> = assignments
            .iter()
            .map(|a| a.status.as_str().to_string())
            .collect();

        sqlx::query(
            "UPDATE event_raffle_results AS r \
             SET rank = u.rank, status = u.status \
             FROM UNNEST($2::bigint[], $3::int[], $4::text[]) AS u(id, rank, status) \
             WHERE r.id = u.id AND r.raffle_id = $1 \
               AND r.status NOT IN ('not_eligible', 'paid', 'failed')",
        )
        .bind(raffle_id)
        .bind(&ids)
        .bind(&ranks)
        .bind(&statuses)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RaffleStore for PgRaffleStore {
    async fn insert_raffle(&self, event_id: i64, top_n: u32, token_id: i64) -> Result<Raffle> {
        let sql = format!(
            "INSERT INTO event_raffles (raffle_uuid, event_id, top_n, status, token_id) \
             VALUES ($1, $2, $3, 'open', $4) \
             ON CONFLICT (event_id) DO NOTHING \
             RETURNING {}",
            RAFFLE_COLUMNS
        );
        let row: Option<RaffleRow> = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(event_id)
            .bind(write_i32(top_n)?)
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Raffle::try_from(row),
            None => Err(RaffleError::RaffleAlreadyExists { event_id }),
        }
    }

    async fn raffle_by_id(&self, raffle_id: i64) -> Result<Option<Raffle>> {
        let sql = format!("SELECT {} FROM event_raffles WHERE raffle_id = $1", RAFFLE_COLUMNS);
        let row: Option<RaffleRow> = sqlx::query_as(&sql)
            .bind(raffle_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Raffle::try_from).transpose()
    }

    async fn raffle_by_uuid(&self, uuid: &Uuid) -> Result<Option<Raffle>> {
        let sql = format!("SELECT {} FROM event_raffles WHERE raffle_uuid = $1", RAFFLE_COLUMNS);
        let row: Option<RaffleRow> = sqlx::query_as(&sql)
            .bind(*uuid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Raffle::try_from).transpose()
    }

    async fn raffle_by_event(&self, event_id: i64) -> Result<Option<Raffle>> {
        let sql = format!("SELECT {} FROM event_raffles WHERE event_id = $1", RAFFLE_COLUMNS);
        let row: Option<RaffleRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Raffle::try_from).transpose()
    }

    async fn raffles_by_status(&self, status: RaffleStatus) -> Result<Vec<Raffle>> {
        let sql = format!(
            "SELECT {} FROM event_raffles WHERE status = $1 ORDER BY raffle_id",
            RAFFLE_COLUMNS
        );
        let rows: Vec<RaffleRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        to_raffles(rows)
    }

    async fn update_raffle(&self, raffle_id: i64, patch: &RafflePatch) -> Result<Raffle> {
        let sql = format!(
            "UPDATE event_raffles SET \
                 top_n = COALESCE($2, top_n), \
                 prize_pool_nanoton = COALESCE($3, prize_pool_nanoton), \
                 token_id = COALESCE($4, token_id), \
                 updated_at = now() \
             WHERE raffle_id = $1 \
             RETURNING {}",
            RAFFLE_COLUMNS
        );
        let row: Option<RaffleRow> = sqlx::query_as(&sql)
            .bind(raffle_id)
            .bind(patch.top_n.map(write_i32).transpose()?)
            .bind(patch.prize_pool.map(write_i64).transpose()?)
            .bind(patch.token_id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(RaffleError::RaffleNotFound).and_then(Raffle::try_from)
    }

    async fn transition_raffle(
        &self,
        raffle_id: i64,
        from: RaffleStatus,
        to: RaffleStatus,
    ) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE event_raffles SET status = $3, updated_at = now() \
             WHERE raffle_id = $1 AND status = $2",
        )
        .bind(raffle_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn insert_score(&self, score: &NewScore) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        Self::lock_for_entries(&mut tx, score.raffle_id).await?;

        let done = sqlx::query(
            "INSERT INTO event_raffle_results (raffle_id, user_id, score, wallet_address, status) \
             VALUES ($1, $2, $3, $4, 'pending') \
             ON CONFLICT (raffle_id, user_id) DO NOTHING",
        )
        .bind(score.raffle_id)
        .bind(score.user_id)
        .bind(score.score)
        .bind(&score.wallet_address)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(done.rows_affected() == 1)
    }

    async fn score_by_id(&self, id: i64) -> Result<Option<ScoreResult>> {
        let sql = format!("SELECT {} FROM event_raffle_results WHERE id = $1", RESULT_COLUMNS);
        let row: Option<ResultRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ScoreResult::try_from).transpose()
    }

    async fn score_for(&self, raffle_id: i64, user_id: i64) -> Result<Option<ScoreResult>> {
        let sql = format!(
            "SELECT {} FROM event_raffle_results WHERE raffle_id = $1 AND user_id = $2",
            RESULT_COLUMNS
        );
        let row: Option<ResultRow> = sqlx::query_as(&sql)
            .bind(raffle_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ScoreResult::try_from).transpose()
    }

    async fn count_scores(&self, raffle_id: i64) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_raffle_results WHERE raffle_id = $1")
                .bind(raffle_id)
                .fetch_one(&self.pool)
                .await?;
        read_u64(count, "count")
    }

    async fn scores_by_standing(&self, raffle_id: i64) -> Result<Vec<ScoreResult>> {
        let sql = format!(
            "SELECT {} FROM event_raffle_results WHERE raffle_id = $1 ORDER BY score DESC, id ASC",
            RESULT_COLUMNS
        );
        let rows: Vec<ResultRow> = sqlx::query_as(&sql)
            .bind(raffle_id)
            .fetch_all(&self.pool)
            .await?;
        to_results(rows)
    }

    async fn scores_with_status(
        &self,
        raffle_id: i64,
        status: ResultStatus,
    ) -> Result<Vec<ScoreResult>> {
        let sql = format!(
            "SELECT {} FROM event_raffle_results WHERE raffle_id = $1 AND status = $2 \
             ORDER BY rank ASC NULLS LAST, id ASC",
            RESULT_COLUMNS
        );
        let rows: Vec<ResultRow> = sqlx::query_as(&sql)
            .bind(raffle_id)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        to_results(rows)
    }

    async fn count_with_status(&self, raffle_id: i64, status: ResultStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_raffle_results WHERE raffle_id = $1 AND status = $2",
        )
        .bind(raffle_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        read_u64(count, "count")
    }

    async fn apply_ranks(&self, raffle_id: i64, assignments: &[RankAssignment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::lock_for_entries(&mut tx, raffle_id).await?;
        Self::write_ranks(&mut tx, raffle_id, assignments).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn finalize_eligibility(
        &self,
        raffle_id: i64,
        top_n: u32,
        advance: Option<RaffleStatus>,
    ) -> Result<FinalCut> {
        let mut tx = self.pool.begin().await?;
        let (status, recorded_top_n, finalized) = Self::lock_raffle(&mut tx, raffle_id, true).await?;
        if finalized && recorded_top_n != top_n {
            return Err(RaffleError::EligibilityFinalized);
        }
        match advance {
            Some(next) => {
                status.transition(next)?;
            }
            None if !status.accepts_scores() => return Err(RaffleError::RaffleNotOpen),
            None => {}
        }

        let sql = format!(
            "SELECT {} FROM event_raffle_results WHERE raffle_id = $1 \
             ORDER BY score DESC, id ASC FOR UPDATE",
            RESULT_COLUMNS
        );
        let rows: Vec<ResultRow> = sqlx::query_as(&sql)
            .bind(raffle_id)
            .fetch_all(&mut *tx)
            .await?;
        let rows = to_results(rows)?;

        let assignments = rank_scores(&rows, top_n, RankPass::Final);
        Self::write_ranks(&mut tx, raffle_id, &assignments).await?;

        let next = advance.unwrap_or(status);
        sqlx::query(
            "UPDATE event_raffles SET status = $2, top_n = $3, \
                 eligibility_finalized_at = COALESCE(eligibility_finalized_at, now()), \
                 updated_at = now() \
             WHERE raffle_id = $1",
        )
        .bind(raffle_id)
        .bind(next.as_str())
        .bind(write_i32(top_n)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Final cut written for raffle {} ({} rows)", raffle_id, rows.len());
        Ok(final_cut(&assignments))
    }

    async fn mark_paid(&self, ids: &[i64], amount: u64, tx_hash: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query(
            "UPDATE event_raffle_results AS r \
             SET status = 'paid', reward_nanoton = $2, tx_hash = $3 \
             FROM event_raffles AS e \
             WHERE r.id = ANY($1) AND r.status = 'eligible' \
               AND e.raffle_id = r.raffle_id AND e.status = 'distributing'",
        )
        .bind(ids)
        .bind(write_i64(amount)?)
        .bind(tx_hash)
        .execute(&mut *tx)
        .await?;

        let updated = done.rows_affected();
        if updated != ids.len() as u64 {
            tx.rollback().await?;
            return Err(RaffleError::PayoutBatchRejected {
                requested: ids.len() as u64,
                updated,
            });
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn mark_failed(&self, id: i64) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE event_raffle_results AS r SET status = 'failed' \
             FROM event_raffles AS e \
             WHERE r.id = $1 AND r.status = 'eligible' \
               AND e.raffle_id = r.raffle_id AND e.status = 'distributing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn token_by_id(&self, token_id: i64) -> Result<Option<Token>> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT token_id, symbol, name, decimals, master_address, is_native, logo_url \
             FROM raffle_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Token::try_from).transpose()
    }

    async fn user_profiles(&self, user_ids: &[i64]) -> Result<Vec<UserProfile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT user_id, username, first_name, last_name, photo_url \
             FROM users WHERE user_id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn event_wallet(&self, event_id: i64) -> Result<Option<String>> {
        let address: Option<String> =
            sqlx::query_scalar("SELECT wallet_address FROM event_wallets WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(address)
    }
}
