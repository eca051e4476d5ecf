#![cfg(feature = "postgres")]

// Runs against a throwaway database per test; needs DATABASE_URL
use std::sync::Arc;

use sqlx::PgPool;

use onton_raffle::{
    Config, FixedBalances, PgRaffleStore, RaffleError, RaffleService, RaffleStatus, RaffleStore,
    ResultStatus,
};

const TON: i64 = 1;
const EVENT: i64 = 10;
const WALLET: &str = "EQ_EVENT_WALLET";

type Service = RaffleService<PgRaffleStore, FixedBalances>;

// Setup a service over a migrated database seeded with TON and an event wallet
async fn setup(pool: PgPool) -> Service {
    sqlx::query(
        "INSERT INTO raffle_tokens (token_id, symbol, name, decimals, is_native) \
         VALUES ($1, 'TON', 'Toncoin', 9, TRUE)",
    )
    .bind(TON)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO event_wallets (event_id, wallet_address) VALUES ($1, $2)")
        .bind(EVENT)
        .bind(WALLET)
        .execute(&pool)
        .await
        .unwrap();

    let balances = FixedBalances::new().with_ton(WALLET, 1_000_000_000);
    RaffleService::new(Arc::new(PgRaffleStore::new(pool)), Arc::new(balances), Config::default())
}

fn wallet(user_id: i64) -> String {
    format!("UQ_USER_{}", user_id)
}

async fn enter(service: &Service, raffle_id: i64, scores: &[(i64, i64)]) {
    for &(user_id, score) in scores {
        assert!(service
            .record_score(raffle_id, user_id, score, &wallet(user_id))
            .await
            .unwrap());
    }
}

async fn result_id(service: &Service, raffle_id: i64, user_id: i64) -> i64 {
    service.get_score(raffle_id, user_id).await.unwrap().unwrap().id
}

#[sqlx::test(migrations = "./migrations")]
async fn test_one_raffle_per_event(pool: PgPool) {
    let service = setup(pool).await;
    let raffle = service.create_raffle(EVENT, 2, TON).await.unwrap();
    assert_eq!(raffle.status, RaffleStatus::Open);

    assert!(matches!(
        service.create_raffle(EVENT, 3, TON).await.unwrap_err(),
        RaffleError::RaffleAlreadyExists { event_id: EVENT }
    ));
    let by_uuid = service.fetch_raffle_by_uuid(&raffle.uuid).await.unwrap().unwrap();
    assert_eq!(by_uuid.id, raffle.id);
    assert_eq!(by_uuid.eligibility_finalized_at, None);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_duplicate_score_is_ignored(pool: PgPool) {
    let service = setup(pool).await;
    let raffle = service.create_raffle(EVENT, 2, TON).await.unwrap();

    assert!(service.record_score(raffle.id, 1, 10, "UQ_FIRST").await.unwrap());
    assert!(!service.record_score(raffle.id, 1, 99, "UQ_SECOND").await.unwrap());

    let row = service.get_score(raffle.id, 1).await.unwrap().unwrap();
    assert_eq!((row.score, row.wallet_address.as_str()), (10, "UQ_FIRST"));
    assert_eq!(service.count_participants(raffle.id).await.unwrap(), 1);
}

// Ranks go through the batch update and the cut marks min(top_n, participants)
#[sqlx::test(migrations = "./migrations")]
async fn test_ranks_and_final_cut(pool: PgPool) {
    let service = setup(pool).await;
    let raffle = service.create_raffle(EVENT, 3, TON).await.unwrap();
    enter(&service, raffle.id, &[(1, 1), (2, 5), (3, 5), (4, 4), (5, 2)]).await;

    service.compute_ranks(raffle.id).await.unwrap();
    let rows = service.store().scores_by_standing(raffle.id).await.unwrap();
    let ranks: Vec<(i64, Option<u32>)> = rows.iter().map(|r| (r.user_id, r.rank)).collect();
    assert_eq!(
        ranks,
        vec![(2, Some(1)), (3, Some(2)), (4, Some(3)), (5, Some(4)), (1, Some(5))]
    );

    let cut = service.set_eligibility_for_raffle(raffle.id, 3).await.unwrap();
    assert_eq!(cut.eligible.len(), 3);
    assert_eq!(cut.not_eligible.len(), 2);

    let store = service.store();
    assert_eq!(store.count_with_status(raffle.id, ResultStatus::Eligible).await.unwrap(), 3);
    assert_eq!(store.count_with_status(raffle.id, ResultStatus::NotEligible).await.unwrap(), 2);
    assert_eq!(store.count_with_status(raffle.id, ResultStatus::Pending).await.unwrap(), 0);

    let finalized = service.fetch_raffle_by_event(EVENT).await.unwrap().unwrap();
    assert!(finalized.eligibility_finalized_at.is_some());

    assert!(matches!(
        service.record_score(raffle.id, 6, 99, &wallet(6)).await.unwrap_err(),
        RaffleError::EligibilityFinalized
    ));
    assert!(matches!(
        service.set_eligibility_for_raffle(raffle.id, 4).await.unwrap_err(),
        RaffleError::EligibilityFinalized
    ));
    assert_eq!(service.trigger_distribution(raffle.id).await.unwrap(), cut);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_payouts_need_distribution(pool: PgPool) {
    let service = setup(pool).await;
    let raffle = service.create_raffle(EVENT, 1, TON).await.unwrap();
    let entry = service.submit_score(raffle.id, 1, 10, &wallet(1)).await.unwrap();
    let a = entry.result.id;
    assert_eq!(entry.result.status, ResultStatus::Eligible);

    assert!(matches!(
        service.mark_paid(a, 50, "tx-early").await.unwrap_err(),
        RaffleError::RaffleNotDistributing
    ));
    assert!(matches!(
        service.mark_many_paid(&[a], 50, "tx-early").await.unwrap_err(),
        RaffleError::PayoutBatchRejected { requested: 1, updated: 0 }
    ));
    assert!(matches!(
        service.mark_failed(a).await.unwrap_err(),
        RaffleError::RaffleNotDistributing
    ));
    let row = service.store().score_by_id(a).await.unwrap().unwrap();
    assert_eq!((row.status, row.tx_hash), (ResultStatus::Eligible, None));
}

// A second confirmation leaves the first one in place
#[sqlx::test(migrations = "./migrations")]
async fn test_mark_paid_is_write_once(pool: PgPool) {
    let service = setup(pool).await;
    let raffle = service.create_raffle(EVENT, 2, TON).await.unwrap();
    enter(&service, raffle.id, &[(1, 10), (2, 30), (3, 20)]).await;
    service.trigger_distribution(raffle.id).await.unwrap();

    let b = result_id(&service, raffle.id, 2).await;
    service.mark_paid(b, 50, "tx-1").await.unwrap();
    assert!(matches!(
        service.mark_paid(b, 60, "tx-2").await.unwrap_err(),
        RaffleError::NotEligibleForPayout { status: ResultStatus::Paid, .. }
    ));

    let row = service.store().score_by_id(b).await.unwrap().unwrap();
    assert_eq!(row.reward_amount, Some(50));
    assert_eq!(row.tx_hash.as_deref(), Some("tx-1"));

    assert!(matches!(
        service.mark_paid(b, i64::MAX as u64 + 1, "tx-3").await.unwrap_err(),
        RaffleError::InvalidAmount(_)
    ));
}

// One ineligible id rolls back the whole batch
#[sqlx::test(migrations = "./migrations")]
async fn test_mark_many_paid_rolls_back(pool: PgPool) {
    let service = setup(pool).await;
    let raffle = service.create_raffle(EVENT, 2, TON).await.unwrap();
    enter(&service, raffle.id, &[(1, 10), (2, 30), (3, 20)]).await;
    service.trigger_distribution(raffle.id).await.unwrap();

    let a = result_id(&service, raffle.id, 1).await;
    let b = result_id(&service, raffle.id, 2).await;
    let c = result_id(&service, raffle.id, 3).await;

    assert!(matches!(
        service.mark_many_paid(&[b, c, a], 50, "tx-batch").await.unwrap_err(),
        RaffleError::PayoutBatchRejected { requested: 3, updated: 2 }
    ));
    assert_eq!(service.list_eligible(raffle.id).await.unwrap().len(), 2);
    assert_eq!(
        service.store().count_with_status(raffle.id, ResultStatus::Paid).await.unwrap(),
        0
    );

    assert_eq!(service.mark_many_paid(&[b, c], 50, "tx-batch").await.unwrap(), 2);
    let completed = service.complete_raffle(raffle.id).await.unwrap();
    assert_eq!(completed.status, RaffleStatus::Completed);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_prize_pool_bound(pool: PgPool) {
    let service = setup(pool).await;
    let raffle = service.create_raffle(EVENT, 1, TON).await.unwrap();

    assert!(matches!(
        service.set_prize_pool(raffle.id, u64::MAX).await.unwrap_err(),
        RaffleError::InvalidAmount(_)
    ));
    let funded = service.set_prize_pool(raffle.id, i64::MAX as u64).await.unwrap();
    assert_eq!(funded.prize_pool, Some(i64::MAX as u64));
}
