use thiserror::Error;

use crate::chain::BalanceError;
use crate::raffle_state::{RaffleStatus, ResultStatus};

pub type Result<T> = std::result::Result<T, RaffleError>;

/// Errors that may be returned by the raffle ledger
#[derive(Error, Debug)]
pub enum RaffleError {
    /// Invalid instruction data passed
    #[error("Invalid instruction data")]
    InvalidInstructionData,

    /// No raffle with the given id or uuid
    #[error("Raffle not found")]
    RaffleNotFound,

    /// No score result with the given id
    #[error("Score result {0} not found")]
    ScoreResultNotFound(i64),

    /// The reward token referenced by a raffle does not exist
    #[error("Token {0} not found")]
    TokenNotFound(i64),

    /// The event already owns a raffle
    #[error("Event {event_id} already has a raffle")]
    RaffleAlreadyExists { event_id: i64 },

    /// Winner count outside of the configured bounds
    #[error("Winner count must be between 1 and {max}, got {top_n}")]
    InvalidTopN { top_n: u32, max: u32 },

    /// Raffle no longer accepts scores or setup changes
    #[error("Raffle is not open")]
    RaffleNotOpen,

    /// The final cut was made; entries and the winner count are frozen
    #[error("Eligibility for this raffle is already finalized")]
    EligibilityFinalized,

    /// Payouts are only planned and recorded for a raffle in distribution
    #[error("Raffle is not distributing")]
    RaffleNotDistributing,

    /// Lifecycle transition not allowed from the current status
    #[error("Cannot move raffle from {from} to {to}")]
    InvalidTransition { from: RaffleStatus, to: RaffleStatus },

    /// Raffle cannot be completed while winners are still unpaid
    #[error("{remaining} eligible winners are still awaiting payout")]
    PayoutsOutstanding { remaining: u64 },

    /// Distribution needs at least one participant
    #[error("No participants in raffle")]
    NoParticipants,

    /// Payout outcome recorded against a row that is not eligible
    #[error("Score result {id} is {status}, not eligible for payout")]
    NotEligibleForPayout { id: i64, status: ResultStatus },

    /// Bulk payout touched fewer rows than requested and was rolled back
    #[error("Payout batch rejected: {updated} of {requested} rows were eligible")]
    PayoutBatchRejected { requested: u64, updated: u64 },

    /// Payout confirmation without a transaction hash
    #[error("Payout confirmation is missing its transaction hash")]
    MissingTxHash,

    /// Amount could not be parsed or does not fit the nano unit
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Chain balance lookup failed
    #[error(transparent)]
    Balance(#[from] BalanceError),

    /// Stored data could not be mapped back into the domain model
    #[error("Storage error: {0}")]
    Storage(String),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

