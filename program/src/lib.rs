// ONTON Event Raffles
// Score ledger, top-N eligibility and payout bookkeeping for event raffles

// Core modules
pub mod config;
pub mod raffle_error;
pub mod raffle_state;
pub mod utils;

// Storage and chain seams
pub mod chain;
pub mod memory_store;
#[cfg(feature = "postgres")]
pub mod postgres_store;
pub mod store;

// Raffle modules
pub mod raffle_instruction;
pub mod raffle_lifecycle;
pub mod raffle_payout;
pub mod raffle_processor;
pub mod raffle_ranker;
pub mod raffle_view;
pub mod score_ledger;
pub mod service;

pub use chain::{BalanceError, BalanceSource, FixedBalances};
pub use config::Config;
pub use memory_store::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres_store::PgRaffleStore;
pub use raffle_error::{RaffleError, Result};
pub use raffle_processor::InstructionOutcome;
pub use raffle_state::{RaffleStatus, ResultStatus};
pub use service::RaffleService;
pub use store::RaffleStore;

// All instructions go through a single entrypoint that delegates to the processor
pub async fn process_instruction<S: RaffleStore, B: BalanceSource>(
    service: &RaffleService<S, B>,
    instruction_data: &[u8],
) -> Result<InstructionOutcome> {
    raffle_processor::Processor::process(service, instruction_data).await
}
