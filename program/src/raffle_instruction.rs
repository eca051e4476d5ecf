use borsh::{BorshDeserialize, BorshSerialize};

use crate::raffle_error::{RaffleError, Result};

/// Operations accepted by the raffle processor, borsh encoded
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RaffleInstruction {
    /// Create the raffle of an event
    CreateRaffle {
        event_id: i64,
        /// Number of winners
        top_n: u32,
        /// Reward token
        token_id: i64,
    },

    /// Create the event's raffle, or update it while it is open
    DefineOrUpdate {
        event_id: i64,
        top_n: u32,
        /// Prize pool as a decimal TON amount ("12.5")
        prize_pool_ton: Option<String>,
        token_id: i64,
    },

    /// Record the funded pool size
    SetPrizePool {
        raffle_id: i64,
        /// Pool in the token's smallest unit
        amount: u64,
    },

    /// Insert a participant's score, ignored if already present
    RecordScore {
        raffle_id: i64,
        user_id: i64,
        score: i64,
        wallet_address: String,
    },

    /// Record a score and refresh the provisional standings
    SubmitScore {
        raffle_id: i64,
        user_id: i64,
        score: i64,
        wallet_address: String,
    },

    /// Provisional ranking pass
    ComputeRanks { raffle_id: i64 },

    /// Final eligibility cut under lock
    SetEligibility { raffle_id: i64, top_n: u32 },

    /// Finalize eligibility and start distribution
    TriggerDistribution { raffle_id: i64 },

    /// Record a confirmed transfer to one winner
    MarkPaid {
        result_id: i64,
        amount: u64,
        tx_hash: String,
    },

    /// Record one transfer that paid several winners the same amount
    MarkManyPaid {
        result_ids: Vec<i64>,
        amount: u64,
        tx_hash: String,
    },

    /// Record an abandoned transfer
    MarkFailed { result_id: i64 },

    /// Close a fully paid raffle
    CompleteRaffle { raffle_id: i64 },
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self> {
        Self::try_from_slice(input).map_err(|_| RaffleError::InvalidInstructionData)
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Result<Vec<u8>> {
        self.try_to_vec()
            .map_err(|_| RaffleError::InvalidInstructionData)
    }
}

/// Create create_raffle instruction
pub fn create_raffle(event_id: i64, top_n: u32, token_id: i64) -> Result<Vec<u8>> {
    RaffleInstruction::CreateRaffle {
        event_id,
        top_n,
        token_id,
    }
    .pack()
}

/// Create define_or_update instruction
pub fn define_or_update(
    event_id: i64,
    top_n: u32,
    prize_pool_ton: Option<&str>,
    token_id: i64,
) -> Result<Vec<u8>> {
    RaffleInstruction::DefineOrUpdate {
        event_id,
        top_n,
        prize_pool_ton: prize_pool_ton.map(str::to_string),
        token_id,
    }
    .pack()
}

/// Create set_prize_pool instruction
pub fn set_prize_pool(raffle_id: i64, amount: u64) -> Result<Vec<u8>> {
    RaffleInstruction::SetPrizePool { raffle_id, amount }.pack()
}

/// Create record_score instruction
pub fn record_score(raffle_id: i64, user_id: i64, score: i64, wallet_address: &str) -> Result<Vec<u8>> {
    RaffleInstruction::RecordScore {
        raffle_id,
        user_id,
        score,
        wallet_address: wallet_address.to_string(),
    }
    .pack()
}

/// Create submit_score instruction
pub fn submit_score(raffle_id: i64, user_id: i64, score: i64, wallet_address: &str) -> Result<Vec<u8>> {
    RaffleInstruction::SubmitScore {
        raffle_id,
        user_id,
        score,
        wallet_address: wallet_address.to_string(),
    }
    .pack()
}

/// Create compute_ranks instruction
pub fn compute_ranks(raffle_id: i64) -> Result<Vec<u8>> {
    RaffleInstruction::ComputeRanks { raffle_id }.pack()
}

/// Create set_eligibility instruction
pub fn set_eligibility(raffle_id: i64, top_n: u32) -> Result<Vec<u8>> {
    RaffleInstruction::SetEligibility { raffle_id, top_n }.pack()
}

/// Create trigger_distribution instruction
pub fn trigger_distribution(raffle_id: i64) -> Result<Vec<u8>> {
    RaffleInstruction::TriggerDistribution { raffle_id }.pack()
}

/// Create mark_paid instruction
pub fn mark_paid(result_id: i64, amount: u64, tx_hash: &str) -> Result<Vec<u8>> {
    RaffleInstruction::MarkPaid {
        result_id,
        amount,
        tx_hash: tx_hash.to_string(),
    }
    .pack()
}

/// Create mark_many_paid instruction
pub fn mark_many_paid(result_ids: &[i64], amount: u64, tx_hash: &str) -> Result<Vec<u8>> {
    RaffleInstruction::MarkManyPaid {
        result_ids: result_ids.to_vec(),
        amount,
        tx_hash: tx_hash.to_string(),
    }
    .pack()
}

/// Create mark_failed instruction
pub fn mark_failed(result_id: i64) -> Result<Vec<u8>> {
    RaffleInstruction::MarkFailed { result_id }.pack()
}

/// Create complete_raffle instruction
pub fn complete_raffle(raffle_id: i64) -> Result<Vec<u8>> {
    RaffleInstruction::CompleteRaffle { raffle_id }.pack()
}
