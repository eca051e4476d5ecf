use serde::{Deserialize, Serialize};

use crate::utils::NANO_PER_TON;

/// Raffle ledger configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Largest winner count an organizer may configure
    pub max_top_n: u32,
    /// Winners paid per external wallet message
    pub payout_chunk_size: u32,
    /// One-off wallet deployment fee
    pub deploy_fee: u64,
    /// External message fee, charged per payout batch
    pub ext_fee: u64,
    /// Internal message fee, charged per winner
    pub int_fee: u64,
    /// Dust left in the wallet after distribution
    pub safety_floor: u64,
    /// Headroom so the wallet does not freeze mid distribution
    pub state_flip_buffer: u64,
    /// TON attached to each jetton transfer
    pub jetton_transfer: u64,
    /// TON forwarded with each jetton transfer notification
    pub jetton_forward: u64,
}

impl Default for Config {
    fn default() -> Self {
        // All fees in nanotons (1 TON = 1,000,000,000 nanotons)
        Self {
            max_top_n: 100,
            payout_chunk_size: 250,
            deploy_fee: NANO_PER_TON / 20,        // 0.05 TON
            ext_fee: NANO_PER_TON / 20,           // 0.05 TON
            int_fee: NANO_PER_TON / 50,           // 0.02 TON
            safety_floor: NANO_PER_TON / 10,      // 0.1 TON
            state_flip_buffer: NANO_PER_TON / 100, // 0.01 TON
            jetton_transfer: NANO_PER_TON / 20,   // 0.05 TON
            jetton_forward: NANO_PER_TON / 100,   // 0.01 TON
        }
    }
}
