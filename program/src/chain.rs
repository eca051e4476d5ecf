// On-chain balance lookups used by the organizer summary
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    /// The chain endpoint could not be reached or returned garbage
    #[error("Balance lookup for {address} failed: {reason}")]
    Unavailable { address: String, reason: String },

    /// The address is not a valid wallet address
    #[error("Invalid wallet address {0}")]
    InvalidAddress(String),
}

/// Balance of a jetton wallet owned by some address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JettonBalance {
    /// Amount in the jetton's smallest unit
    pub balance: u64,
    /// The owner's jetton wallet for this master
    pub wallet_address: String,
}

/// Chain-balance query service
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Native balance of `address`, in nanotons
    async fn ton_balance(&self, address: &str) -> Result<u64, BalanceError>;

    /// Jetton balance of `owner` for the token minted by `master`.
    /// `None` when the owner has no jetton wallet for that master.
    async fn jetton_balance(
        &self,
        owner: &str,
        master: &str,
    ) -> Result<Option<JettonBalance>, BalanceError>;
}

/// Balance source backed by fixed values, for tooling and tests.
/// Unknown addresses have a zero balance unless marked unreachable.
#[derive(Debug, Clone, Default)]
pub struct FixedBalances {
    ton: HashMap<String, u64>,
    jettons: HashMap<(String, String), JettonBalance>,
    unreachable: Vec<String>,
}

impl FixedBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ton(mut self, address: &str, nano: u64) -> Self {
        self.ton.insert(address.to_string(), nano);
        self
    }

    pub fn with_jetton(mut self, owner: &str, master: &str, balance: u64, wallet_address: &str) -> Self {
        self.jettons.insert(
            (owner.to_string(), master.to_string()),
            JettonBalance {
                balance,
                wallet_address: wallet_address.to_string(),
            },
        );
        self
    }

    /// Every lookup for `address` fails with `Unavailable`
    pub fn with_unreachable(mut self, address: &str) -> Self {
        self.unreachable.push(address.to_string());
        self
    }

    fn check_reachable(&self, address: &str) -> Result<(), BalanceError> {
        if self.unreachable.iter().any(|a| a == address) {
            return Err(BalanceError::Unavailable {
                address: address.to_string(),
                reason: "endpoint unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceSource for FixedBalances {
    async fn ton_balance(&self, address: &str) -> Result<u64, BalanceError> {
        if address.is_empty() {
            return Err(BalanceError::InvalidAddress(address.to_string()));
        }
        self.check_reachable(address)?;
        Ok(self.ton.get(address).copied().unwrap_or(0))
    }

    async fn jetton_balance(
        &self,
        owner: &str,
        master: &str,
    ) -> Result<Option<JettonBalance>, BalanceError> {
        self.check_reachable(owner)?;
        Ok(self
            .jettons
            .get(&(owner.to_string(), master.to_string()))
            .cloned())
    }
}
