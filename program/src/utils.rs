// Amount helpers for nanoton bookkeeping
use crate::raffle_error::{RaffleError, Result};

/// 1 TON = 1,000,000,000 nanotons
pub const NANO_PER_TON: u64 = 1_000_000_000;

/// Largest amount a ledger row can hold (a signed 64-bit column)
pub const MAX_AMOUNT: u64 = i64::MAX as u64;

const NANO_DIGITS: usize = 9;

/// Reject amounts no store can persist
pub fn check_amount(amount: u64) -> Result<u64> {
    if amount > MAX_AMOUNT {
        return Err(RaffleError::InvalidAmount(amount.to_string()));
    }
    Ok(amount)
}

/// Parse a decimal TON amount ("12.5") into nanotons without going through floats
pub fn ton_to_nano(amount: &str) -> Result<u64> {
    let amount = amount.trim();
    let invalid = || RaffleError::InvalidAmount(amount.to_string());

    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > NANO_DIGITS {
        return Err(invalid());
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = NANO_DIGITS);
        padded.parse().map_err(|_| invalid())?
    };

    let nano = whole
        .checked_mul(NANO_PER_TON)
        .and_then(|nano| nano.checked_add(frac))
        .ok_or_else(invalid)?;
    check_amount(nano)
}

/// Equal share of the pool per winner. The remainder stays with the organizer.
pub fn per_user_share(prize_pool: Option<u64>, top_n: u32) -> u64 {
    match prize_pool {
        Some(pool) if top_n > 0 => pool / u64::from(top_n),
        _ => 0,
    }
}

/// Number of wallet messages needed to pay `winners` in chunks of `chunk_size`
pub fn payout_batches(winners: u32, chunk_size: u32) -> u64 {
    let chunk_size = u64::from(chunk_size.max(1));
    (u64::from(winners) + chunk_size - 1) / chunk_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_ton_amounts() {
        assert_eq!(ton_to_nano("1").unwrap(), NANO_PER_TON);
        assert_eq!(ton_to_nano("12.5").unwrap(), 12_500_000_000);
        assert_eq!(ton_to_nano("0.000000001").unwrap(), 1);
        assert_eq!(ton_to_nano(".25").unwrap(), 250_000_000);
        assert_eq!(ton_to_nano(" 3. ").unwrap(), 3 * NANO_PER_TON);
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!(ton_to_nano("").is_err());
        assert!(ton_to_nano(".").is_err());
        assert!(ton_to_nano("-1").is_err());
        assert!(ton_to_nano("1e9").is_err());
        assert!(ton_to_nano("0.0000000001").is_err());
        assert!(ton_to_nano("18446744074").is_err());
        assert!(ton_to_nano("9223372037").is_err());
    }

    #[test]
    fn amounts_fit_a_signed_column() {
        assert_eq!(check_amount(MAX_AMOUNT).unwrap(), MAX_AMOUNT);
        assert!(check_amount(MAX_AMOUNT + 1).is_err());
        assert!(check_amount(u64::MAX).is_err());
    }

    #[test]
    fn share_is_floor_division() {
        assert_eq!(per_user_share(Some(100), 2), 50);
        assert_eq!(per_user_share(Some(101), 2), 50);
        assert_eq!(per_user_share(Some(99), 100), 0);
        assert_eq!(per_user_share(None, 3), 0);
        assert_eq!(per_user_share(Some(10), 0), 0);
    }

    #[test]
    fn batches_round_up() {
        assert_eq!(payout_batches(0, 250), 0);
        assert_eq!(payout_batches(1, 250), 1);
        assert_eq!(payout_batches(250, 250), 1);
        assert_eq!(payout_batches(251, 250), 2);
        assert_eq!(payout_batches(3, 0), 3);
    }
}
