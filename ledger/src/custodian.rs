//! # Asset Custodian
//!
//! The custodian is the boundary through which value actually moves.
//! The ledger never touches balances directly: deposits are pulled from
//! the funder into the ledger's custody account, payouts are pushed from
//! custody to the recipient, and both go through the [`AssetCustodian`]
//! trait. Any failure signal from the custodian aborts the enclosing
//! ledger operation as a unit.
//!
//! [`InMemoryCustodian`] is the deterministic implementation used in
//! tests and by embedders that keep the asset book in process. It can
//! simulate the two awkward behaviors real assets exhibit:
//!
//! - **transfer fees**: a basis-point fee deducted in flight, so the
//!   amount received differs from the amount sent (the ledger reconciles
//!   against the received amount, never the requested one);
//! - **hard failures**: a one-shot fail switch, so callers can verify
//!   that a failed transfer unwinds the whole operation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Identifies an asset managed by a custodian. Free-form string, the
/// ledger only ever compares it for equality.
pub type AssetId = String;

/// Errors surfaced by a custodian when a transfer cannot complete.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The sending account does not hold enough of the asset.
    #[error("insufficient balance: {holder} has {balance}, tried to move {amount}")]
    InsufficientBalance {
        /// The account that was debited.
        holder: String,
        /// Its balance at the time of the attempt.
        balance: u64,
        /// The amount the caller tried to move.
        amount: u64,
    },

    /// Crediting the recipient would overflow its balance.
    #[error("balance overflow crediting {holder}")]
    BalanceOverflow {
        /// The account that was being credited.
        holder: String,
    },

    /// The asset itself refused the transfer.
    #[error("transfer rejected: {reason}")]
    Rejected {
        /// Whatever the asset reported.
        reason: String,
    },
}

/// The deposit/withdraw boundary consumed by the ledger.
///
/// Implementations move value between named accounts. The ledger treats
/// `Err` from any method as a hard abort of the operation in progress;
/// it never retries on its own.
pub trait AssetCustodian {
    /// Returns `holder`'s balance of `asset`, or 0 for unknown accounts.
    fn balance_of(&self, asset: &str, holder: &str) -> u64;

    /// Moves `amount` of `asset` from `from` to `to`.
    ///
    /// The amount actually credited to `to` may be smaller than `amount`
    /// (fee-on-transfer assets); callers that care must measure the
    /// recipient's balance before and after.
    fn transfer(&mut self, asset: &str, from: &str, to: &str, amount: u64)
        -> Result<(), TransferError>;
}

/// In-process asset book: per-asset, per-account balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCustodian {
    /// `asset -> (account -> balance)`.
    balances: HashMap<AssetId, HashMap<String, u64>>,
    /// Fee deducted from every transfer, in basis points (1 bp = 0.01%).
    /// The fee is burned, not redirected.
    fee_bps: u32,
    /// When set, the next transfer fails with [`TransferError::Rejected`]
    /// and the flag clears.
    #[serde(skip)]
    fail_next: bool,
}

impl InMemoryCustodian {
    /// Creates an empty custodian with no fee.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `holder` with freshly issued units of `asset`.
    pub fn mint(&mut self, asset: &str, holder: &str, amount: u64) -> Result<(), TransferError> {
        let book = self.balances.entry(asset.to_string()).or_default();
        let balance = book.entry(holder.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(TransferError::BalanceOverflow {
                holder: holder.to_string(),
            })?;
        Ok(())
    }

    /// Sets the in-flight transfer fee. Capped at 10,000 bps (100%).
    pub fn set_transfer_fee_bps(&mut self, bps: u32) {
        self.fee_bps = bps.min(10_000);
    }

    /// Arms the one-shot fail switch: the next transfer is rejected.
    pub fn fail_next_transfer(&mut self) {
        self.fail_next = true;
    }
}

impl AssetCustodian for InMemoryCustodian {
    fn balance_of(&self, asset: &str, holder: &str) -> u64 {
        self.balances
            .get(asset)
            .and_then(|book| book.get(holder))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), TransferError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(TransferError::Rejected {
                reason: "asset refused the transfer".to_string(),
            });
        }

        let balance = self.balance_of(asset, from);
        if balance < amount {
            return Err(TransferError::InsufficientBalance {
                holder: from.to_string(),
                balance,
                amount,
            });
        }

        // Fee is taken out of the moved amount, floored.
        let fee = (amount as u128 * self.fee_bps as u128 / 10_000) as u64;
        let credited = amount - fee;

        let book = self.balances.entry(asset.to_string()).or_default();

        // Compute the recipient's new balance before mutating anything,
        // so an overflow rejects the transfer with both accounts intact.
        let to_balance = if to == from {
            balance - amount
        } else {
            book.get(to).copied().unwrap_or(0)
        };
        let new_to_balance =
            to_balance
                .checked_add(credited)
                .ok_or(TransferError::BalanceOverflow {
                    holder: to.to_string(),
                })?;

        if let Some(b) = book.get_mut(from) {
            *b -= amount; // checked against `balance` above
        }
        book.insert(to.to_string(), new_to_balance);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = "asset:TEST";

    #[test]
    fn mint_credits_balance() {
        let mut c = InMemoryCustodian::new();
        c.mint(ASSET, "alice", 1_000).unwrap();
        assert_eq!(c.balance_of(ASSET, "alice"), 1_000);
        assert_eq!(c.balance_of(ASSET, "bob"), 0);
        assert_eq!(c.balance_of("asset:OTHER", "alice"), 0);
    }

    #[test]
    fn transfer_moves_full_amount_without_fee() {
        let mut c = InMemoryCustodian::new();
        c.mint(ASSET, "alice", 1_000).unwrap();
        c.transfer(ASSET, "alice", "bob", 400).unwrap();
        assert_eq!(c.balance_of(ASSET, "alice"), 600);
        assert_eq!(c.balance_of(ASSET, "bob"), 400);
    }

    #[test]
    fn transfer_more_than_balance_rejected() {
        let mut c = InMemoryCustodian::new();
        c.mint(ASSET, "alice", 100).unwrap();
        let result = c.transfer(ASSET, "alice", "bob", 200);
        assert!(matches!(
            result,
            Err(TransferError::InsufficientBalance { balance: 100, amount: 200, .. })
        ));
        assert_eq!(c.balance_of(ASSET, "alice"), 100);
    }

    #[test]
    fn fee_is_deducted_in_flight() {
        let mut c = InMemoryCustodian::new();
        c.set_transfer_fee_bps(100); // 1%
        c.mint(ASSET, "alice", 10_000).unwrap();
        c.transfer(ASSET, "alice", "bob", 10_000).unwrap();
        assert_eq!(c.balance_of(ASSET, "alice"), 0);
        assert_eq!(c.balance_of(ASSET, "bob"), 9_900);
    }

    #[test]
    fn overflowing_credit_rejects_without_touching_the_sender() {
        let mut c = InMemoryCustodian::new();
        c.mint(ASSET, "alice", 100).unwrap();
        c.mint(ASSET, "bob", u64::MAX).unwrap();

        let result = c.transfer(ASSET, "alice", "bob", 100);
        assert!(matches!(result, Err(TransferError::BalanceOverflow { .. })));

        // No partial write: the debit must not survive the failed credit.
        assert_eq!(c.balance_of(ASSET, "alice"), 100);
        assert_eq!(c.balance_of(ASSET, "bob"), u64::MAX);
    }

    #[test]
    fn self_transfer_only_burns_the_fee() {
        let mut c = InMemoryCustodian::new();
        c.set_transfer_fee_bps(1_000); // 10%
        c.mint(ASSET, "alice", 1_000).unwrap();
        c.transfer(ASSET, "alice", "alice", 1_000).unwrap();
        assert_eq!(c.balance_of(ASSET, "alice"), 900);
    }

    #[test]
    fn fail_switch_rejects_exactly_one_transfer() {
        let mut c = InMemoryCustodian::new();
        c.mint(ASSET, "alice", 1_000).unwrap();
        c.fail_next_transfer();
        assert!(c.transfer(ASSET, "alice", "bob", 100).is_err());
        // Nothing moved, and the switch has cleared.
        assert_eq!(c.balance_of(ASSET, "alice"), 1_000);
        c.transfer(ASSET, "alice", "bob", 100).unwrap();
        assert_eq!(c.balance_of(ASSET, "bob"), 100);
    }
}
