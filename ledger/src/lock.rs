//! # Vesting Lock
//!
//! The [`Lock`] record is the unit of accounting in the ledger: one lock
//! per beneficiary, created once, never deleted. It carries the schedule
//! parameters (start, duration, cliff) alongside the running amounts
//! (total committed, cumulatively released), and exposes the pure vesting
//! math as methods with no side effects.
//!
//! ## Vesting Curve
//!
//! The vested amount at time `t` follows a linear-with-cliff curve:
//!
//! - before `start + cliff`: nothing has vested;
//! - from `start + duration` onward (or once the lock is revoked): the
//!   full `total_amount` has vested;
//! - in between: `total_amount * elapsed / duration`, floored.
//!
//! Integer division truncates toward zero on purpose. The ledger never
//! pays out more than the curve allows, and the truncation error is
//! bounded by one smallest unit of the asset over the whole schedule.
//! The product is computed in `u128`, so no `u64` amount and elapsed
//! span can make it wrap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single beneficiary's vesting position.
///
/// Invariants maintained by the ledger across all operations:
///
/// - `released_amount <= total_amount`, always;
/// - `released_amount` is monotone non-decreasing;
/// - schedule fields (`start_time`, `duration_secs`, `cliff_secs`,
///   `revocable`) are immutable after creation;
/// - `total_amount` shrinks at most once, to the vested snapshot taken
///   by a revoke;
/// - `revoked` flips to `true` at most once and never back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Address of the beneficiary this lock pays out to.
    pub beneficiary: String,
    /// Amount committed to this schedule, in smallest units.
    /// Shrunk exactly once, on revoke, to the vested amount at that moment.
    pub total_amount: u64,
    /// Cumulative amount already transferred out to the beneficiary.
    pub released_amount: u64,
    /// Schedule origin. Vesting is measured from here, not from creation.
    pub start_time: DateTime<Utc>,
    /// Total vesting span in seconds, measured from `start_time`. Always > 0.
    pub duration_secs: u64,
    /// Initial sub-interval of the span during which nothing vests.
    /// Always <= `duration_secs`.
    pub cliff_secs: u64,
    /// Whether the administrator may revoke the unvested remainder.
    pub revocable: bool,
    /// Set by a successful revoke. Terminal.
    pub revoked: bool,
    /// When the lock was created. Audit only, plays no role in the curve.
    pub created_at: DateTime<Utc>,
}

impl Lock {
    /// Returns the amount vested at `now`.
    ///
    /// Pure and total: absent or exhausted state is irrelevant here, the
    /// curve is evaluated as-is. A revoked lock reports its (shrunk)
    /// `total_amount` as fully vested, which is what makes any residual
    /// still owed to the beneficiary claimable after revocation.
    pub fn vested_amount(&self, now: DateTime<Utc>) -> u64 {
        if self.total_amount == 0 {
            return 0;
        }

        let elapsed = (now - self.start_time).num_seconds();
        if elapsed < 0 || (elapsed as u64) < self.cliff_secs {
            return 0;
        }
        let elapsed = elapsed as u64;

        if self.revoked || elapsed >= self.duration_secs {
            return self.total_amount;
        }

        // Both factors fit in u64, so the u128 product cannot wrap. The
        // quotient is strictly below total_amount in the linear region.
        let vested =
            self.total_amount as u128 * elapsed as u128 / self.duration_secs as u128;
        vested as u64
    }

    /// Returns the amount claimable right now: vested minus already released.
    ///
    /// Never underflows: `released_amount` only ever grows by exactly the
    /// releasable amount computed at release time, and `vested_amount` is
    /// non-decreasing for a fixed lock (revocation pins the curve at the
    /// snapshot rather than lowering it below what was already paid).
    /// The `saturating_sub` is belt-and-braces for the impossible case.
    pub fn releasable_amount(&self, now: DateTime<Utc>) -> u64 {
        self.vested_amount(now).saturating_sub(self.released_amount)
    }

    /// Whether every committed unit has been paid out.
    ///
    /// An exhausted lock stays in the store for audit and query; it is
    /// never deleted.
    pub fn is_exhausted(&self) -> bool {
        self.released_amount == self.total_amount
    }

    /// The instant at which the schedule fully vests.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::seconds(self.duration_secs.min(i64::MAX as u64) as i64)
    }
}
