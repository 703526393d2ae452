//! # Vesting Ledger
//!
//! The orchestrator. A [`VestingLedger`] is an explicit instance, not a
//! global: it owns its lock store, its running `total_locked` counter,
//! and a custodian for exactly one managed asset. Several independent
//! ledgers can coexist, each with its own custody account.
//!
//! ## Operation Discipline
//!
//! Every mutator follows the same shape:
//!
//! 1. authorization and argument validation, before anything changes;
//! 2. internal state committed in full ("effects before interactions");
//! 3. the external custodian transfer, wrapped in the in-transfer flag
//!    so a synchronous re-entry from the transfer fails immediately;
//! 4. on transfer failure, the tentative state is restored and the error
//!    propagates, leaving the operation without effect.
//!
//! The ledger's core invariant, checked by the test suite after every
//! operation: `total_locked` equals the sum of `total_amount -
//! released_amount` over all locks, which in turn equals the custody
//! account's balance of the managed asset.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::custodian::{AssetCustodian, AssetId};
use crate::error::LedgerError;
use crate::events::{EventSink, LedgerEvent, TracingSink};
use crate::lock::Lock;
use crate::store::LockStore;

/// A custodial vesting ledger for a single fungible asset.
pub struct VestingLedger<C: AssetCustodian> {
    /// Instance identity; also names the custody account.
    ledger_id: String,
    /// The one asset this ledger vests. Everything else in custody is
    /// misdirected and only recoverable through the escape hatch.
    asset: AssetId,
    /// The account holding all committed funds at the custodian.
    custody_account: String,
    /// The administrator: may create locks, revoke, and recover
    /// misdirected assets. Refunds from revocation go here.
    admin: String,
    custodian: C,
    store: LockStore,
    /// Running sum of `total_amount - released_amount` over all locks.
    total_locked: u64,
    /// Set for the duration of every custodian call. Guarded mutators
    /// entered while it is set fail with [`LedgerError::ReentrantCall`].
    in_transfer: bool,
    sink: Box<dyn EventSink>,
}

impl<C: AssetCustodian> VestingLedger<C> {
    /// Creates a ledger for `asset`, administered by `admin`, moving value
    /// through `custodian`. Events go to the tracing sink; use
    /// [`with_sink`](Self::with_sink) to substitute another observer.
    pub fn new(asset: &str, admin: &str, custodian: C) -> Self {
        let ledger_id = Uuid::new_v4().to_string();
        let custody_account = format!("custody:{ledger_id}");
        Self {
            ledger_id,
            asset: asset.to_string(),
            custody_account,
            admin: admin.to_string(),
            custodian,
            store: LockStore::new(),
            total_locked: 0,
            in_transfer: false,
            sink: Box::new(TracingSink),
        }
    }

    /// Replaces the event sink. Builder-style, meant for construction time.
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// The asset this ledger manages.
    pub fn managed_asset(&self) -> &str {
        &self.asset
    }

    /// The ledger's instance id.
    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    /// The account at the custodian holding the committed funds.
    pub fn custody_account(&self) -> &str {
        &self.custody_account
    }

    /// The administrator address.
    pub fn admin(&self) -> &str {
        &self.admin
    }

    /// Sum of all unreleased committed amounts.
    pub fn total_locked(&self) -> u64 {
        self.total_locked
    }

    /// The lock for `beneficiary`, if one was ever created.
    pub fn get_lock(&self, beneficiary: &str) -> Option<&Lock> {
        self.store.get(beneficiary)
    }

    /// Audit view: recomputes the outstanding sum from the store. Must
    /// always equal [`total_locked`](Self::total_locked).
    pub fn outstanding_total(&self) -> u64 {
        self.store.outstanding_total()
    }

    /// Amount vested for `beneficiary` at `at`. Zero if no lock exists.
    pub fn vested_amount(&self, beneficiary: &str, at: DateTime<Utc>) -> u64 {
        self.store
            .get(beneficiary)
            .map(|lock| lock.vested_amount(at))
            .unwrap_or(0)
    }

    /// Amount claimable for `beneficiary` right now. Zero if no lock exists.
    pub fn releasable_amount(&self, beneficiary: &str) -> u64 {
        self.releasable_amount_at(beneficiary, Utc::now())
    }

    /// Amount claimable for `beneficiary` at `at`. Zero if no lock exists.
    pub fn releasable_amount_at(&self, beneficiary: &str, at: DateTime<Utc>) -> u64 {
        self.store
            .get(beneficiary)
            .map(|lock| lock.releasable_amount(at))
            .unwrap_or(0)
    }

    /// Read access to the custodian, for balance inspection.
    pub fn custodian(&self) -> &C {
        &self.custodian
    }

    /// Mutable access to the custodian.
    ///
    /// Escape hatch for embedders that own the asset book (seeding
    /// balances, simulating misdirected transfers). Moving the managed
    /// asset out of the custody account through this handle breaks the
    /// ledger's balance invariant.
    pub fn custodian_mut(&mut self) -> &mut C {
        &mut self.custodian
    }

    // -----------------------------------------------------------------
    // create_lock
    // -----------------------------------------------------------------

    /// Creates and funds a lock for `beneficiary`. Admin-only.
    ///
    /// Pulls `requested_amount` from `caller` into custody, but records
    /// the amount custody *actually gained* (custody balance measured
    /// before and after the pull) as the lock's `total_amount`. Assets
    /// that deduct fees in flight therefore never leave the ledger
    /// promising more than it holds. Returns the recorded amount.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] if `caller` is not the admin;
    /// [`LedgerError::InvalidArgument`] on bad schedule parameters or if
    /// the pull delivered nothing; [`LedgerError::DuplicateLock`] if the
    /// beneficiary already has a lock; [`LedgerError::Transfer`] if the
    /// custodian refuses the pull (no state is changed).
    #[allow(clippy::too_many_arguments)]
    pub fn create_lock(
        &mut self,
        caller: &str,
        beneficiary: &str,
        requested_amount: u64,
        start_time: DateTime<Utc>,
        duration_secs: u64,
        cliff_secs: u64,
        revocable: bool,
    ) -> Result<u64, LedgerError> {
        self.require_admin(caller)?;
        self.require_idle()?;

        // Validate everything before funds move, so a failure here needs
        // no unwinding.
        if beneficiary.trim().is_empty() {
            return Err(LedgerError::InvalidArgument {
                reason: "beneficiary must not be empty".to_string(),
            });
        }
        if requested_amount == 0 {
            return Err(LedgerError::InvalidArgument {
                reason: "lock amount must be positive".to_string(),
            });
        }
        if duration_secs == 0 {
            return Err(LedgerError::InvalidArgument {
                reason: "vesting duration must be positive".to_string(),
            });
        }
        if cliff_secs > duration_secs {
            return Err(LedgerError::InvalidArgument {
                reason: "cliff cannot exceed the vesting duration".to_string(),
            });
        }
        if self.store.contains(beneficiary) {
            return Err(LedgerError::DuplicateLock {
                beneficiary: beneficiary.to_string(),
            });
        }
        // The received amount is at most the requested one, so this also
        // guarantees the post-pull counter update cannot overflow.
        if self.total_locked.checked_add(requested_amount).is_none() {
            return Err(LedgerError::AmountOverflow);
        }

        let asset = self.asset.clone();
        let custody = self.custody_account.clone();
        let before = self.custodian.balance_of(&asset, &custody);
        self.guarded_transfer(&asset, caller, &custody, requested_amount)?;
        let after = self.custodian.balance_of(&asset, &custody);

        let actual = after.checked_sub(before).ok_or(LedgerError::AmountOverflow)?;
        if actual == 0 {
            // Custody gained nothing (the asset ate the whole amount in
            // fees), so there is no state to unwind.
            return Err(LedgerError::InvalidArgument {
                reason: "deposit delivered no value to custody".to_string(),
            });
        }
        if actual != requested_amount {
            debug!(
                beneficiary = %beneficiary,
                requested = requested_amount,
                actual,
                "deposit reconciled below requested amount"
            );
        }

        let lock = Lock {
            beneficiary: beneficiary.to_string(),
            total_amount: actual,
            released_amount: 0,
            start_time,
            duration_secs,
            cliff_secs,
            revocable,
            revoked: false,
            created_at: Utc::now(),
        };
        self.store.insert(lock)?;
        self.total_locked = self
            .total_locked
            .checked_add(actual)
            .ok_or(LedgerError::AmountOverflow)?;

        self.sink.record(&LedgerEvent::LockCreated {
            beneficiary: beneficiary.to_string(),
            amount: actual,
            start_time,
            duration_secs,
            cliff_secs,
            revocable,
        });
        Ok(actual)
    }

    // -----------------------------------------------------------------
    // release
    // -----------------------------------------------------------------

    /// Pays out everything currently claimable by `beneficiary`.
    ///
    /// Callable by anyone: the funds always go to the beneficiary, so
    /// nothing is gained by restricting who triggers the payout timing.
    /// Returns the amount released.
    pub fn release(&mut self, beneficiary: &str) -> Result<u64, LedgerError> {
        self.release_at(beneficiary, Utc::now())
    }

    /// [`release`](Self::release) with an explicit clock, for
    /// deterministic callers.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NoLock`] if no lock exists;
    /// [`LedgerError::LockRevoked`] if the lock is revoked and its
    /// residual claim is already settled;
    /// [`LedgerError::NothingToRelease`] if the lock is live but nothing
    /// is claimable yet; [`LedgerError::Transfer`] if the payout fails
    /// (all state restored).
    pub fn release_at(
        &mut self,
        beneficiary: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        self.require_idle()?;

        let (releasable, revoked) = {
            let lock = self.store.get(beneficiary).ok_or_else(|| LedgerError::NoLock {
                beneficiary: beneficiary.to_string(),
            })?;
            (lock.releasable_amount(now), lock.revoked)
        };
        if releasable == 0 {
            // A settled revoked lock will never pay again; a live one is
            // merely ahead of its curve.
            return Err(if revoked {
                LedgerError::LockRevoked {
                    beneficiary: beneficiary.to_string(),
                }
            } else {
                LedgerError::NothingToRelease {
                    beneficiary: beneficiary.to_string(),
                }
            });
        }

        // Commit internal state before the outbound transfer, so a
        // re-entrant call cannot observe a stale releasable amount.
        let prev_total_locked = self.total_locked;
        let prev_released = {
            let lock = self.store.get_mut(beneficiary).ok_or_else(|| LedgerError::NoLock {
                beneficiary: beneficiary.to_string(),
            })?;
            let prev = lock.released_amount;
            lock.released_amount = prev
                .checked_add(releasable)
                .ok_or(LedgerError::AmountOverflow)?;
            prev
        };
        self.total_locked = self
            .total_locked
            .checked_sub(releasable)
            .ok_or(LedgerError::AmountOverflow)?;

        let asset = self.asset.clone();
        let custody = self.custody_account.clone();
        if let Err(err) = self.guarded_transfer(&asset, &custody, beneficiary, releasable) {
            // Whole-operation atomicity: restore the exact prior state.
            if let Some(lock) = self.store.get_mut(beneficiary) {
                lock.released_amount = prev_released;
            }
            self.total_locked = prev_total_locked;
            warn!(
                beneficiary = %beneficiary,
                amount = releasable,
                error = %err,
                "release payout failed, operation rolled back"
            );
            return Err(err.into());
        }

        self.sink.record(&LedgerEvent::Released {
            beneficiary: beneficiary.to_string(),
            amount: releasable,
        });
        Ok(releasable)
    }

    // -----------------------------------------------------------------
    // revoke
    // -----------------------------------------------------------------

    /// Terminates future vesting for `beneficiary` and refunds the
    /// unvested remainder to the administrator. Admin-only.
    pub fn revoke(&mut self, caller: &str, beneficiary: &str) -> Result<u64, LedgerError> {
        self.revoke_at(caller, beneficiary, Utc::now())
    }

    /// [`revoke`](Self::revoke) with an explicit clock.
    ///
    /// Snapshots the vested amount at `now`, shrinks the lock's
    /// `total_amount` to it, and pushes the difference back to the
    /// administrator. `released_amount` is untouched: whatever had
    /// vested but was not yet paid out stays claimable by the
    /// beneficiary through [`release`](Self::release). Returns the
    /// refunded amount.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] if `caller` is not the admin;
    /// [`LedgerError::NoLock`] if no lock exists;
    /// [`LedgerError::NotRevocable`] if the lock was created
    /// non-revocable; [`LedgerError::AlreadyRevoked`] on a second
    /// revoke; [`LedgerError::Transfer`] if the refund fails (all state
    /// restored).
    pub fn revoke_at(
        &mut self,
        caller: &str,
        beneficiary: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        self.require_admin(caller)?;
        self.require_idle()?;

        let (vested, refund, prev_total_amount) = {
            let lock = self.store.get(beneficiary).ok_or_else(|| LedgerError::NoLock {
                beneficiary: beneficiary.to_string(),
            })?;
            if !lock.revocable {
                return Err(LedgerError::NotRevocable {
                    beneficiary: beneficiary.to_string(),
                });
            }
            if lock.revoked {
                return Err(LedgerError::AlreadyRevoked {
                    beneficiary: beneficiary.to_string(),
                });
            }
            let vested = lock.vested_amount(now);
            let refund = lock
                .total_amount
                .checked_sub(vested)
                .ok_or(LedgerError::AmountOverflow)?;
            (vested, refund, lock.total_amount)
        };

        let prev_total_locked = self.total_locked;
        {
            let lock = self.store.get_mut(beneficiary).ok_or_else(|| LedgerError::NoLock {
                beneficiary: beneficiary.to_string(),
            })?;
            lock.revoked = true;
            lock.total_amount = vested;
        }
        self.total_locked = self
            .total_locked
            .checked_sub(refund)
            .ok_or(LedgerError::AmountOverflow)?;

        if refund > 0 {
            let asset = self.asset.clone();
            let custody = self.custody_account.clone();
            let admin = self.admin.clone();
            if let Err(err) = self.guarded_transfer(&asset, &custody, &admin, refund) {
                if let Some(lock) = self.store.get_mut(beneficiary) {
                    lock.revoked = false;
                    lock.total_amount = prev_total_amount;
                }
                self.total_locked = prev_total_locked;
                warn!(
                    beneficiary = %beneficiary,
                    refund,
                    error = %err,
                    "revocation refund failed, operation rolled back"
                );
                return Err(err.into());
            }
        }

        self.sink.record(&LedgerEvent::Revoked {
            beneficiary: beneficiary.to_string(),
            refund,
        });
        Ok(refund)
    }

    // -----------------------------------------------------------------
    // recover_misdirected_asset
    // -----------------------------------------------------------------

    /// Sweeps the custody account's entire balance of a foreign asset to
    /// `to`. Admin-only.
    ///
    /// The managed asset is explicitly rejected: committed vesting funds
    /// can never be drained through this path. Returns the amount swept
    /// (zero when nothing was misdirected).
    pub fn recover_misdirected_asset(
        &mut self,
        caller: &str,
        asset: &str,
        to: &str,
    ) -> Result<u64, LedgerError> {
        self.require_admin(caller)?;
        self.require_idle()?;

        if asset == self.asset {
            return Err(LedgerError::InvalidArgument {
                reason: "cannot recover the managed asset".to_string(),
            });
        }

        let custody = self.custody_account.clone();
        let amount = self.custodian.balance_of(asset, &custody);
        if amount == 0 {
            return Ok(0);
        }

        self.guarded_transfer(asset, &custody, to, amount)?;
        debug!(asset = %asset, to = %to, amount, "misdirected asset recovered");
        Ok(amount)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn require_admin(&self, caller: &str) -> Result<(), LedgerError> {
        if caller != self.admin {
            return Err(LedgerError::Unauthorized {
                caller: caller.to_string(),
            });
        }
        Ok(())
    }

    fn require_idle(&self) -> Result<(), LedgerError> {
        if self.in_transfer {
            return Err(LedgerError::ReentrantCall);
        }
        Ok(())
    }

    /// Runs one custodian transfer with the in-transfer flag set, and
    /// clears the flag on every exit path.
    fn guarded_transfer(
        &mut self,
        asset: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.in_transfer = true;
        let result = self.custodian.transfer(asset, from, to, amount);
        self.in_transfer = false;
        result.map_err(LedgerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custodian::InMemoryCustodian;
    use chrono::TimeZone;

    const ASSET: &str = "asset:VELA";
    const ADMIN: &str = "admin";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(offset_secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(offset_secs)
    }

    fn funded_ledger(admin_balance: u64) -> VestingLedger<InMemoryCustodian> {
        let mut custodian = InMemoryCustodian::new();
        custodian.mint(ASSET, ADMIN, admin_balance).unwrap();
        VestingLedger::new(ASSET, ADMIN, custodian)
    }

    #[test]
    fn non_admin_cannot_create_locks() {
        let mut ledger = funded_ledger(10_000);
        let result =
            ledger.create_lock("mallory", "alice", 1_000, t0(), 1_000, 0, false);
        assert!(matches!(result, Err(LedgerError::Unauthorized { .. })));
        assert!(ledger.get_lock("alice").is_none());
        assert_eq!(ledger.total_locked(), 0);
    }

    #[test]
    fn non_admin_cannot_revoke() {
        let mut ledger = funded_ledger(10_000);
        ledger
            .create_lock(ADMIN, "alice", 1_000, t0(), 1_000, 0, true)
            .unwrap();
        let result = ledger.revoke_at("alice", "alice", at(500));
        assert!(matches!(result, Err(LedgerError::Unauthorized { .. })));
        assert!(!ledger.get_lock("alice").unwrap().revoked);
    }

    #[test]
    fn create_validates_before_moving_funds() {
        let mut ledger = funded_ledger(10_000);
        for result in [
            ledger.create_lock(ADMIN, "", 1_000, t0(), 1_000, 0, false),
            ledger.create_lock(ADMIN, "alice", 0, t0(), 1_000, 0, false),
            ledger.create_lock(ADMIN, "alice", 1_000, t0(), 0, 0, false),
            ledger.create_lock(ADMIN, "alice", 1_000, t0(), 100, 101, false),
        ] {
            assert!(matches!(result, Err(LedgerError::InvalidArgument { .. })));
        }
        // Nothing was pulled by any of the rejected calls.
        assert_eq!(ledger.custodian().balance_of(ASSET, ADMIN), 10_000);
    }

    #[test]
    fn deposit_that_delivers_nothing_is_rejected() {
        let mut custodian = InMemoryCustodian::new();
        custodian.mint(ASSET, ADMIN, 10_000).unwrap();
        custodian.set_transfer_fee_bps(10_000); // 100% fee
        let mut ledger = VestingLedger::new(ASSET, ADMIN, custodian);

        let result = ledger.create_lock(ADMIN, "alice", 1_000, t0(), 1_000, 0, false);
        assert!(matches!(result, Err(LedgerError::InvalidArgument { .. })));
        assert!(ledger.get_lock("alice").is_none());
        assert_eq!(ledger.total_locked(), 0);
    }

    #[test]
    fn counter_overflow_detected_before_the_pull() {
        let mut ledger = funded_ledger(u64::MAX);
        ledger
            .create_lock(ADMIN, "alice", 1, t0(), 1_000, 0, false)
            .unwrap();
        let result =
            ledger.create_lock(ADMIN, "bob", u64::MAX, t0(), 1_000, 0, false);
        assert!(matches!(result, Err(LedgerError::AmountOverflow)));
        assert!(ledger.get_lock("bob").is_none());
        // The rejected call must not have pulled anything.
        assert_eq!(ledger.custodian().balance_of(ASSET, ADMIN), u64::MAX - 1);
    }

    #[test]
    fn mutators_reject_reentry_while_transfer_in_flight() {
        let mut ledger = funded_ledger(10_000);
        ledger
            .create_lock(ADMIN, "alice", 1_000, t0(), 1_000, 0, true)
            .unwrap();

        // Simulate the window during which the custodian call is pending.
        ledger.in_transfer = true;
        assert!(matches!(
            ledger.release_at("alice", at(500)),
            Err(LedgerError::ReentrantCall)
        ));
        assert!(matches!(
            ledger.create_lock(ADMIN, "bob", 1, t0(), 1, 0, false),
            Err(LedgerError::ReentrantCall)
        ));
        assert!(matches!(
            ledger.revoke_at(ADMIN, "alice", at(500)),
            Err(LedgerError::ReentrantCall)
        ));
        assert!(matches!(
            ledger.recover_misdirected_asset(ADMIN, "asset:OTHER", ADMIN),
            Err(LedgerError::ReentrantCall)
        ));
        ledger.in_transfer = false;

        // State is untouched and the ledger still works.
        assert_eq!(ledger.get_lock("alice").unwrap().released_amount, 0);
        assert_eq!(ledger.release_at("alice", at(500)).unwrap(), 500);
    }

    #[test]
    fn failed_release_payout_rolls_back_all_state() {
        let mut ledger = funded_ledger(10_000);
        ledger
            .create_lock(ADMIN, "alice", 1_000, t0(), 1_000, 0, false)
            .unwrap();

        ledger.custodian_mut().fail_next_transfer();
        let result = ledger.release_at("alice", at(500));
        assert!(matches!(result, Err(LedgerError::Transfer(_))));

        // No partial effects anywhere.
        assert_eq!(ledger.get_lock("alice").unwrap().released_amount, 0);
        assert_eq!(ledger.total_locked(), 1_000);
        assert_eq!(ledger.outstanding_total(), 1_000);
        assert_eq!(
            ledger.custodian().balance_of(ASSET, ledger.custody_account()),
            1_000
        );

        // An explicit retry succeeds.
        assert_eq!(ledger.release_at("alice", at(500)).unwrap(), 500);
    }

    #[test]
    fn failed_revoke_refund_rolls_back_all_state() {
        let mut ledger = funded_ledger(10_000);
        ledger
            .create_lock(ADMIN, "alice", 1_000, t0(), 1_000, 0, true)
            .unwrap();

        ledger.custodian_mut().fail_next_transfer();
        let result = ledger.revoke_at(ADMIN, "alice", at(300));
        assert!(matches!(result, Err(LedgerError::Transfer(_))));

        let lock = ledger.get_lock("alice").unwrap();
        assert!(!lock.revoked);
        assert_eq!(lock.total_amount, 1_000);
        assert_eq!(ledger.total_locked(), 1_000);

        // An explicit retry succeeds and refunds the remainder.
        assert_eq!(ledger.revoke_at(ADMIN, "alice", at(300)).unwrap(), 700);
    }

    #[test]
    fn revoke_after_full_vesting_refunds_nothing_but_still_marks_revoked() {
        let mut ledger = funded_ledger(10_000);
        ledger
            .create_lock(ADMIN, "alice", 1_000, t0(), 1_000, 0, true)
            .unwrap();
        let admin_before = ledger.custodian().balance_of(ASSET, ADMIN);

        let refund = ledger.revoke_at(ADMIN, "alice", at(2_000)).unwrap();
        assert_eq!(refund, 0);
        assert!(ledger.get_lock("alice").unwrap().revoked);
        assert_eq!(ledger.custodian().balance_of(ASSET, ADMIN), admin_before);
        // The beneficiary's full claim survives the revoke.
        assert_eq!(ledger.releasable_amount_at("alice", at(2_000)), 1_000);
    }

    #[test]
    fn queries_answer_zero_for_unknown_beneficiaries() {
        let ledger = funded_ledger(0);
        assert_eq!(ledger.vested_amount("nobody", at(1_000)), 0);
        assert_eq!(ledger.releasable_amount_at("nobody", at(1_000)), 0);
        assert!(ledger.get_lock("nobody").is_none());
    }
}
