//! # Vela Ledger — Custodial Vesting
//!
//! A custodial vesting ledger for a single fungible asset: deposits are
//! taken in on behalf of named beneficiaries, each beneficiary's balance
//! unlocks along a linear-with-cliff schedule, and an administrator may
//! revoke the unvested remainder of a revocable lock back to itself.
//!
//! The crate is the accounting engine only. Moving the asset, deciding
//! who the administrator is, and surfacing events are thin collaborators
//! behind narrow traits:
//!
//! - **[`lock`]** — the per-beneficiary [`Lock`] record and the pure
//!   vesting curve.
//! - **[`store`]** — one lock per beneficiary, inserted once, never
//!   deleted.
//! - **[`custodian`]** — the [`AssetCustodian`] boundary through which
//!   value actually moves, plus an in-memory implementation.
//! - **[`ledger`]** — the [`VestingLedger`] orchestrator: creation,
//!   release, revocation, recovery of misdirected assets.
//! - **[`events`]** — fire-and-forget observation of every state change.
//!
//! ## Design Principles
//!
//! 1. All monetary arithmetic is checked (`checked_add`/`checked_sub`);
//!    the vesting product is widened to `u128` so it cannot wrap.
//! 2. Effects before interactions: internal state is final before any
//!    outbound transfer, and a failed transfer unwinds the whole
//!    operation.
//! 3. A ledger is an explicit value, not a global. Independent instances
//!    coexist, and every time-dependent operation has an `_at` variant
//!    taking an explicit clock, so behavior is deterministic under test.
//! 4. The ledger only ever promises what custody physically holds: a
//!    deposit is recorded at the amount received, not the amount
//!    requested.

pub mod custodian;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lock;
pub mod store;

pub use custodian::{AssetCustodian, AssetId, InMemoryCustodian, TransferError};
pub use error::LedgerError;
pub use events::{EventSink, LedgerEvent, MemorySink, TracingSink};
pub use ledger::VestingLedger;
pub use lock::Lock;
pub use store::LockStore;
