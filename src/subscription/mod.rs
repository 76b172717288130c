//! The subscription lifecycle engine.
//!
//! `tier` is the pure transition policy, `dedup` derives the at-most-once
//! payment key, `mutator` is the single writer of subscription state, and
//! `quota` gates gun creation and listing on the active-subscription
//! predicate.

pub mod dedup;
pub mod mutator;
pub mod quota;
pub mod tier;

pub use dedup::DedupKey;
pub use mutator::{apply_purchase, cancel, PurchaseOutcome};
pub use quota::{check_gun_creation, limit_gun_listing, GunListing, FREE_TIER_GUN_LIMIT};
pub use tier::{has_active_subscription, plan_upgrade, Tier, TierChange};
