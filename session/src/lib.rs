//! Session registry and entitlement gate for lingcast.
//!
//! A session is one live event: the unit of orchestration and of listener
//! membership. The registry owns the session map; the entitlement gate is
//! a set of pure assertions over the snapshot cached on each session at
//! attach time.

pub mod entitlements;
pub mod registry;
pub mod segment;

pub use entitlements::{
    Entitlements, GateError, Limits, Role, Subscription, SubscriptionStatus,
    assert_feature_enabled, assert_language_limit, assert_role, assert_subscription_active,
};
pub use registry::{Session, SessionRegistry};
pub use segment::{CommittedSegment, QueuedSegment};
