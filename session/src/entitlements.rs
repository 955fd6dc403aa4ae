//! Entitlement snapshot and admission gate.
//!
//! The snapshot is produced by an external resolver and cached on the
//! session at attach time; the gate only reads it. Assertions are
//! evaluated at request admission; later entitlement changes never void
//! an in-flight stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lingcast_transport::ErrorCode;

/// Entitlement snapshot consumed by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entitlements {
    /// Subscription state.
    pub subscription: Subscription,
    /// Plan limits.
    pub limits: Limits,
    /// Capability name → provider/model. A tier is allowed iff it appears
    /// here as a key.
    #[serde(default)]
    pub routing: HashMap<String, String>,
}

impl Entitlements {
    /// Returns true when the plan's routing table includes `tier`.
    pub fn allows_tier(&self, tier: &str) -> bool {
        self.routing.contains_key(tier)
    }
}

/// Subscription state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subscription {
    /// Billing status.
    pub status: SubscriptionStatus,
}

/// Billing status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In good standing.
    Active,
    /// Payment overdue.
    PastDue,
    /// Cancelled by the tenant.
    Canceled,
    /// Anything we do not recognise.
    #[default]
    Unknown,
}

// Unrecognised statuses must deserialize (to Unknown) rather than fail:
// the resolver's vocabulary grows independently of this crate.
impl<'de> serde::Deserialize<'de> for SubscriptionStatus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let status = String::deserialize(deserializer)?;
        Ok(match status.as_str() {
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Unknown,
        })
    }
}

impl SubscriptionStatus {
    /// Returns the status as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unknown => "unknown",
        }
    }
}

/// Plan limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    /// Maximum number of simultaneously requested target languages.
    pub max_simultaneous_languages: u32,
    /// Feature flags; an absent flag counts as disabled.
    #[serde(default)]
    pub feature_flags: HashMap<String, bool>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_simultaneous_languages: 1,
            feature_flags: HashMap::new(),
        }
    }
}

/// Caller roles, ordered by privilege: a role admits everything a lesser
/// role admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Listener,
    Speaker,
    Moderator,
    Admin,
}

impl Role {
    /// Returns the role as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Listener => "listener",
            Role::Speaker => "speaker",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

/// Result type alias for gate assertions.
pub type GateResult = Result<(), GateError>;

/// Categorised admission failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Subscription is not active. `payment_required` marks the past_due
    /// flavour.
    #[error("subscription is not active (status={status})")]
    SubscriptionInactive {
        status: &'static str,
        payment_required: bool,
    },

    /// More simultaneous languages requested than the plan allows.
    #[error("language limit exceeded: requested {requested}, allowed {allowed}")]
    LanguageLimit { requested: u32, allowed: u32 },

    /// Feature flag absent or false.
    #[error("feature disabled: {0}")]
    FeatureDisabled(String),

    /// Caller role below the required role.
    #[error("role {required} required, caller is {actual}")]
    InsufficientRole {
        required: &'static str,
        actual: &'static str,
    },
}

impl GateError {
    /// Maps the failure to the wire error code a listener observes.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            GateError::SubscriptionInactive { .. } => ErrorCode::SubscriptionInactive,
            GateError::LanguageLimit { .. } => ErrorCode::InvalidRequest,
            GateError::FeatureDisabled(_) => ErrorCode::FeatureDisabled,
            GateError::InsufficientRole { .. } => ErrorCode::InsufficientRole,
        }
    }
}

/// Rejects any subscription status other than active. A past_due status
/// carries the payment-required flavour (HTTP 402 semantics).
pub fn assert_subscription_active(ent: &Entitlements) -> GateResult {
    match ent.subscription.status {
        SubscriptionStatus::Active => Ok(()),
        status => Err(GateError::SubscriptionInactive {
            status: status.as_str(),
            payment_required: status == SubscriptionStatus::PastDue,
        }),
    }
}

/// Rejects when more simultaneous languages are requested than the plan
/// allows.
pub fn assert_language_limit(ent: &Entitlements, requested: u32) -> GateResult {
    let allowed = ent.limits.max_simultaneous_languages;
    if requested > allowed {
        return Err(GateError::LanguageLimit { requested, allowed });
    }
    Ok(())
}

/// Rejects when the named feature flag is absent or false.
pub fn assert_feature_enabled(ent: &Entitlements, name: &str) -> GateResult {
    match ent.limits.feature_flags.get(name) {
        Some(true) => Ok(()),
        _ => Err(GateError::FeatureDisabled(name.to_string())),
    }
}

/// Rejects when the caller's role is below the required role.
pub fn assert_role(actual: Role, required: Role) -> GateResult {
    if actual >= required {
        return Ok(());
    }
    Err(GateError::InsufficientRole {
        required: required.as_str(),
        actual: actual.as_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_ent() -> Entitlements {
        Entitlements {
            subscription: Subscription {
                status: SubscriptionStatus::Active,
            },
            limits: Limits {
                max_simultaneous_languages: 3,
                feature_flags: HashMap::from([("streaming".to_string(), true)]),
            },
            routing: HashMap::from([(
                "elevenlabs_flash".to_string(),
                "elevenlabs".to_string(),
            )]),
        }
    }

    #[test]
    fn test_active_subscription_admits() {
        assert!(assert_subscription_active(&active_ent()).is_ok());
    }

    #[test]
    fn test_past_due_is_payment_required() {
        let mut ent = active_ent();
        ent.subscription.status = SubscriptionStatus::PastDue;

        match assert_subscription_active(&ent).unwrap_err() {
            GateError::SubscriptionInactive {
                payment_required, ..
            } => assert!(payment_required),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_status_rejected_without_payment_flavour() {
        let ent = Entitlements::default();
        match assert_subscription_active(&ent).unwrap_err() {
            GateError::SubscriptionInactive {
                payment_required, ..
            } => assert!(!payment_required),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_language_limit() {
        let ent = active_ent();
        assert!(assert_language_limit(&ent, 3).is_ok());
        assert!(assert_language_limit(&ent, 4).is_err());
    }

    #[test]
    fn test_feature_flag_absent_counts_as_disabled() {
        let ent = active_ent();
        assert!(assert_feature_enabled(&ent, "streaming").is_ok());
        assert!(matches!(
            assert_feature_enabled(&ent, "exports"),
            Err(GateError::FeatureDisabled(_))
        ));
    }

    #[test]
    fn test_role_ordering() {
        assert!(assert_role(Role::Admin, Role::Speaker).is_ok());
        assert!(assert_role(Role::Speaker, Role::Speaker).is_ok());
        assert!(assert_role(Role::Listener, Role::Moderator).is_err());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GateError::FeatureDisabled("x".into()).error_code(),
            ErrorCode::FeatureDisabled
        );
        assert_eq!(
            GateError::InsufficientRole {
                required: "admin",
                actual: "listener"
            }
            .error_code(),
            ErrorCode::InsufficientRole
        );
    }

    #[test]
    fn test_unrecognised_status_parses_as_unknown() {
        let sub: Subscription = serde_json::from_str(r#"{"status": "trialing"}"#).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Unknown);

        let sub: Subscription = serde_json::from_str(r#"{"status": "past_due"}"#).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
    }

    #[test]
    fn test_snapshot_deserialises_wire_shape() {
        let json = r#"{
            "subscription": {"status": "active"},
            "limits": {"maxSimultaneousLanguages": 5, "featureFlags": {"exports": false}},
            "routing": {"chirp3_hd": "google/chirp3"}
        }"#;
        let ent: Entitlements = serde_json::from_str(json).unwrap();
        assert_eq!(ent.limits.max_simultaneous_languages, 5);
        assert!(ent.allows_tier("chirp3_hd"));
        assert!(!ent.allows_tier("studio"));
    }
}
