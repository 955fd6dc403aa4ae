//! Entitlement resolution at attach time.
//!
//! The resolver is an external collaborator; the core only consumes the
//! snapshot it produces and caches it on the session. Losing the
//! backend at attach time is fatal for that attach.

use std::collections::HashMap;

use thiserror::Error;

use lingcast_session::Entitlements;

/// Failure to produce an entitlement snapshot.
#[derive(Error, Debug)]
#[error("entitlement resolution failed: {0}")]
pub struct ResolverError(pub String);

/// Produces the entitlement snapshot for a session attach.
#[async_trait::async_trait]
pub trait EntitlementResolver: Send + Sync {
    async fn resolve(
        &self,
        session_id: &str,
        tenant_id: Option<&str>,
    ) -> Result<Entitlements, ResolverError>;
}

/// Config-backed resolver: a default snapshot with per-tenant
/// overrides.
pub struct StaticResolver {
    default: Entitlements,
    tenants: HashMap<String, Entitlements>,
}

impl StaticResolver {
    /// Creates a resolver from configuration.
    pub fn new(default: Entitlements, tenants: HashMap<String, Entitlements>) -> Self {
        Self { default, tenants }
    }
}

#[async_trait::async_trait]
impl EntitlementResolver for StaticResolver {
    async fn resolve(
        &self,
        _session_id: &str,
        tenant_id: Option<&str>,
    ) -> Result<Entitlements, ResolverError> {
        Ok(tenant_id
            .and_then(|tenant| self.tenants.get(tenant))
            .unwrap_or(&self.default)
            .clone())
    }
}
