//! Immutable server identity consulted by the command table.

use crate::config::IdentityConfig;
use std::net::IpAddr;

/// Facts about this server instance, frozen before the accept loop starts.
///
/// Built from validated configuration plus the address the listener actually
/// bound to; shared read-only across sessions via `Arc`. Values contain no
/// line breaks (enforced at config load), so each fits a single response
/// line.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub owner: String,
    pub languages: String,
    pub location: String,
    /// Bound address in dotted form, e.g. `127.0.0.1`
    pub address: String,
}

impl ServerIdentity {
    pub fn new(identity: &IdentityConfig, bound_addr: IpAddr) -> Self {
        Self {
            name: identity.name.clone(),
            owner: identity.owner.clone(),
            languages: identity.languages.clone(),
            location: identity.location.clone(),
            address: bound_addr.to_string(),
        }
    }
}
