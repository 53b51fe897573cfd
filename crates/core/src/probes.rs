//! `ProbeSet`: the explicit, constructor-injected set of probe adapters a
//! command handler dispatches into (redesign flag: replaces the source's
//! process-wide, import-time-bound probe singleton).
//!
//! The probe adapters themselves (WMI, SSH, SNMP, port scanner, DNS
//! resolver) are out of scope for this crate (spec §1) — each is a pure
//! function from `(target, credentials)` to a result document, supplied by
//! an external collaborator. This module only defines the shape the
//! command handler depends on, so it can be constructed with real adapters
//! in production and stub adapters in tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// A probe target: an address plus whatever credentials the adapter needs.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub address: String,
    pub credentials: Value,
}

/// One probe adapter: `(target) -> result document`. Adapters never fail
/// the caller; a probe failure is itself a successful delivery carrying
/// `{success: false, error: ...}` (spec §7).
#[async_trait]
pub trait ProbeAdapter: Send + Sync {
    async fn probe(&self, target: ProbeTarget) -> Value;
}

/// The full set of adapters a command handler may dispatch a scan/probe
/// action into. Injected once at construction; never a global.
#[derive(Clone)]
pub struct ProbeSet {
    pub wmi: Option<Arc<dyn ProbeAdapter>>,
    pub ssh: Option<Arc<dyn ProbeAdapter>>,
    pub snmp: Option<Arc<dyn ProbeAdapter>>,
    pub port_scanner: Option<Arc<dyn ProbeAdapter>>,
    pub dns_resolver: Option<Arc<dyn ProbeAdapter>>,
}

impl ProbeSet {
    /// A `ProbeSet` with no adapters wired; every probe action reports
    /// "not available" rather than panicking.
    #[must_use]
    pub fn empty() -> Self {
        Self { wmi: None, ssh: None, snmp: None, port_scanner: None, dns_resolver: None }
    }
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self::empty()
    }
}
