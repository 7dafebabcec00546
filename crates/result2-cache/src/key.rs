//! Tenant-scoped cache key generation.
//!
//! ## Key Format
//!
//! ```text
//! tenant:{tenant_id}:{raw_key}     when a tenant is present
//! {raw_key}                         global scope
//! ```
//!
//! Keys that already carry a scope marker (`tenant:`, `organization_id:`,
//! `organization:`) are passed through untouched, so formatting is idempotent
//! and callers may pre-scope keys themselves.

use serde::{Deserialize, Serialize};

/// Markers that identify a key as already scoped.
const SCOPE_MARKERS: [&str; 3] = ["tenant:", "organization_id:", "organization:"];

/// Characters with special meaning in a Redis glob pattern.
const GLOB_META: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Ambient per-request identity, inserted into the request extensions by
/// upstream middleware. Read-only to the cache layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: Option<String>,
    pub subject_id: Option<String>,
}

impl TenantContext {
    /// Context with no tenant and no authenticated subject.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            subject_id: None,
        }
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Tenant id, ignoring empty strings.
    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref().filter(|t| !t.is_empty())
    }

    /// Authenticated subject id, ignoring empty strings.
    pub fn subject(&self) -> Option<&str> {
        self.subject_id.as_deref().filter(|s| !s.is_empty())
    }
}

/// Builds deterministic, tenant-scoped cache keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyFormatter;

impl KeyFormatter {
    /// Scope `raw` to the tenant in `ctx`.
    pub fn format(raw: &str, ctx: &TenantContext) -> String {
        if Self::is_scoped(raw) {
            return raw.to_string();
        }
        match ctx.tenant() {
            Some(tenant) => format!("tenant:{tenant}:{raw}"),
            None => raw.to_string(),
        }
    }

    /// Whether `key` already carries a tenant or organization segment.
    pub fn is_scoped(key: &str) -> bool {
        key.contains(':') && SCOPE_MARKERS.iter().any(|m| key.contains(m))
    }

    /// Key for a cached HTTP response.
    ///
    /// `view:{tenant|global}:{subject|anon}:{path}[?{query}]`
    pub fn view_key(ctx: &TenantContext, path: &str, query: Option<&str>) -> String {
        let tenant = ctx.tenant().unwrap_or("global");
        let subject = ctx.subject().unwrap_or("anon");
        let mut key = format!("view:{tenant}:{subject}:{path}");
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            key.push('?');
            key.push_str(q);
        }
        key
    }

    /// Key for a memoized computation, scoped to the tenant when present.
    ///
    /// `[tenant:{id}:]view:{name}:{path}:{query}`
    pub fn memo_key(name: &str, path: &str, query: Option<&str>, ctx: &TenantContext) -> String {
        Self::scoped(format!("view:{name}:{path}:{}", query.unwrap_or("")), ctx)
    }

    /// Prefix the tenant unconditionally.
    ///
    /// Unlike [`format`](Self::format), a scope marker inside `key` is not
    /// trusted, so keys built from request paths stay under the tenant prefix.
    pub fn scoped(key: String, ctx: &TenantContext) -> String {
        match ctx.tenant() {
            Some(tenant) => format!("tenant:{tenant}:{key}"),
            None => key,
        }
    }

    /// Glob pattern matching every key that starts with `prefix` literally.
    pub fn scan_pattern(prefix: &str) -> String {
        let mut pattern = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if GLOB_META.contains(&c) {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('*');
        pattern
    }
}
