//! Per-call selection context passed to rotation strategies.

use std::collections::HashSet;

use uuid::Uuid;

/// Hints scoped to a single logical request: session stickiness, geo
/// targeting, proxies already burned by the current retry sequence, and tag
/// requirements.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    /// Sticks the caller to one proxy across calls with the same id
    pub session_id: Option<String>,
    /// Preferred proxy country (ISO code); takes precedence over region
    pub target_country: Option<String>,
    /// Fallback geo hint when no country match exists
    pub target_region: Option<String>,
    /// Proxies the current retry sequence has already tried
    pub failed_proxy_ids: HashSet<Uuid>,
    /// Tags every candidate must carry (AND semantics)
    pub required_tags: HashSet<String>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn target_country(mut self, country: impl Into<String>) -> Self {
        self.target_country = Some(country.into());
        self
    }

    pub fn target_region(mut self, region: impl Into<String>) -> Self {
        self.target_region = Some(region.into());
        self
    }

    pub fn required_tag(mut self, tag: impl Into<String>) -> Self {
        self.required_tags.insert(tag.into());
        self
    }

    /// Record a proxy as tried-and-failed for this sequence
    pub fn mark_failed(&mut self, proxy_id: Uuid) {
        self.failed_proxy_ids.insert(proxy_id);
    }

    pub fn is_excluded(&self, proxy_id: Uuid) -> bool {
        self.failed_proxy_ids.contains(&proxy_id)
    }
}
