use std::collections::HashMap;

use crate::types::Candidate;

#[derive(Debug, Clone)]
struct CachedCandidates {
    candidates: Vec<Candidate>,
    stored_at_ms: u64,
}

/// What is left after filtering the cache for a retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryCandidates {
    /// Nothing cached, or the cache is older than the timeout.
    Expired,
    /// The filter removed nothing; retrying would pick the same candidate.
    Unchanged,
    Remaining(Vec<Candidate>),
}

/// Last scan's candidates per interface, kept briefly so a failed attempt
/// can move on without rescanning.
#[derive(Debug, Clone)]
pub struct CandidateCache {
    timeout_ms: u64,
    by_iface: HashMap<String, CachedCandidates>,
}

impl CandidateCache {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            by_iface: HashMap::new(),
        }
    }

    pub fn store(&mut self, iface: &str, candidates: Vec<Candidate>, now_ms: u64) {
        self.by_iface.insert(
            iface.to_string(),
            CachedCandidates {
                candidates,
                stored_at_ms: now_ms,
            },
        );
    }

    pub fn get(&self, iface: &str) -> Option<&[Candidate]> {
        self.by_iface.get(iface).map(|c| c.candidates.as_slice())
    }

    /// Applies `keep` to the cached list of `iface`. Expired or empty
    /// caches are dropped.
    pub fn retain_for_retry<F>(&mut self, iface: &str, now_ms: u64, keep: F) -> RetryCandidates
    where
        F: FnMut(&Candidate) -> bool,
    {
        let fresh = self
            .by_iface
            .get(iface)
            .map(|c| {
                !c.candidates.is_empty() && now_ms.saturating_sub(c.stored_at_ms) <= self.timeout_ms
            })
            .unwrap_or(false);
        if !fresh {
            self.by_iface.remove(iface);
            return RetryCandidates::Expired;
        }
        let Some(cached) = self.by_iface.get_mut(iface) else {
            return RetryCandidates::Expired;
        };
        let before = cached.candidates.len();
        cached.candidates.retain(keep);
        if cached.candidates.len() == before {
            return RetryCandidates::Unchanged;
        }
        RetryCandidates::Remaining(cached.candidates.clone())
    }

    pub fn clear(&mut self, iface: &str) {
        self.by_iface.remove(iface);
    }

    pub fn clear_all(&mut self) {
        self.by_iface.clear();
    }
}
