//! Run-scoped memo of water source locations keyed by `newSourceCode`.
//!
//! Every code is looked up at most once per run. The first caller for a
//! code performs the fetch; callers arriving while it is in flight await
//! the same [`OnceCell`] instead of issuing their own request. Failed and
//! malformed lookups are memoized too, so a broken code costs one request.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use madzi_api_models::LatLng;
use tokio::sync::OnceCell;

/// The memoized result of one source lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceLocation {
    /// `sourceLatLng` was a well-formed pair.
    Resolved(LatLng),
    /// The lookup succeeded but `sourceLatLng` was not a pair.
    Malformed(serde_json::Value),
    /// The lookup itself failed.
    Unavailable(String),
}

impl SourceLocation {
    #[must_use]
    pub const fn lat_lng(&self) -> Option<LatLng> {
        match self {
            Self::Resolved(lat_lng) => Some(*lat_lng),
            Self::Malformed(_) | Self::Unavailable(_) => None,
        }
    }
}

/// Single-flight cache from source code to [`SourceLocation`].
#[derive(Debug, Default)]
pub struct CoordinateCache {
    entries: Mutex<BTreeMap<String, Arc<OnceCell<SourceLocation>>>>,
}

impl CoordinateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the location for `code`, calling `fetch` only if no lookup
    /// for `code` has started yet.
    pub async fn resolve<F, Fut>(&self, code: &str, fetch: F) -> SourceLocation
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = SourceLocation>,
    {
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(code.to_owned()).or_default())
        };

        cell.get_or_init(|| fetch(code.to_owned())).await.clone()
    }

    /// The settled lookup for `code`, if any.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<SourceLocation> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of distinct codes requested so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
