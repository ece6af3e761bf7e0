//! Memoized regex compilation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;
use tracing::debug;

use crate::error::{Result, StatsError};

/// Compiles regexes once per distinct source string.
///
/// Lookups take a shared read lock, so concurrent readers never block each
/// other once a pattern is cached.
#[derive(Debug, Default)]
pub struct PatternCache {
    patterns: RwLock<HashMap<String, Arc<Regex>>>,
    compilations: AtomicUsize,
}

impl PatternCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled form of `source`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidPattern`] if `source` is not a valid regex.
    pub fn compile(&self, source: &str) -> Result<Arc<Regex>> {
        // Fast path: already compiled
        {
            let read_guard = self.patterns.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = read_guard.get(source) {
                return Ok(Arc::clone(regex));
            }
        }

        let mut write_guard = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have compiled it while we waited for the lock
        if let Some(regex) = write_guard.get(source) {
            return Ok(Arc::clone(regex));
        }

        let regex = Regex::new(source).map_err(|e| StatsError::InvalidPattern {
            pattern: source.to_string(),
            source: e,
        })?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        debug!(pattern = source, "Compiled pattern");

        let regex = Arc::new(regex);
        write_guard.insert(source.to_string(), Arc::clone(&regex));
        Ok(regex)
    }

    /// Number of regexes actually compiled since creation or the last clear.
    #[must_use]
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Number of cached patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached pattern and reset the compile counter.
    pub fn clear(&self) {
        self.patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.compilations.store(0, Ordering::Relaxed);
    }
}
