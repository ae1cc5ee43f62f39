//! Shared cache of compiled regular expressions.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::Regex;

static GLOBAL: LazyLock<RegexCache> = LazyLock::new(RegexCache::new);

/// Read-mostly cache mapping pattern source to its compiled [`Regex`].
///
/// Lookups take the read lock; a miss compiles outside any lock and inserts
/// under the write lock, re-checking first so concurrent misses converge on
/// a single entry.
#[derive(Debug, Default)]
pub struct RegexCache {
    entries: RwLock<HashMap<String, Arc<Regex>>>,
}

impl RegexCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache used by [`PatternParser`](super::PatternParser)
    /// unless another one is supplied.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Return the compiled regex for `pattern`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns the compile error if `pattern` is not a valid regex. Failed
    /// patterns are not cached.
    pub fn get_or_compile(&self, pattern: &str) -> Result<Arc<Regex>, regex::Error> {
        if let Some(re) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
        {
            return Ok(Arc::clone(re));
        }

        let compiled = Arc::new(Regex::new(pattern)?);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let re = entries
            .entry(pattern.to_string())
            .or_insert_with(|| compiled);
        Ok(Arc::clone(re))
    }

    /// Number of cached patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
