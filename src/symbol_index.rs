//! Symbol directory index with a time-bounded cache.
//!
//! Scanning the base directory on every query would hammer the filesystem
//! during multi-symbol loads, so the set of symbols is cached per scope and
//! refreshed after five minutes or on explicit invalidation. Saves insert
//! their symbol synchronously, so freshly written data is visible without
//! waiting out the window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use crate::error::Result;
use crate::interval::Interval;
use crate::paths::{PathResolver, Scope};

/// How long a scanned symbol set stays valid.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
struct CachedSymbols {
    symbols: Vec<String>,
    cached_at: Instant,
}

/// Per-scope symbol cache over the path resolver's directory scan.
/// Matching is case-insensitive throughout.
pub struct SymbolIndex {
    resolver: Arc<PathResolver>,
    cache: DashMap<Scope, CachedSymbols>,
}

impl SymbolIndex {
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self {
            resolver,
            cache: DashMap::new(),
        }
    }

    /// The full symbol set for a scope, from cache when fresh.
    pub async fn all(&self, scope: Scope) -> Result<Vec<String>> {
        if let Some(entry) = self.cache.get(&scope) {
            if entry.cached_at.elapsed() < CACHE_TTL {
                return Ok(entry.symbols.clone());
            }
        }

        let symbols = self.resolver.list_symbols(scope).await?;
        trace!(?scope, count = symbols.len(), "refreshed symbol cache");
        self.cache.insert(
            scope,
            CachedSymbols {
                symbols: symbols.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(symbols)
    }

    /// Symbols matching a pattern. Empty or `"*"` returns everything; a
    /// pattern without wildcards is a membership test; anything else goes
    /// through the glob matcher.
    pub async fn matching(&self, pattern: &str, scope: Scope) -> Result<Vec<String>> {
        let all = self.all(scope).await?;
        if pattern.is_empty() || pattern == "*" {
            return Ok(all);
        }
        if !pattern.contains('*') && !pattern.contains('?') {
            return Ok(all
                .into_iter()
                .filter(|s| s.eq_ignore_ascii_case(pattern))
                .collect());
        }
        Ok(all
            .into_iter()
            .filter(|s| glob_match(pattern, s))
            .collect())
    }

    /// Insert a symbol into an already-populated cache. A cold cache is
    /// left alone; the next read repopulates it from disk anyway.
    pub fn add_to_cache(&self, symbol: &str, scope: Scope) {
        if let Some(mut entry) = self.cache.get_mut(&scope) {
            if !entry
                .symbols
                .iter()
                .any(|s| s.eq_ignore_ascii_case(symbol))
            {
                entry.symbols.push(symbol.to_string());
                entry.symbols.sort();
            }
        }
    }

    /// Drop the cached set for a scope.
    pub fn invalidate(&self, scope: Scope) {
        self.cache.remove(&scope);
    }

    /// Intervals that exist on disk for a symbol.
    pub async fn available_timeframes(&self, symbol: &str, scope: Scope) -> Result<Vec<Interval>> {
        self.resolver.list_intervals(scope, symbol).await
    }
}

/// Case-insensitive glob: `*` matches zero or more characters, `?` exactly
/// one, everything else itself. Standard backtracking-on-star semantics; a
/// candidate with characters the pattern does not cover never matches.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pat: Vec<char> = pattern.chars().flat_map(|c| c.to_lowercase()).collect();
    let text: Vec<char> = candidate.chars().flat_map(|c| c.to_lowercase()).collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            // Tentatively match zero characters; remember where to resume.
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Backtrack: let the star swallow one more character.
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_everything() {
        for candidate in ["", "a", "BTC.USD", "anything at all"] {
            assert!(glob_match("*", candidate));
        }
    }

    #[test]
    fn test_prefix_pattern() {
        assert!(glob_match("BTC.*", "BTC.USD"));
        assert!(glob_match("BTC.*", "btc.eur"));
        assert!(glob_match("BTC.*", "BTC."));
        assert!(!glob_match("BTC.*", "ETH.USD"));
        assert!(!glob_match("BTC.*", "BTC"));
    }

    #[test]
    fn test_question_mark_is_exactly_one() {
        assert!(glob_match("SYM?", "SYM1"));
        assert!(glob_match("SYM?", "SYMx"));
        assert!(!glob_match("SYM?", "SYM"));
        assert!(!glob_match("SYM?", "SYM12"));
    }

    #[test]
    fn test_literal_is_case_insensitive() {
        assert!(glob_match("eur?usd", "EUR/USD"));
        assert!(!glob_match("eurusd", "EUR/USD"));
    }

    #[test]
    fn test_star_backtracking() {
        assert!(glob_match("a*b*c", "aXbYc"));
        assert!(glob_match("a*b*c", "abbbc"));
        assert!(!glob_match("a*b*c", "aXbYd"));
        assert!(glob_match("*usd", "BTC.USD"));
        assert!(!glob_match("*usd", "BTC.USDT"));
    }

    #[tokio::test]
    async fn test_cache_population_and_insert() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = Arc::new(PathResolver::new(Some(tmp.path().to_path_buf())));
        tokio::fs::create_dir_all(tmp.path().join("BTC.USD"))
            .await
            .unwrap();

        let index = SymbolIndex::new(resolver);
        assert_eq!(index.all(Scope::Local).await.unwrap(), vec!["BTC.USD"]);

        // Cold-cache insert for another scope is a no-op.
        index.add_to_cache("GHOST", Scope::Global);
        assert!(index.cache.get(&Scope::Global).is_none());

        // Warm-cache insert is visible without a rescan.
        index.add_to_cache("ETH.USD", Scope::Local);
        assert_eq!(
            index.all(Scope::Local).await.unwrap(),
            vec!["BTC.USD", "ETH.USD"]
        );

        // Duplicate insert (case-insensitive) does not grow the set.
        index.add_to_cache("btc.usd", Scope::Local);
        assert_eq!(index.all(Scope::Local).await.unwrap().len(), 2);

        index.invalidate(Scope::Local);
        assert!(index.cache.get(&Scope::Local).is_none());
    }

    #[tokio::test]
    async fn test_matching_modes() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = Arc::new(PathResolver::new(Some(tmp.path().to_path_buf())));
        for sym in ["BTC.USD", "BTC.EUR", "ETH.USD"] {
            tokio::fs::create_dir_all(tmp.path().join(sym)).await.unwrap();
        }
        let index = SymbolIndex::new(resolver);

        assert_eq!(index.matching("", Scope::Local).await.unwrap().len(), 3);
        assert_eq!(index.matching("*", Scope::Local).await.unwrap().len(), 3);

        let exact = index.matching("btc.usd", Scope::Local).await.unwrap();
        assert_eq!(exact, vec!["BTC.USD"]);
        assert!(index
            .matching("missing", Scope::Local)
            .await
            .unwrap()
            .is_empty());

        let globbed = index.matching("BTC.*", Scope::Local).await.unwrap();
        assert_eq!(globbed, vec!["BTC.EUR", "BTC.USD"]);
    }
}
