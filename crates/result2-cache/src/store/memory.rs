//! In-process backing store.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use regex::Regex;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{BackingStore, TTL_MISSING, TTL_PERSISTENT};
use crate::error::{StoreError, StoreResult};

#[derive(Clone, Debug)]
struct StoredEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// DashMap-backed store with Redis-like expiry, counter and scan semantics.
///
/// Expired entries are dropped lazily on access and during scans. Expiry
/// uses the tokio clock, so paused-time tests can fast-forward it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredEntry>>,
    patterns: Arc<DashMap<String, Regex>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<StoredEntry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.clone())
    }

    /// Compiled regex for a scan pattern, cached per pattern.
    fn compiled(&self, pattern: &str) -> Option<Regex> {
        if let Some(re) = self.patterns.get(pattern) {
            return Some(re.clone());
        }
        let re = Regex::new(&glob_to_regex(pattern)?).ok()?;
        self.patterns.insert(pattern.to_string(), re.clone());
        Some(re)
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.live(key).map(|e| e.data))
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &[u8]) -> StoreResult<()> {
        if ttl_secs == 0 {
            return Err(StoreError::command("invalid expire time in 'setex' command"));
        }
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                data: value.to_vec(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live(key).is_some())
    }

    async fn increment_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let entry = occupied.get_mut();
                let current = std::str::from_utf8(&entry.data)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| {
                        StoreError::InvalidValue("value is not an integer".to_string())
                    })?;
                let next = current.checked_add(amount).ok_or_else(|| {
                    StoreError::InvalidValue("increment would overflow".to_string())
                })?;
                entry.data = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(StoredEntry {
                    data: amount.to_string().into_bytes(),
                    expires_at: None,
                });
                Ok(amount)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    data: amount.to_string().into_bytes(),
                    expires_at: None,
                });
                Ok(amount)
            }
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let Some(entry) = self.live(key) else {
            return Ok(TTL_MISSING);
        };
        match entry.expires_at {
            None => Ok(TTL_PERSISTENT),
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                // Redis rounds to the nearest second.
                Ok(((remaining.as_millis() + 500) / 1000) as i64)
            }
        }
    }

    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        self.entries.retain(|_, e| !e.is_expired(now));
        let Some(re) = self.compiled(pattern) else {
            return Ok(Vec::new());
        };
        Ok(self
            .entries
            .iter()
            .filter(|e| re.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Translate a Redis glob into an anchored regex.
///
/// `*` and `?` become `.*` and `.`, `\x` is literal and `[...]` classes
/// keep their ranges and `^` negation. Returns `None` for an unterminated
/// or empty class, which matches nothing.
fn glob_to_regex(pattern: &str) -> Option<String> {
    let mut out = String::from("^(?s:");
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' | '?' | '[' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                match c {
                    '*' => out.push_str(".*"),
                    '?' => out.push('.'),
                    _ => out.push_str(&class_to_regex(&mut chars)?),
                }
            }
            '\\' => literal.push(chars.next().unwrap_or('\\')),
            c => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push_str(")$");
    Some(out)
}

/// Consume a class body up to and including `]`.
fn class_to_regex(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let negate = chars.next_if_eq(&'^').is_some();
    let mut members = String::new();

    loop {
        let lo = match chars.next()? {
            ']' => break,
            '\\' => chars.next()?,
            c => c,
        };
        let hi = match chars.peek() {
            Some('-') => {
                let mut ahead = chars.clone();
                ahead.next();
                ahead.next().filter(|&hi| hi != ']')
            }
            _ => None,
        };
        match hi {
            Some(hi) => {
                chars.next();
                chars.next();
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                push_class_char(&mut members, lo);
                members.push('-');
                push_class_char(&mut members, hi);
            }
            None => push_class_char(&mut members, lo),
        }
    }

    match (members.is_empty(), negate) {
        (true, false) => None,
        (true, true) => Some(".".to_string()),
        (false, false) => Some(format!("[{members}]")),
        (false, true) => Some(format!("[^{members}]")),
    }
}

fn is_class_meta(c: char) -> bool {
    matches!(c, '\\' | '[' | ']' | '^' | '-' | '&' | '~')
}

fn push_class_char(out: &mut String, c: char) {
    if is_class_meta(c) {
        out.push('\\');
    }
    out.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> bool {
        MemoryStore::new()
            .compiled(pattern)
            .is_some_and(|re| re.is_match(text))
    }

    #[test]
    fn glob_basics() {
        assert!(matches("A*", "A:1"));
        assert!(matches("A*", "A"));
        assert!(!matches("A*", "B:1"));
        assert!(matches("view:?:*", "view:x:/results"));
        assert!(matches("*", ""));
        assert!(matches("a*b*c", "a--b--c"));
        assert!(!matches("a*b*c", "a--b--d"));
        assert!(matches("k[0-9]", "k7"));
        assert!(!matches("k[^0-9]", "k7"));
    }

    #[test]
    fn glob_escapes_are_literal() {
        assert!(matches("a\\*b*", "a*bcd"));
        assert!(!matches("a\\*b*", "axbcd"));
        assert!(matches("q\\?*", "q?x=1"));
        assert!(matches("a\\[b*", "a[bc"));
        assert!(matches("t*\\*", "tenant:x:*"));
        assert!(!matches("t*\\*", "tenant:x:y"));
        assert!(matches("view.(x)+", "view.(x)+"));
        assert!(!matches("view.(x)+", "viewa(x)"));
    }

    #[test]
    fn glob_classes() {
        assert!(matches("k[a-]*", "k-1"));
        assert!(matches("k[a-]*", "ka"));
        assert!(!matches("k[a-]*", "kb"));
        assert!(matches("k[z-a]", "km"));
        assert!(matches("k[\\]]", "k]"));
        assert!(matches("k[&~]", "k~"));
        assert!(!matches("k[0-9", "k7"));
        assert!(!matches("k[]", "k"));
    }

    #[test]
    fn compiled_patterns_are_cached() {
        let store = MemoryStore::new();
        assert!(store.compiled("A*").is_some());
        assert!(store.compiled("A*").is_some());
        assert_eq!(store.patterns.len(), 1);
        assert!(store.compiled("[").is_none());
        assert_eq!(store.patterns.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let store = MemoryStore::new();
        store.set_with_expiry("k", 1, b"v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.ttl("k").await.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), TTL_MISSING);
    }

    #[tokio::test]
    async fn setex_rejects_zero_ttl() {
        let store = MemoryStore::new();
        assert!(store.set_with_expiry("k", 0, b"v").await.is_err());
    }

    #[tokio::test]
    async fn counters_behave_like_incrby() {
        let store = MemoryStore::new();
        assert_eq!(store.increment_by("hits", 1).await.unwrap(), 1);
        assert_eq!(store.increment_by("hits", 5).await.unwrap(), 6);
        assert_eq!(store.increment_by("hits", -2).await.unwrap(), 4);
        assert_eq!(store.ttl("hits").await.unwrap(), TTL_PERSISTENT);
        assert_eq!(store.get("hits").await.unwrap(), Some(b"4".to_vec()));

        store.set_with_expiry("name", 60, b"abc").await.unwrap();
        assert!(matches!(
            store.increment_by("name", 1).await,
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn scan_and_bulk_delete() {
        let store = MemoryStore::new();
        for key in ["A:1", "A:2", "B:1"] {
            store.set_with_expiry(key, 60, b"x").await.unwrap();
        }
        let mut found = store.scan_keys("A*").await.unwrap();
        found.sort();
        assert_eq!(found, vec!["A:1".to_string(), "A:2".to_string()]);

        store.delete(&found).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.exists("B:1").await.unwrap());
    }
}
