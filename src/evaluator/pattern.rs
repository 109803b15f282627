use crate::core::{PersistenceError, Result};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

lazy_static::lazy_static! {
    static ref LIKE_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(CACHE_CAPACITY));
}

/// Translate a LIKE pattern into an anchored regex.
///
/// `%` matches any run of characters, `_` exactly one, `\` escapes the next character.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str("(?s:.*)"),
            '_' => regex.push_str("(?s:.)"),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(&regex::escape("\\")),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

fn compiled(pattern: &str) -> Result<Arc<Regex>> {
    if let Some(regex) = LIKE_CACHE.lock()?.get(pattern) {
        return Ok(Arc::clone(regex));
    }

    let regex = Regex::new(&like_to_regex(pattern))
        .map_err(|e| PersistenceError::QueryError(format!("Invalid LIKE pattern: {}", e)))?;
    let regex = Arc::new(regex);

    LIKE_CACHE.lock()?.put(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

/// Case-sensitive LIKE
pub fn eval_like(text: &str, pattern: &str) -> Result<bool> {
    if !pattern.contains(['%', '_', '\\']) {
        return Ok(text == pattern);
    }

    // "prefix%"
    if let Some(prefix) = pattern.strip_suffix('%') {
        if !prefix.contains(['%', '_', '\\']) {
            return Ok(text.starts_with(prefix));
        }
    }

    Ok(compiled(pattern)?.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_prefix() {
        assert!(eval_like("Rust", "Rust").unwrap());
        assert!(!eval_like("rust", "Rust").unwrap());
        assert!(eval_like("Rust in Action", "Rust%").unwrap());
        assert!(!eval_like("Learning Rust", "Rust%").unwrap());
    }

    #[test]
    fn test_wildcards() {
        assert!(eval_like("Learning Rust", "%Rust").unwrap());
        assert!(eval_like("a Rust book", "%Rust%").unwrap());
        assert!(eval_like("cat", "c_t").unwrap());
        assert!(!eval_like("cart", "c_t").unwrap());
        assert!(eval_like("line\nbreak", "line%").unwrap());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(eval_like("a.b(c)", "a.b(%").unwrap());
        assert!(!eval_like("axb(c)", "a.b(%").unwrap());
        assert!(eval_like("$1.00", "$_.%").unwrap());
    }

    #[test]
    fn test_escaped_wildcards() {
        assert!(eval_like("100%", "100\\%").unwrap());
        assert!(!eval_like("1000", "100\\%").unwrap());
        assert!(eval_like("a_b", "a\\_b").unwrap());
        assert!(!eval_like("axb", "a\\_b").unwrap());
    }
}
