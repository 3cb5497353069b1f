//! LIKE-style wildcard matching used by the `Like` selector.
//!
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! Matching is case-sensitive and works on Unicode scalar values, so it
//! behaves the same on the server's live queries and the client's cache.

/// Matches `value` against a LIKE pattern.
///
/// ```
/// use strand_core::pattern::like;
/// assert!(like("Fourth Task", "F%Task"));
/// assert!(like("task", "t_sk"));
/// assert!(!like("task", "t_k"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    let (mut vi, mut pi) = (0, 0);
    // Position of the last `%` seen and the value index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < v.len() {
        match p.get(pi) {
            Some('%') => {
                backtrack = Some((pi, vi));
                pi += 1;
            }
            Some(&ch) if ch == '_' || ch == v[vi] => {
                vi += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    // Let the last `%` swallow one more character.
                    pi = star + 1;
                    vi = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|&ch| ch == '%')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_wildcards() {
        assert!(like("hello", "h%o"));
        assert!(like("hello", "_ello"));
        assert!(like("hello", "%"));
        assert!(like("", "%%"));
        assert!(like("hello", "%l%l%"));
        assert!(!like("hello", "world"));
        assert!(!like("hello", "h_o"));
        assert!(!like("", "_"));
    }

    #[test]
    fn test_like_backtracks() {
        assert!(like("abcabd", "%abd"));
        assert!(like("mississippi", "m%ss%ppi"));
        assert!(!like("mississippi", "m%ss%ppx"));
    }

    #[test]
    fn test_like_unicode_and_case() {
        assert!(like("café", "caf_"));
        assert!(!like("Task", "task"));
    }
}
