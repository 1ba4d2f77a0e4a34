//! Splitting one logical cookie value across `name.0 .. name.N` cookies
//!
//! Browsers cap a single cookie (name, value and attributes) at roughly 4 KiB.
//! Sealed sessions carrying large access tokens exceed that, so the value is
//! written as numbered chunks and reassembled on read.

use std::collections::HashMap;

/// Largest cookie the browser reliably stores
pub const MAX_COOKIE_SIZE: usize = 4096;

/// Room kept for the cookie name and attributes
pub const ATTRIBUTE_OVERHEAD: usize = 160;

/// Maximum number of value characters per physical cookie
pub const CHUNK_SIZE: usize = MAX_COOKIE_SIZE - ATTRIBUTE_OVERHEAD;

/// One entry of a chunked write list
///
/// `clear` entries remove a stale chunk left over from a previous, longer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWrite {
    pub name: String,
    pub value: String,
    pub clear: bool,
}

impl ChunkWrite {
    fn set(name: String, value: String) -> Self {
        Self {
            name,
            value,
            clear: false,
        }
    }

    fn clear(name: String) -> Self {
        Self {
            name,
            value: String::new(),
            clear: true,
        }
    }
}

/// Parse the numeric suffix of a `name.<digits>` chunk key
///
/// Anything other than ASCII digits after the dot (`name.foo`, `name.1a`)
/// is not a chunk of `name`.
#[must_use]
pub fn chunk_index(base_name: &str, key: &str) -> Option<usize> {
    let suffix = key.strip_prefix(base_name)?.strip_prefix('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Indices of every existing chunk of `base_name`, ascending
fn existing_chunk_indices(base_name: &str, cookies: &HashMap<String, String>) -> Vec<usize> {
    let mut indices: Vec<usize> = cookies
        .keys()
        .filter_map(|key| chunk_index(base_name, key))
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Read a possibly-chunked value
///
/// Chunks take precedence over a direct `name` cookie and are concatenated in
/// ascending numeric order regardless of arrival order.
#[must_use]
pub fn read_value(name: &str, cookies: &HashMap<String, String>) -> Option<String> {
    let mut chunks: Vec<(usize, &String)> = cookies
        .iter()
        .filter_map(|(key, value)| chunk_index(name, key).map(|index| (index, value)))
        .collect();

    if chunks.is_empty() {
        return cookies.get(name).cloned();
    }

    chunks.sort_by_key(|(index, _)| *index);
    Some(chunks.into_iter().map(|(_, value)| value.as_str()).collect())
}

/// Produce the write list storing `value` under `name`
///
/// - a value of at most `CHUNK_SIZE` characters is written directly, and every
///   pre-existing chunk is cleared
/// - a longer value is split into `CHUNK_SIZE`-character slices named
///   `name.<i>`, and only pre-existing chunks with an index at or beyond the
///   new chunk count are cleared
#[must_use]
pub fn chunk_value(
    name: &str,
    value: &str,
    existing: &HashMap<String, String>,
) -> Vec<ChunkWrite> {
    let existing_indices = existing_chunk_indices(name, existing);
    let chars: Vec<char> = value.chars().collect();

    if chars.len() <= CHUNK_SIZE {
        let mut writes = vec![ChunkWrite::set(name.to_string(), value.to_string())];
        writes.extend(
            existing_indices
                .into_iter()
                .map(|index| ChunkWrite::clear(format!("{name}.{index}"))),
        );
        return writes;
    }

    let mut writes: Vec<ChunkWrite> = chars
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(index, slice)| {
            ChunkWrite::set(format!("{name}.{index}"), slice.iter().collect())
        })
        .collect();

    let count = writes.len();
    writes.extend(
        existing_indices
            .into_iter()
            .filter(|index| *index >= count)
            .map(|index| ChunkWrite::clear(format!("{name}.{index}"))),
    );
    writes
}

/// Names of every cookie that currently holds part of `name`
///
/// Used on sign-out to delete the direct cookie together with any chunks.
#[must_use]
pub fn stored_cookie_names(name: &str, cookies: &HashMap<String, String>) -> Vec<String> {
    let mut names = Vec::new();
    if cookies.contains_key(name) {
        names.push(name.to_string());
    }
    names.extend(
        existing_chunk_indices(name, cookies)
            .into_iter()
            .map(|index| format!("{name}.{index}")),
    );
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(store: &mut HashMap<String, String>, writes: &[ChunkWrite]) {
        for write in writes {
            if write.clear {
                store.remove(&write.name);
            } else {
                store.insert(write.name.clone(), write.value.clone());
            }
        }
    }

    fn cookies(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(CHUNK_SIZE, 3936);
    }

    #[test]
    fn test_chunk_index_is_strict() {
        assert_eq!(chunk_index("s", "s.0"), Some(0));
        assert_eq!(chunk_index("s", "s.12"), Some(12));
        assert_eq!(chunk_index("s", "s"), None);
        assert_eq!(chunk_index("s", "s."), None);
        assert_eq!(chunk_index("s", "s.foo"), None);
        assert_eq!(chunk_index("s", "s.1a"), None);
        assert_eq!(chunk_index("s", "s-backup"), None);
        assert_eq!(chunk_index("s", "session.0"), None);
    }

    #[test]
    fn test_read_value_direct() {
        let store = cookies(&[("s", "direct"), ("other", "x")]);
        assert_eq!(read_value("s", &store).as_deref(), Some("direct"));
        assert_eq!(read_value("missing", &store), None);
    }

    #[test]
    fn test_read_value_chunks_win_over_direct() {
        let store = cookies(&[("s", "direct"), ("s.0", "ab"), ("s.1", "cd")]);
        assert_eq!(read_value("s", &store).as_deref(), Some("abcd"));
    }

    #[test]
    fn test_read_value_sorts_numerically() {
        let store = cookies(&[("s.10", "k"), ("s.2", "c"), ("s.0", "a"), ("s.1", "b")]);
        assert_eq!(read_value("s", &store).as_deref(), Some("abck"));
    }

    #[test]
    fn test_read_value_ignores_lookalikes() {
        let store = cookies(&[("s", "direct"), ("s.foo", "x"), ("s-backup", "y")]);
        assert_eq!(read_value("s", &store).as_deref(), Some("direct"));
    }

    #[test]
    fn test_small_value_is_single_cookie() {
        let writes = chunk_value("s", "small", &HashMap::new());
        assert_eq!(
            writes,
            vec![ChunkWrite {
                name: "s".to_string(),
                value: "small".to_string(),
                clear: false,
            }]
        );
    }

    #[test]
    fn test_small_value_clears_all_existing_chunks() {
        let existing = cookies(&[("s.0", "a"), ("s.1", "b"), ("s.foo", "z")]);
        let writes = chunk_value("s", "small", &existing);
        let clears: Vec<&str> = writes
            .iter()
            .filter(|w| w.clear)
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(clears, vec!["s.0", "s.1"]);
    }

    #[test]
    fn test_exact_chunk_size_is_not_split() {
        let value = "x".repeat(CHUNK_SIZE);
        let writes = chunk_value("s", &value, &HashMap::new());
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].name, "s");
    }

    #[test]
    fn test_large_value_splits_without_spurious_clears() {
        let value = "y".repeat(5000);
        let writes = chunk_value("s", &value, &cookies(&[("s", "small")]));
        let names: Vec<&str> = writes.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["s.0", "s.1"]);
        assert!(writes.iter().all(|w| !w.clear));
        assert_eq!(writes[0].value.len(), CHUNK_SIZE);
        assert_eq!(writes[1].value.len(), 5000 - CHUNK_SIZE);
    }

    #[test]
    fn test_shrinking_clears_only_trailing_chunks() {
        let existing = cookies(&[("s.0", "a"), ("s.1", "b"), ("s.2", "c"), ("s.3", "d")]);
        let value = "z".repeat(CHUNK_SIZE * 2);
        let writes = chunk_value("s", &value, &existing);
        let clears: Vec<&str> = writes
            .iter()
            .filter(|w| w.clear)
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(clears, vec!["s.2", "s.3"]);
    }

    #[test]
    fn test_round_trip_across_sizes() {
        let mut store = HashMap::new();
        let lengths = [
            0,
            1,
            CHUNK_SIZE - 1,
            CHUNK_SIZE,
            CHUNK_SIZE + 1,
            CHUNK_SIZE * 11 + 7,
            50,
            9000,
        ];
        for len in lengths {
            let value: String = (0..len)
                .map(|i| char::from(b'a' + u8::try_from(i % 26).unwrap()))
                .collect();
            let writes = chunk_value("s", &value, &store);
            apply(&mut store, &writes);
            assert_eq!(read_value("s", &store).as_deref(), Some(value.as_str()), "len {len}");
        }
    }

    #[test]
    fn test_stored_cookie_names() {
        let store = cookies(&[("s", "d"), ("s.1", "b"), ("s.0", "a"), ("s.x", "no")]);
        assert_eq!(stored_cookie_names("s", &store), vec!["s", "s.0", "s.1"]);
        assert!(stored_cookie_names("other", &store).is_empty());
    }
}
