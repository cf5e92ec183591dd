//! Key layout for replica objects.
//!
//! ```text
//! {base}/generations/{generation}/snapshots/{index}.snapshot.lz4
//! {base}/generations/{generation}/wal/{index}/{offset}.wal.lz4
//! ```
//!
//! Index and offset are fixed-width lowercase hex, so listing keys in
//! lexicographic order yields segments in (index, offset) order. Every
//! prefix returned here ends with `/`.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ReplicaError, Result};

const GENERATIONS_DIR: &str = "generations";
const SNAPSHOTS_DIR: &str = "snapshots";
const WAL_DIR: &str = "wal";
const SNAPSHOT_EXT: &str = ".snapshot.lz4";
const WAL_SEGMENT_EXT: &str = ".wal.lz4";
const MAX_GENERATION_LEN: usize = 64;

/// Returns true if `name` is a well-formed generation identifier: 1 to 64
/// lowercase ASCII letters or digits.
pub fn is_generation_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_GENERATION_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

fn join(base: &str, rest: &str) -> String {
    let base = base.trim_matches('/');
    if base.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", base, rest)
    }
}

/// Prefix under which every generation lives as one directory level.
pub fn generations_prefix(base: &str) -> String {
    join(base, &format!("{}/", GENERATIONS_DIR))
}

pub fn generation_prefix(base: &str, generation: &str) -> Result<String> {
    if !is_generation_name(generation) {
        return Err(ReplicaError::InvalidGeneration(generation.to_string()));
    }
    Ok(format!("{}{}/", generations_prefix(base), generation))
}

pub fn snapshots_prefix(base: &str, generation: &str) -> Result<String> {
    Ok(format!("{}{}/", generation_prefix(base, generation)?, SNAPSHOTS_DIR))
}

pub fn snapshot_key(base: &str, generation: &str, index: u64) -> Result<String> {
    Ok(format!(
        "{}{:016x}{}",
        snapshots_prefix(base, generation)?,
        index,
        SNAPSHOT_EXT
    ))
}

/// Parse a snapshot key relative to its snapshots prefix, e.g.
/// `00000000000000a0.snapshot.lz4`.
pub fn parse_snapshot_key(key: &str) -> Result<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^([0-9a-f]{16})\.snapshot\.lz4$").expect("snapshot key regex")
    });
    let caps = re
        .captures(key)
        .ok_or_else(|| ReplicaError::MalformedKey(key.to_string()))?;
    parse_hex(&caps[1], key)
}

pub fn wal_prefix(base: &str, generation: &str) -> Result<String> {
    Ok(format!("{}{}/", generation_prefix(base, generation)?, WAL_DIR))
}

pub fn wal_segment_key(base: &str, generation: &str, index: u64, offset: u64) -> Result<String> {
    Ok(format!(
        "{}{:016x}/{:016x}{}",
        wal_prefix(base, generation)?,
        index,
        offset,
        WAL_SEGMENT_EXT
    ))
}

/// Parse a WAL segment key relative to its WAL prefix, e.g.
/// `0000000000000001/0000000000001000.wal.lz4`.
pub fn parse_wal_segment_key(key: &str) -> Result<(u64, u64)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^([0-9a-f]{16})/([0-9a-f]{16})\.wal\.lz4$").expect("wal segment key regex")
    });
    let caps = re
        .captures(key)
        .ok_or_else(|| ReplicaError::MalformedKey(key.to_string()))?;
    Ok((parse_hex(&caps[1], key)?, parse_hex(&caps[2], key)?))
}

/// Last path component of a hierarchical listing prefix (`a/b/c/` -> `c`).
pub fn last_component(prefix: &str) -> &str {
    let trimmed = prefix.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn parse_hex(digits: &str, key: &str) -> Result<u64> {
    u64::from_str_radix(digits, 16).map_err(|_| ReplicaError::MalformedKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEN: &str = "0123456789abcdef";

    #[test]
    fn test_generation_names() {
        assert!(is_generation_name(GEN));
        assert!(is_generation_name("g1"));
        assert!(!is_generation_name(""));
        assert!(!is_generation_name("ABCDEF"));
        assert!(!is_generation_name("gen/1"));
        assert!(!is_generation_name("gen-1"));
        assert!(!is_generation_name(&"a".repeat(65)));
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(generations_prefix(""), "generations/");
        assert_eq!(generations_prefix("db/"), "db/generations/");
        assert_eq!(generations_prefix("/a/b"), "a/b/generations/");
        assert_eq!(
            generation_prefix("db", GEN).unwrap(),
            "db/generations/0123456789abcdef/"
        );
        assert_eq!(
            snapshots_prefix("db", GEN).unwrap(),
            "db/generations/0123456789abcdef/snapshots/"
        );
        assert_eq!(wal_prefix("", GEN).unwrap(), "generations/0123456789abcdef/wal/");
    }

    #[test]
    fn test_invalid_generation_rejected() {
        for bad in ["", "Bad", "a/b", "../x"] {
            match snapshot_key("db", bad, 0) {
                Err(ReplicaError::InvalidGeneration(g)) => assert_eq!(g, bad),
                other => panic!("expected InvalidGeneration for {:?}, got {:?}", bad, other),
            }
            assert!(wal_segment_key("db", bad, 0, 0).is_err());
        }
    }

    #[test]
    fn test_snapshot_key_round_trip() {
        for index in [0u64, 1, 0xff, 0xdead_beef, u64::MAX] {
            let key = snapshot_key("db", GEN, index).unwrap();
            let prefix = snapshots_prefix("db", GEN).unwrap();
            let rel = key.strip_prefix(&prefix).unwrap();
            assert_eq!(parse_snapshot_key(rel).unwrap(), index);
        }
        assert_eq!(
            snapshot_key("", GEN, 10).unwrap(),
            "generations/0123456789abcdef/snapshots/000000000000000a.snapshot.lz4"
        );
    }

    #[test]
    fn test_wal_segment_key_round_trip() {
        for (index, offset) in [(0u64, 0u64), (0, 4096), (1, 0), (u64::MAX, u64::MAX)] {
            let key = wal_segment_key("db", GEN, index, offset).unwrap();
            let rel = key.strip_prefix(&wal_prefix("db", GEN).unwrap()).unwrap();
            assert_eq!(parse_wal_segment_key(rel).unwrap(), (index, offset));
        }
    }

    #[test]
    fn test_malformed_keys() {
        for bad in [
            "not-a-valid-key",
            "0000000a.snapshot.lz4",
            "000000000000000A.snapshot.lz4",
            "000000000000000a.snapshot",
            "x/000000000000000a.snapshot.lz4",
        ] {
            assert!(matches!(
                parse_snapshot_key(bad),
                Err(ReplicaError::MalformedKey(_))
            ));
        }
        for bad in [
            "not-a-valid-key",
            "0000000000000000.wal.lz4",
            "0000000000000000/0000000000000000.wal",
            "0000000000000000/00000000000000000.wal.lz4",
        ] {
            assert!(matches!(
                parse_wal_segment_key(bad),
                Err(ReplicaError::MalformedKey(_))
            ));
        }
    }

    #[test]
    fn test_wal_key_order_matches_position_order() {
        let positions = [(0u64, 0u64), (0, 4096), (0, 0x1_0000), (1, 0), (0x10, 0)];
        let keys: Vec<String> = positions
            .iter()
            .map(|(i, o)| wal_segment_key("db", GEN, *i, *o).unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_generation_prefixes_do_not_collide() {
        let a = generation_prefix("db", "abc").unwrap();
        let b = generation_prefix("db", "abcd").unwrap();
        let key_b = snapshot_key("db", "abcd", 0).unwrap();
        let key_a = snapshot_key("db", "abc", 0).unwrap();
        assert!(!key_b.starts_with(&a));
        assert!(!key_a.starts_with(&b));
    }

    #[test]
    fn test_last_component() {
        assert_eq!(last_component("db/generations/abc/"), "abc");
        assert_eq!(last_component("abc/"), "abc");
        assert_eq!(last_component("abc"), "abc");
    }
}
