//! arXiv identifier helpers

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::warn;

const ABS_MARKER: &str = "arxiv.org/abs/";

fn id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            // New style: YYMM.NNNN or YYMM.NNNNN. Old style: archive(.XX)/YYMMNNN.
            Regex::new(r"^(?:\d{4}\.\d{4,5}|[a-z]+(?:-[a-z]+)*(?:\.[A-Z]{2})?/\d{7})(?:v\d+)?$").ok()
        })
        .as_ref()
}

/// Drop a trailing `v<digits>` version suffix.
fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos)
            if pos + 1 < id.len() && id[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &id[..pos]
        }
        _ => id,
    }
}

/// Strip the long-form URL prefix from an entry id.
///
/// Returns everything after the last `arxiv.org/abs/`, or the input unchanged.
pub fn to_short_id(long_id: &str) -> &str {
    match long_id.rfind(ABS_MARKER) {
        Some(pos) => &long_id[pos + ABS_MARKER.len()..],
        None => long_id,
    }
}

/// Whether `id` is a well-formed arXiv identifier (optionally versioned).
pub fn is_valid_id(id: &str) -> bool {
    id_pattern().map(|re| re.is_match(id)).unwrap_or(false)
}

/// Canonical unversioned form of a user-supplied id.
pub fn normalize_id(raw: &str) -> String {
    let id = to_short_id(raw.trim());
    let id = match id.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("arxiv:") => &id[6..],
        _ => id,
    };
    strip_version(id.trim()).to_string()
}

/// Normalize, drop invalid ids and duplicates, keep first-seen order.
pub fn normalize_ids<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(raw.len());

    for candidate in raw {
        let candidate = candidate.as_ref();
        if candidate.trim().is_empty() {
            continue;
        }
        let id = normalize_id(candidate);
        if !is_valid_id(&id) {
            warn!("Skipping invalid arXiv id '{}'", candidate);
            continue;
        }
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_short_id() {
        assert_eq!(
            to_short_id("https://arxiv.org/abs/2107.05580v1"),
            "2107.05580v1"
        );
        assert_eq!(
            to_short_id("http://arxiv.org/abs/quant-ph/0201082v1"),
            "quant-ph/0201082v1"
        );
        assert_eq!(to_short_id("some-other-url"), "some-other-url");
        assert_eq!(to_short_id(""), "");
    }

    #[test]
    fn test_to_short_id_is_idempotent() {
        for input in [
            "https://arxiv.org/abs/2107.05580v1",
            "http://arxiv.org/abs/hep-th/9901001",
            "2101.12345",
        ] {
            let once = to_short_id(input);
            assert_eq!(to_short_id(once), once);
        }
    }

    #[test]
    fn test_is_valid_id() {
        for id in ["2101.12345", "0704.0001v2", "hep-th/9901001", "math.GT/0309136v3"] {
            assert!(is_valid_id(id), "{} should be valid", id);
        }
        for id in [
            "21.12345",
            "2101.123",
            "hep-th9901001",
            "2101.12345v",
            "xxxx.yyyy",
        ] {
            assert!(!is_valid_id(id), "{} should be invalid", id);
        }
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id(" arXiv:2101.12345v3 "), "2101.12345");
        assert_eq!(normalize_id("ARXIV:0704.0001"), "0704.0001");
        assert_eq!(
            normalize_id("https://arxiv.org/abs/math.GT/0309136v3"),
            "math.GT/0309136"
        );
    }

    #[test]
    fn test_normalize_ids_dedupes_and_filters() {
        let ids = normalize_ids(&[
            "2101.12345v1",
            "garbage",
            "arXiv:2101.12345",
            "",
            "hep-th/9901001",
        ]);
        assert_eq!(ids, vec!["2101.12345", "hep-th/9901001"]);
    }
}
