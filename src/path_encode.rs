//! Percent-encoding for pool sub-queue directory names.
//!
//! Only `[A-Za-z0-9()_-|.]` pass through unescaped; every other byte becomes
//! a lowercase `%HH` triplet. This allow-list is deliberately narrower than
//! a URL path segment's, so the crate's own scanner is used rather than
//! calling `urlencoding::encode` directly with its wider default encode set.

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'(' | b')' | b'_' | b'-' | b'|' | b'.')
}

pub fn encode(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for &b in id.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02x}"));
        }
    }
    out
}

pub fn decode(encoded: &str) -> crate::error::Result<String> {
    urlencoding::decode(encoded)
        .map(|s| s.into_owned())
        .map_err(|e| crate::error::QueueError::invalid(format!("invalid pool directory name: {e}")))
}

/// The on-disk sub-queue directory name for a pool identifier.
pub fn sub_queue_dir_name(id: &str) -> String {
    format!("{}.q", encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_unreserved_bytes_alone() {
        assert_eq!(encode("abc123()_-|."), "abc123()_-|.");
    }

    #[test]
    fn escapes_everything_else() {
        assert_eq!(encode("a/b c"), "a%2fb%20c");
    }

    #[test]
    fn round_trips() {
        let id = "weird id/with spaces";
        let encoded = encode(id);
        assert_eq!(decode(&encoded).unwrap(), id);
    }

    #[test]
    fn sub_queue_dir_name_has_q_suffix() {
        assert_eq!(sub_queue_dir_name("abc"), "abc.q");
    }
}
