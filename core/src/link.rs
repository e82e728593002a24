//! Link and cache-control header parsing
//!
//! The subscribe response carries the push and receipt-subscribe resources
//! as `Link` header values of the form `<uri>; rel="relation"`, and the
//! subscription lifetime as a `Cache-Control` max-age.

/// Return the URI of the first link header value whose quoted `rel` token
/// equals `rel`.
///
/// Entries without a quoted relation are skipped, not fatal. The URI is
/// the text between the leading `<` and the last `>` of the matching
/// entry.
pub fn parse_link<S: AsRef<str>>(links: &[S], rel: &str) -> Option<String> {
    for link in links {
        let link = link.as_ref();
        let Some(quoted) = quoted_token(link) else {
            continue;
        };
        if quoted != rel {
            continue;
        }
        let Some(end) = link.rfind('>') else {
            continue;
        };
        if !link.starts_with('<') || end == 0 {
            continue;
        }
        return Some(link[1..end].to_string());
    }
    None
}

/// Extract a non-negative max-age, in seconds, from a cache-control-like
/// header value.
///
/// This is a deliberately permissive scan: the first run of decimal digits
/// anywhere in the value is taken, without requiring a `max-age=` prefix.
/// It is not a directive-aware cache-control parser.
pub fn parse_max_age(value: &str) -> Option<u64> {
    let start = value.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = &value[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}

/// First `"`-quoted token of a header value, if any.
fn quoted_token(value: &str) -> Option<&str> {
    let open = value.find('"')?;
    let rest = &value[open + 1..];
    let close = rest.find('"')?;
    Some(&rest[..close])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_returns_first_matching_relation() {
        let links = [
            "<https://h/p1>; rel=\"urn:ietf:params:push\"",
            "<https://h/r1>; rel=\"urn:ietf:params:push:receipt\"",
        ];

        assert_eq!(
            parse_link(&links, "urn:ietf:params:push"),
            Some("https://h/p1".to_string())
        );
        assert_eq!(
            parse_link(&links, "urn:ietf:params:push:receipt"),
            Some("https://h/r1".to_string())
        );
        assert_eq!(parse_link(&links, "urn:ietf:params:other"), None);
    }

    #[test]
    fn test_parse_link_scans_in_order() {
        let links = [
            "<https://h/first>; rel=\"urn:ietf:params:push\"",
            "<https://h/second>; rel=\"urn:ietf:params:push\"",
        ];

        assert_eq!(
            parse_link(&links, "urn:ietf:params:push"),
            Some("https://h/first".to_string())
        );
    }

    #[test]
    fn test_parse_link_skips_malformed_entries() {
        let links = [
            "no brackets and no relation",
            "<https://h/p1>; rel=urn:unquoted",
            "<https://h/broken; rel=\"urn:ietf:params:push\"",
            "<https://h/p2>; rel=\"urn:ietf:params:push\"",
        ];

        assert_eq!(
            parse_link(&links, "urn:ietf:params:push"),
            Some("https://h/p2".to_string())
        );
    }

    #[test]
    fn test_parse_max_age() {
        assert_eq!(parse_max_age("max-age=120"), Some(120));
        assert_eq!(parse_max_age("private, max-age=0"), Some(0));
        assert_eq!(parse_max_age("no-digits-here"), None);
        assert_eq!(parse_max_age(""), None);
    }
}
