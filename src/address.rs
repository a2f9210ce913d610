//! Syntactic address validation and local-part helpers.
//!
//! Validation here is shape-only: `local-part @ domain-labels . tld` where the
//! final label is at least two alphabetic characters. No DNS lookups, no
//! mailbox existence checks. Anything stronger belongs to the relay.

/// Returns `true` if `s` has the shape of a deliverable address.
///
/// Accepted shape: one or more of `[A-Za-z0-9._%+-]`, an `@`, a non-empty
/// domain region of `[A-Za-z0-9.-]`, a dot, and a final label of two or more
/// alphabetic characters. Case-insensitive.
#[must_use]
pub fn is_valid(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };

    if local.is_empty()
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'))
    {
        return false;
    }

    // The domain needs at least one dot separating the labels from the tld
    let Some((labels, tld)) = domain.rsplit_once('.') else {
        return false;
    };

    if labels.is_empty()
        || !labels
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }

    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// The portion of the address before the `@`, or the whole string if there is
/// no `@`.
#[must_use]
pub fn local_part(s: &str) -> &str {
    s.split_once('@').map_or(s, |(local, _)| local)
}

/// Capitalized local part, used to personalize message bodies.
///
/// `jane.doe@example.com` becomes `Jane.doe`, matching how a greeting line
/// addresses the recipient.
#[must_use]
pub fn personal_name(s: &str) -> String {
    let local = local_part(s);
    let mut chars = local.chars();

    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plus_and_subdomains() {
        assert!(is_valid("a.b+c@sub.example.co"));
    }

    #[test]
    fn rejects_missing_at_sign() {
        assert!(!is_valid("no-at-sign.com"));
    }

    #[test]
    fn rejects_missing_tld() {
        assert!(!is_valid("a@b"));
    }

    #[test]
    fn is_case_insensitive() {
        assert!(is_valid("A@B.COM"));
    }

    #[test]
    fn rejects_short_or_numeric_tld() {
        assert!(!is_valid("a@example.c"));
        assert!(!is_valid("a@example.c0"));
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(!is_valid("@example.com"));
        assert!(!is_valid("a@.com"));
        assert!(!is_valid(""));
    }

    #[test]
    fn rejects_whitespace_and_odd_symbols() {
        assert!(!is_valid("a b@example.com"));
        assert!(!is_valid("a@exa mple.com"));
        assert!(!is_valid("a@example!.com"));
    }

    #[test]
    fn local_part_splits_at_first_at() {
        assert_eq!(local_part("jane.doe@example.com"), "jane.doe");
        assert_eq!(local_part("plain"), "plain");
    }

    #[test]
    fn personal_name_capitalizes() {
        assert_eq!(personal_name("jane@example.com"), "Jane");
        assert_eq!(personal_name("JANE.DOE@example.com"), "Jane.doe");
        assert_eq!(personal_name("@example.com"), "");
    }
}
