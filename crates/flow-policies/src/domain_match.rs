//! RFC 6265 §5.1.3 domain matching: exact match, or `host` is a subdomain of
//! `domain` separated by a dot boundary.

pub fn domain_match(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();

    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(domain_match("example.com", "example.com"));
    }

    #[test]
    fn subdomain_matches_parent() {
        assert!(domain_match("foo.example.com", "example.com"));
        assert!(domain_match("foo.example.com", ".example.com"));
    }

    #[test]
    fn unrelated_domains_do_not_match() {
        assert!(!domain_match("example.com", "notexample.com"));
        assert!(!domain_match("evilexample.com", "example.com"));
    }

    #[test]
    fn case_insensitive() {
        assert!(domain_match("Example.COM", "example.com"));
    }
}
