//! Target-domain classification for canonical URLs.

use std::collections::HashSet;

use url::Url;

/// Hostnames localized by default: the Squarespace asset CDNs plus Typekit.
pub const DEFAULT_TARGET_DOMAINS: [&str; 6] = [
    "assets.squarespace.com",
    "static1.squarespace.com",
    "definitions.sqspcdn.com",
    "images.squarespace-cdn.com",
    "use.typekit.net",
    "p.typekit.net",
];

/// Decides whether a URL's hostname belongs to the fixed target-domain set.
///
/// Membership is exact and case-insensitive. URLs that fail to parse classify
/// as non-target; an unparseable reference is external noise, not an error.
#[derive(Debug, Clone)]
pub struct DomainClassifier {
    hosts: HashSet<String>,
}

impl DomainClassifier {
    /// Build a classifier over the given hostnames (lowercased on entry).
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: domains
                .into_iter()
                .map(|d| d.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Classifier over [`DEFAULT_TARGET_DOMAINS`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TARGET_DOMAINS)
    }

    /// Whether the canonical URL points at a target domain.
    #[must_use]
    pub fn is_target(&self, canonical_url: &str) -> bool {
        match Url::parse(canonical_url) {
            Ok(parsed) => parsed
                .host_str()
                .is_some_and(|host| self.hosts.contains(&host.to_ascii_lowercase())),
            Err(_) => false,
        }
    }

    /// The hostnames this classifier accepts, sorted.
    #[must_use]
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.hosts.iter().cloned().collect();
        domains.sort();
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_hostname_membership() {
        let classifier = DomainClassifier::with_defaults();
        assert!(classifier.is_target("https://assets.squarespace.com/universal/scripts.js"));
        assert!(!classifier.is_target("https://example.com/page"));
        // Subdomains are not members.
        assert!(!classifier.is_target("https://sub.assets.squarespace.com/x.js"));
    }

    #[test]
    fn hostname_matching_is_case_insensitive() {
        let classifier = DomainClassifier::new(["CDN.Example.COM"]);
        assert!(classifier.is_target("https://cdn.example.com/a.css"));
        assert!(classifier.is_target("https://CDN.EXAMPLE.COM/a.css"));
    }

    #[test]
    fn unparseable_urls_classify_as_external() {
        let classifier = DomainClassifier::with_defaults();
        assert!(!classifier.is_target("https://"));
        assert!(!classifier.is_target("not a url at all"));
        assert!(!classifier.is_target(""));
    }
}
