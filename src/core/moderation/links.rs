// Link extractor - finds URL-looking tokens and filters the allow-list.

use url::Url;

/// Extracts disallowed links from message text.
///
/// Hostnames are compared case-insensitively with a leading `www.`
/// stripped, so `www.discord.com` and `discord.com` are the same domain.
pub struct LinkExtractor {
    /// Lowercased hostnames.
    allowed_domains: Vec<String>,
}

impl LinkExtractor {
    pub fn new<I, S>(allowed_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|domain| domain.as_ref().trim().to_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
        }
    }

    /// Every URL-like token in `text` whose hostname is not allow-listed,
    /// in first-seen order and without deduplication.
    pub fn extract_disallowed(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .filter_map(url_candidate)
            .filter(|candidate| !self.is_allowed(candidate))
            .map(str::to_string)
            .collect()
    }

    /// A token that fails URL parsing is treated as not allowed: parse
    /// failure must never bypass the filter.
    fn is_allowed(&self, candidate: &str) -> bool {
        let parsed = if has_prefix_ignore_case(candidate, "http://")
            || has_prefix_ignore_case(candidate, "https://")
        {
            Url::parse(candidate)
        } else {
            // `www.` tokens carry no scheme; borrow one so the parser
            // can find the hostname.
            Url::parse(&format!("http://{candidate}"))
        };

        match parsed {
            Ok(url) => match url.host_str() {
                Some(host) => {
                    let host = host.strip_prefix("www.").unwrap_or(host);
                    self.allowed_domains.iter().any(|domain| domain == host)
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

/// The URL-like portion of a whitespace token: from the first `http://` or
/// `https://` onward, or the whole token when it starts with `www.`.
fn url_candidate(token: &str) -> Option<&str> {
    for (idx, _) in token.char_indices() {
        let rest = &token[idx..];
        if has_prefix_ignore_case(rest, "http://") || has_prefix_ignore_case(rest, "https://") {
            return Some(rest);
        }
    }
    if has_prefix_ignore_case(token, "www.") {
        return Some(token);
    }
    None
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(["discord.com", "discord.gg"])
    }

    #[test]
    fn flags_links_to_unknown_hosts() {
        let links = extractor().extract_disallowed("check this http://evil.example/x out");
        assert_eq!(links, vec!["http://evil.example/x"]);
    }

    #[test]
    fn allow_listed_hosts_pass() {
        let ex = extractor();
        assert!(ex
            .extract_disallowed("join via https://discord.com/invite/abc")
            .is_empty());
        // Leading www. is stripped before the allow-list lookup.
        assert!(ex
            .extract_disallowed("see www.discord.com/settings")
            .is_empty());
    }

    #[test]
    fn bare_www_tokens_are_extracted() {
        let links = extractor().extract_disallowed("go to www.sketchy.example now");
        assert_eq!(links, vec!["www.sketchy.example"]);
    }

    #[test]
    fn preserves_order_and_duplicates() {
        let links = extractor()
            .extract_disallowed("http://a.example https://b.example http://a.example");
        assert_eq!(
            links,
            vec!["http://a.example", "https://b.example", "http://a.example"]
        );
    }

    #[test]
    fn unparseable_tokens_are_kept() {
        // Host parsing fails here; the token must still be reported.
        let links = extractor().extract_disallowed("raw http://[broken link");
        assert_eq!(links, vec!["http://[broken"]);
    }

    #[test]
    fn scheme_found_mid_token() {
        let links = extractor().extract_disallowed("spam:http://evil.example/p");
        assert_eq!(links, vec!["http://evil.example/p"]);
    }

    #[test]
    fn plain_text_yields_nothing() {
        assert!(extractor()
            .extract_disallowed("nothing resembling a link here")
            .is_empty());
    }
}
