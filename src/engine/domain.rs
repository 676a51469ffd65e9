//! Registrable-domain extraction for hostname-shaped fields.
//!
//! `SplitDomain` enrichment reduces `"mail.example.co.uk"` to its registrable
//! domain `"example.co.uk"`: the longest public suffix known to the static
//! suffix list plus one label. When no listed suffix matches, the two
//! rightmost labels are used, which is the right answer for the common
//! `example.com` shape.
//!
//! The built-in list covers the multi-label suffixes that actually occur in
//! vendor logs; it is not a full public-suffix database and does not try to
//! be. Inputs that are not hostname-shaped (IPs, URLs, free text) yield
//! `None` rather than a bogus split.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Multi-label public suffixes recognized in addition to plain TLDs.
static MULTI_LABEL_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "ac.uk", "co.uk", "gov.uk", "ltd.uk", "me.uk", "net.uk", "org.uk", "plc.uk", "sch.uk",
        "com.au", "net.au", "org.au", "edu.au", "gov.au", "id.au",
        "ac.nz", "co.nz", "net.nz", "org.nz", "govt.nz",
        "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
        "com.br", "net.br", "org.br", "gov.br",
        "com.cn", "net.cn", "org.cn", "gov.cn",
        "com.mx", "org.mx", "gob.mx",
        "co.in", "net.in", "org.in", "gov.in", "ac.in",
        "com.sg", "edu.sg", "gov.sg",
        "com.tr", "gov.tr", "org.tr",
        "co.za", "org.za", "gov.za",
        "co.kr", "or.kr", "go.kr",
        "com.hk", "org.hk",
        "com.tw", "org.tw",
        "com.ar", "com.co", "com.pe", "com.ve",
        "co.il", "org.il", "ac.il",
        "co.th", "or.th",
        "com.my", "com.ph", "com.vn",
        "com.eg", "com.sa", "com.ua",
    ])
});

fn is_hostname_shaped(host: &str) -> bool {
    // Labels of letters/digits/hyphens, dot-separated, alphabetic TLD. This
    // deliberately excludes bare IPs: there is no registrable domain in one.
    regex!(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$").is_match(host)
}

/// Extract the registrable domain from a hostname.
///
/// Returns `None` when `host` is not hostname-shaped or has no label left of
/// its suffix (the host *is* a suffix).
pub fn registrable_domain(host: &str) -> Option<&str> {
    if !is_hostname_shaped(host) {
        return None;
    }
    if MULTI_LABEL_SUFFIXES.contains(host) {
        // The host is itself a public suffix.
        return None;
    }

    // Longest-suffix match: try each dot-separated suffix from the longest
    // candidate down. `dots` holds the byte index after each '.'.
    let dots: Vec<usize> = host.match_indices('.').map(|(i, _)| i + 1).collect();
    for (label_idx, start) in dots.iter().enumerate() {
        if MULTI_LABEL_SUFFIXES.contains(&host[*start..]) {
            // One label to the left of the suffix is the registrable domain.
            let reg_start = if label_idx == 0 { 0 } else { dots[label_idx - 1] };
            return Some(&host[reg_start..]);
        }
    }

    // Two-label default: TLD plus one label.
    match dots.len() {
        0 => None,
        1 => Some(host),
        n => Some(&host[dots[n - 2]..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_label_default() {
        assert_eq!(registrable_domain("example.com"), Some("example.com"));
        assert_eq!(registrable_domain("mail.example.com"), Some("example.com"));
        assert_eq!(registrable_domain("a.b.c.example.org"), Some("example.org"));
    }

    #[test]
    fn listed_multi_label_suffixes_win() {
        assert_eq!(registrable_domain("mail.example.co.uk"), Some("example.co.uk"));
        assert_eq!(registrable_domain("example.co.uk"), Some("example.co.uk"));
        assert_eq!(registrable_domain("deep.sub.host.com.au"), Some("host.com.au"));
    }

    #[test]
    fn bare_suffix_has_no_registrable_domain() {
        assert_eq!(registrable_domain("co.uk"), None);
        assert_eq!(registrable_domain("com"), None);
    }

    #[test]
    fn non_hostnames_are_rejected() {
        for bad in ["10.0.0.1", "not a host", "http://example.com", "", "trailing.dot.", "-bad.example.com"] {
            assert_eq!(registrable_domain(bad), None, "{bad:?} should not split");
        }
    }

    #[test]
    fn hyphenated_labels() {
        assert_eq!(registrable_domain("log-01.my-corp.net"), Some("my-corp.net"));
    }
}
