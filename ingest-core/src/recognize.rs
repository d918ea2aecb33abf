//! IOC recognition
//!
//! Pattern-based recognizers for the indicator kinds the extraction engine
//! consumes, plus the URL and IP helpers artifacts delegate to:
//! - URLs, including defanged forms (`hxxp`, `[.]`, `(dot)`, ...)
//! - IPv4 and IPv6 candidates
//! - MD5 / SHA1 / SHA256 / SHA512 digests
//! - YARA rules, found by scanning rule structure rather than by regex alone

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Range;
use std::sync::LazyLock;

/// Source of recognized indicator candidates.
///
/// Implementations return candidates in the order they appear in `text`.
/// No validation is promised beyond the shape of the match; callers filter.
pub trait Recognizer: Send + Sync {
    fn extract_urls(&self, text: &str) -> Vec<String>;
    fn extract_ips(&self, text: &str) -> Vec<String>;
    fn extract_yara_rules(&self, text: &str) -> Vec<String>;
    fn extract_hashes(&self, text: &str) -> Vec<String>;
}

/// Default recognizer backed by the patterns in this module
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternRecognizer;

impl Recognizer for PatternRecognizer {
    fn extract_urls(&self, text: &str) -> Vec<String> {
        extract_urls(text)
    }

    fn extract_ips(&self, text: &str) -> Vec<String> {
        extract_ips(text)
    }

    fn extract_yara_rules(&self, text: &str) -> Vec<String> {
        extract_yara_rules(text)
    }

    fn extract_hashes(&self, text: &str) -> Vec<String> {
        extract_hashes(text)
    }
}

// Defanged dot forms: [.] (.) {.} [dot] (dot) {dot}
const DEFANGED_DOT: &str = r"(?:\[\.\]|\(\.\)|\{\.\}|\[dot\]|\(dot\)|\{dot\})";

static DEFANGED_DOT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i){}", DEFANGED_DOT)).unwrap());

static SCHEMED_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:hxxps?|https?|h\[xx\]ps?|h\[tt\]ps?|fxp|ftps?|sftp)(?:\[://\]|(?:\[:\]|:)//)[^\s<>"'`]+"#,
    )
    .unwrap()
});

// ASCII host label characters; case-insensitive `[a-z]` would also admit
// case-fold letters such as U+017F
const HOST_CHARS: &str = r"(?-i:[a-zA-Z0-9-])+";

// Scheme-less hosts with at least one defanged dot, e.g. `evil[.]com/x`
static BARE_DEFANGED_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)\b{h}(?:(?:\.|{d}){h})*{d}{h}(?:(?:\.|{d}){h})*(?:/[^\s<>"'`]*)?"#,
        h = HOST_CHARS,
        d = DEFANGED_DOT
    ))
    .unwrap()
});

static DEFANGED_SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:hxxp|h\[xx\]p|h\[tt\]p)(s?)").unwrap());

static IPV4_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b\d{{1,3}}(?:(?:\.|{d})\d{{1,3}}){{3}}\b",
        d = DEFANGED_DOT
    ))
    .unwrap()
});

static IPV6_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z:.])((?:[0-9a-f]{0,4}:){2,7}[0-9a-f]{0,4})").unwrap()
});

static MD5_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{32}\b").unwrap());

static SHA1_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{40}\b").unwrap());

static SHA256_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{64}\b").unwrap());

static SHA512_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{128}\b").unwrap());

static YARA_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(?:^|[\s;}])((?:(?:private|global)\s+)*rule\s+[A-Za-z_][A-Za-z0-9_]*(?:\s*:(?:\s*[A-Za-z_][A-Za-z0-9_]*)+)?\s*\{)",
    )
    .unwrap()
});

static YARA_CONDITION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcondition\s*:").unwrap());

static YARA_IMPORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:import|include)\s+"[^"]*"$"#).unwrap());

/// Recognize URL candidates, schemed and defanged, in order of appearance
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    let mut spans: Vec<Range<usize>> = Vec::new();

    for m in SCHEMED_URL_REGEX.find_iter(text) {
        let url = trim_url(m.as_str());
        if !url.contains("//") || url.ends_with("//") || url.ends_with("[://]") {
            continue;
        }
        spans.push(m.start()..m.start() + url.len());
        found.push((m.start(), url.to_string()));
    }

    for m in BARE_DEFANGED_URL_REGEX.find_iter(text) {
        let range = m.range();
        if spans.iter().any(|s| s.start < range.end && range.start < s.end) {
            continue;
        }
        // part of an email address
        if text[..range.start].ends_with('@') {
            continue;
        }
        let url = trim_url(m.as_str());
        found.push((range.start, url.to_string()));
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, url)| url).collect()
}

/// Recognize IPv4 then IPv6 candidates. Candidates are not validated.
pub fn extract_ips(text: &str) -> Vec<String> {
    let mut ips: Vec<String> = IPV4_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    for caps in IPV6_REGEX.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let candidate = m.as_str();
            if candidate.chars().any(|c| c.is_ascii_hexdigit()) {
                ips.push(candidate.to_string());
            }
        }
    }

    ips
}

/// Recognize hex digests, grouped MD5, SHA1, SHA256, SHA512
pub fn extract_hashes(text: &str) -> Vec<String> {
    [&*MD5_REGEX, &*SHA1_REGEX, &*SHA256_REGEX, &*SHA512_REGEX]
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
        .collect()
}

/// Recognize complete YARA rules.
///
/// A rule header (`[private|global] rule name [: tags] {`) starts a candidate;
/// the body is brace-matched while skipping string literals, regex literals
/// and comments. Bodies without a `condition:` section are discarded.
/// `import`/`include` lines directly above a rule are kept with it.
pub fn extract_yara_rules(text: &str) -> Vec<String> {
    let mut rules = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = YARA_HEADER_REGEX.captures_at(text, pos) else {
            break;
        };
        let Some(header) = caps.get(1) else {
            break;
        };
        let open = header.end() - 1;

        match find_block_end(text, open) {
            Some(end) if YARA_CONDITION_REGEX.is_match(&text[open..end]) => {
                let start = extend_over_imports(text, header.start());
                rules.push(text[start..end].trim().to_string());
                pos = end;
            }
            _ => pos = header.end(),
        }
    }

    rules
}

/// Replace defanged notation with its plain form, adding `http://` to
/// scheme-less candidates
pub fn refang(url: &str) -> String {
    let mut plain = DEFANGED_DOT_REGEX.replace_all(url, ".").into_owned();
    plain = plain
        .replace("[://]", "://")
        .replace("[:]", ":")
        .replace("[/]", "/");
    plain = DEFANGED_SCHEME_REGEX.replace(&plain, "http$1").into_owned();
    if plain.get(..3).is_some_and(|scheme| scheme.eq_ignore_ascii_case("fxp")) {
        plain = format!("ftp{}", &plain[3..]);
    }
    if !plain.contains("://") {
        plain = format!("http://{}", plain);
    }
    plain
}

/// True when the raw URL differs from its refanged form
pub fn is_obfuscated(url: &str) -> bool {
    refang(url) != url
}

/// Host of a (possibly defanged) URL, lowercased, without userinfo or port
pub fn url_host(url: &str) -> Option<String> {
    netloc_host(&refang(url))
}

/// Host component of a `scheme://authority/...` string, taken as written
pub fn netloc_host(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest
        .split(['/', '?', '#', '\\'])
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();

    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => host_port,
        }
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// True when `host` is a dotted name rather than an IP literal
pub fn looks_like_domain(host: &str) -> bool {
    !host.is_empty()
        && host.contains('.')
        && parse_ip(host).is_none()
        && host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_')
}

/// Parse a (possibly defanged) IP candidate. Invalid input yields `None`.
pub fn parse_ip(candidate: &str) -> Option<IpAddr> {
    let plain = DEFANGED_DOT_REGEX.replace_all(candidate.trim(), ".");
    let plain = plain.trim_start_matches('[').trim_end_matches(']');
    plain.parse::<IpAddr>().ok()
}

/// True for private, loopback, link-local and other non-routable addresses
pub fn is_private_or_loopback(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // this network, IETF protocol assignments, benchmarking, reserved
        || a == 0
        || (a == 192 && b == 0 && ip.octets()[2] == 0)
        || (a == 198 && (b == 18 || b == 19))
        || a >= 240
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_v4(&mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link local fe80::/10
        || (first & 0xffc0) == 0xfe80
        // documentation 2001:db8::/32
        || (first == 0x2001 && ip.segments()[1] == 0x0db8)
}

fn trim_url(url: &str) -> &str {
    url.trim_end_matches(|c: char| {
        matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '>' | '\'' | '"')
    })
}

/// Index just past the `}` closing the block opened at `open`
fn find_block_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut last_significant = b'{';
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => {
                i = skip_delimited(bytes, i, b'"')?;
                last_significant = b'"';
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = text[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = i + 2 + text[i + 2..].find("*/")? + 2;
                continue;
            }
            b'/' if last_significant == b'=' => {
                i = skip_delimited(bytes, i, b'/')?;
                last_significant = b'/';
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            last_significant = b;
        }
        i += 1;
    }

    None
}

/// Skip a single-line literal starting at `start`; returns the index after
/// its closing delimiter
fn skip_delimited(bytes: &[u8], start: usize, delimiter: u8) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b if b == delimiter => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn extend_over_imports(text: &str, header_start: usize) -> usize {
    let head = &text[..header_start];
    let line_begin = head.rfind('\n').map_or(0, |p| p + 1);
    if !head[line_begin..].trim().is_empty() {
        return header_start;
    }

    let mut start = header_start;
    let mut offset = line_begin;
    for line in head[..line_begin].split_inclusive('\n').rev() {
        offset -= line.len();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if YARA_IMPORT_REGEX.is_match(trimmed) {
            start = offset;
        } else {
            break;
        }
    }
    start
}
