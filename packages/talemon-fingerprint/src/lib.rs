//! Pure content fingerprinting: raw HTML bytes in, `(content_hash, clean_hash)` out.
//!
//! No I/O, no shared state. `clean_hash` is computed over a canonicalized
//! feature stream with noise nodes (scripts, ads, styling) stripped, so that
//! incidental page churn does not register as a content change.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use sha1::{Digest, Sha1};

/// Tags stripped unconditionally before the feature stream is built.
const DEFAULT_STRIP_TAGS: &[&str] = &["script", "style", "iframe", "noscript", "meta", "link", "svg"];

/// Selectors describing ad/sponsored containers. `[class*="ad-"]`/`[id*="ad-"]`
/// implement the "any id or class containing the substring ad-" rule using a
/// real CSS attribute-substring selector rather than a bespoke string scan.
const DEFAULT_AD_SELECTORS: &[&str] = &[
    ".ad",
    ".ads",
    ".advertisement",
    "[class*=\"ad-\"]",
    "[id*=\"ad-\"]",
    ".sponsored",
    ".promo",
];

/// Attributes retained in the feature stream when present on a surviving element.
const DEFAULT_EXTRACT_ATTRS: &[&str] = &["href", "src", "alt", "title"];

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HasherConfig {
    pub strip_tags: Vec<String>,
    pub ad_selectors: Vec<String>,
    pub extract_attrs: Vec<String>,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            strip_tags: DEFAULT_STRIP_TAGS.iter().map(|s| s.to_string()).collect(),
            ad_selectors: DEFAULT_AD_SELECTORS.iter().map(|s| s.to_string()).collect(),
            extract_attrs: DEFAULT_EXTRACT_ATTRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HasherConfig {
    /// A stable identifier for this configuration. Changing the noise set, ad
    /// selectors, or retained attributes changes this value; it is recorded
    /// on `page_monitor` rows so a future migration can tell which historical
    /// `last_clean_hash` comparisons were made under a different fingerprinter.
    pub fn version(&self) -> String {
        let mut strip_tags = self.strip_tags.clone();
        strip_tags.sort();
        let mut ad_selectors = self.ad_selectors.clone();
        ad_selectors.sort();
        let mut extract_attrs = self.extract_attrs.clone();
        extract_attrs.sort();

        let canonical = format!(
            "strip={}|ads={}|attrs={}",
            strip_tags.join(","),
            ad_selectors.join(","),
            extract_attrs.join(",")
        );
        hex::encode(Sha1::digest(canonical.as_bytes()))
    }

    fn compiled_ad_selectors(&self) -> Vec<Selector> {
        self.ad_selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("response body is not valid UTF-8 after charset detection")]
    InvalidEncoding,
}

/// The pair of hashes produced for a single capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// SHA-1 over the raw bytes as received, before any normalization.
    pub content_hash: String,
    /// SHA-1 over the canonicalized, noise-stripped feature stream.
    pub clean_hash: String,
}

/// Compute `(content_hash, clean_hash)` for a raw HTML response body.
///
/// Deterministic: identical bytes and identical `config` always yield
/// identical hashes, on any host. Malformed HTML does not cause an error —
/// the parser recovers a lenient tree and a hash is still produced. The only
/// failure mode is a body that cannot be decoded as UTF-8.
pub fn fingerprint(raw: &[u8], config: &HasherConfig) -> Result<Fingerprint, FingerprintError> {
    let content_hash = hex::encode(Sha1::digest(raw));

    let text = std::str::from_utf8(raw).map_err(|_| FingerprintError::InvalidEncoding)?;
    let document = Html::parse_document(text);

    let noise_tags: HashSet<&str> = config.strip_tags.iter().map(|s| s.as_str()).collect();
    let ad_selectors = config.compiled_ad_selectors();

    let mut stream = String::new();
    walk(
        document.root_element(),
        &noise_tags,
        &ad_selectors,
        &config.extract_attrs,
        &mut stream,
    );

    let clean_hash = hex::encode(Sha1::digest(stream.as_bytes()));
    Ok(Fingerprint {
        content_hash,
        clean_hash,
    })
}

/// Pre-order walk emitting one feature record per surviving element.
///
/// An element whose tag is in the noise set, or that matches an ad selector,
/// is dropped along with its whole subtree — its children are never visited.
fn walk(
    el: ElementRef,
    noise_tags: &HashSet<&str>,
    ad_selectors: &[Selector],
    extract_attrs: &[String],
    out: &mut String,
) {
    let tag = el.value().name();
    if noise_tags.contains(tag) {
        return;
    }
    if ad_selectors.iter().any(|sel| sel.matches(&el)) {
        return;
    }

    let mut attrs: Vec<(String, String)> = el
        .value()
        .attrs()
        .filter(|(k, _)| extract_attrs.iter().any(|a| a == k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    attrs.sort();
    let attrs_field = attrs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");

    let text: String = el
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ");
    let text_field = collapse_whitespace(&text);

    out.push_str(tag);
    out.push('\t');
    out.push_str(&attrs_field);
    out.push('\t');
    out.push_str(&text_field);
    out.push('\n');

    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            walk(child_el, noise_tags, ad_selectors, extract_attrs, out);
        }
    }
}

/// Collapse runs of whitespace to a single space and trim both ends.
fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Serialize the noise-stripped tree back to an HTML fragment for archival
/// as `dom.html` — the cleaned DOM as actually used for fingerprinting, kept
/// alongside the raw response so a human can see what the hash saw. This is
/// a convenience rendering, not a validating HTML serializer (void elements
/// are not special-cased); it plays no role in the hash itself.
pub fn clean_dom_html(raw: &[u8], config: &HasherConfig) -> Result<String, FingerprintError> {
    let text = std::str::from_utf8(raw).map_err(|_| FingerprintError::InvalidEncoding)?;
    let document = Html::parse_document(text);

    let noise_tags: HashSet<&str> = config.strip_tags.iter().map(|s| s.as_str()).collect();
    let ad_selectors = config.compiled_ad_selectors();

    let mut out = String::new();
    render(document.root_element(), &noise_tags, &ad_selectors, &mut out);
    Ok(out)
}

fn render(el: ElementRef, noise_tags: &HashSet<&str>, ad_selectors: &[Selector], out: &mut String) {
    let tag = el.value().name();
    if noise_tags.contains(tag) {
        return;
    }
    if ad_selectors.iter().any(|sel| sel.matches(&el)) {
        return;
    }

    out.push('<');
    out.push_str(tag);
    for (key, value) in el.value().attrs() {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            render(child_el, noise_tags, ad_selectors, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(&escape_text(&text));
        }
    }

    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
