use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

/// pure parsers, one per link in the embed chain. none of these touch the network -
/// they take HTML/text already fetched by a strategy and return the next hop's URL
/// or a terminal `.m3u8`. kept separate from transport so they're testable with
/// canned fixtures.

static IFRAME_SRC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)id=["']the_frame["'][^>]*src=["']([^"']+)["']"#).unwrap());
static PRORCP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)/prorcp/([A-Za-z0-9_\-]+)"#).unwrap());
static PLAYERJS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)Playerjs\(\s*\{[^}]*file\s*:\s*['"]([^'"]+\.m3u8[^'"]*)['"]"#).unwrap());
static DIRECT_M3U8_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)(https?://[^\s'"]+\.m3u8[^\s'"]*)"#).unwrap());

/// hop 1: the VidSrc/embed.su embed page. pulls the `#the_frame` iframe src, which
/// is either a full URL or a path relative to the embed host.
pub fn parse_vidsrc_embed(html: &str) -> Option<String> {
    if let Some(caps) = IFRAME_SRC_RE.captures(html) {
        return Some(caps[1].to_string());
    }

    // fall back to a DOM query in case the markup uses attribute ordering the
    // regex above doesn't anticipate
    let document = Html::parse_document(html);
    let selector = Selector::parse("#the_frame").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(|s| s.to_string())
}

/// hop 2: the cloudnestra `/rcp` page, which links to a `/prorcp/<opaque>` path.
pub fn parse_rcp_page(html: &str) -> Option<String> {
    PRORCP_RE.captures(html).map(|caps| format!("/prorcp/{}", &caps[1]))
}

/// hop 3: the ProRCP page. Either it embeds a `Playerjs({file:'...m3u8'})` literal
/// directly, or it redirects to the Shadowlands origin for a further hop.
pub fn parse_prorcp_page(html: &str) -> Option<String> {
    if let Some(caps) = PLAYERJS_RE.captures(html) {
        return Some(caps[1].to_string());
    }
    DIRECT_M3U8_RE.captures(html).map(|caps| caps[1].to_string())
}

/// hop 4 (when Shadowlands is in play): the origin page that finally names the
/// playable `.m3u8`.
pub fn parse_shadowlands_page(html: &str) -> Option<String> {
    if let Some(caps) = PLAYERJS_RE.captures(html) {
        return Some(caps[1].to_string());
    }
    DIRECT_M3U8_RE.captures(html).map(|caps| caps[1].to_string())
}

/// resolves a possibly-relative hop URL against the page it was found on.
pub fn resolve_hop_url(base: &str, maybe_relative: &str) -> Option<String> {
    let base_url = url::Url::parse(base).ok()?;
    base_url.join(maybe_relative).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iframe_src_from_embed_page() {
        let html = r#"<html><body><iframe id="the_frame" src="/embed/cloudnestra/abc123"></iframe></body></html>"#;
        assert_eq!(parse_vidsrc_embed(html), Some("/embed/cloudnestra/abc123".to_string()));
    }

    #[test]
    fn parses_prorcp_path_from_rcp_page() {
        let html = r#"<script>window.location = "/prorcp/xZy9-Ab12";</script>"#;
        assert_eq!(parse_rcp_page(html), Some("/prorcp/xZy9-Ab12".to_string()));
    }

    #[test]
    fn parses_playerjs_literal_from_prorcp_page() {
        let html = r#"<script>Playerjs({"id": "player", file:'https://cdn.example.com/stream/index.m3u8?token=abc'});</script>"#;
        assert_eq!(
            parse_prorcp_page(html),
            Some("https://cdn.example.com/stream/index.m3u8?token=abc".to_string())
        );
    }

    #[test]
    fn falls_back_to_direct_m3u8_match() {
        let html = r#"var src = "https://cdn.shadowlandschronicles.com/hls/out.m3u8";"#;
        assert_eq!(
            parse_shadowlands_page(html),
            Some("https://cdn.shadowlandschronicles.com/hls/out.m3u8".to_string())
        );
    }

    #[test]
    fn returns_none_when_nothing_matches() {
        assert_eq!(parse_vidsrc_embed("<html><body>nope</body></html>"), None);
    }

    #[test]
    fn resolves_relative_hop_against_page_base() {
        let resolved = resolve_hop_url("https://vidsrc.xyz/embed/movie/tt123", "/embed/cloudnestra/abc");
        assert_eq!(resolved, Some("https://vidsrc.xyz/embed/cloudnestra/abc".to_string()));
    }
}
