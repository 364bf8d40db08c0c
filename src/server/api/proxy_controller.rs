use axum::{
    Router,
    extract::Query,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::Deserialize;
use tracing::{debug, error, info};

/// Supported compression encodings
#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// determine the best encoding based on Accept-Encoding header. apple's HLS
    /// player sends "gzip, deflate" or "identity" and that preference is
    /// respected rather than always picking the best available codec.
    fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        match accept_encoding {
            Some(v) => {
                if v == "identity" || v.starts_with("identity,") {
                    return Self::None;
                }
                if v.contains("zstd") {
                    Self::Zstd
                } else if v.contains("gzip") {
                    Self::Gzip
                } else {
                    Self::None
                }
            }
            None => Self::None,
        }
    }

    fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

use crate::server::{
    error::{AppResult, Error},
    extractors::ClientIdentity,
    services::{
        cookie_services::CookieService, header_policy::apply_source_headers,
        proxy_cache_services::ProxyCacheServiceTrait, rate_limit_services::RateLimitResult,
    },
    utils::signature_utils::SignatureUtil,
};

#[derive(Deserialize)]
struct ProxyQuery {
    url: String,
    source: Option<String>,
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route("/", get(Self::proxy_get).options(Self::proxy_options))
    }

    /// build m3u8 response with proper headers and optional compression
    fn build_m3u8_response(processed_body: &str, headers: &HeaderMap) -> AppResult<Response> {
        let encoding = ContentEncoding::from_accept_encoding(
            headers.get(header::ACCEPT_ENCODING).and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            "application/vnd.apple.mpegurl".parse().expect("static header value should parse"),
        );
        response_headers.insert(
            header::CACHE_CONTROL,
            "no-cache".parse().expect("static header value should parse"),
        );

        let response_body: Vec<u8> = if encoding != ContentEncoding::None {
            let compressed_body = encoding.compress(processed_body.as_bytes()).map_err(|e| {
                error!("Failed to compress response with {:?}: {}", encoding, e);
                Error::InternalServerErrorWithContext("Failed to compress response".to_string())
            })?;
            debug!(
                "Compressed M3U8 with {:?} from {} to {} bytes",
                encoding,
                processed_body.len(),
                compressed_body.len()
            );
            if let Some(enc_header) = encoding.as_header_value() {
                response_headers.insert(
                    header::CONTENT_ENCODING,
                    enc_header.parse().expect("static header value should parse"),
                );
            }
            compressed_body
        } else {
            processed_body.as_bytes().to_vec()
        };

        response_headers.insert(
            header::CONTENT_LENGTH,
            response_body.len().to_string().parse().expect("content length should parse"),
        );

        Ok((StatusCode::OK, response_headers, response_body).into_response())
    }

    async fn proxy_get(
        ClientIdentity(client_id, services): ClientIdentity,
        Query(params): Query<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        match services.rate_limit.check_rate_limit(&client_id).await {
            RateLimitResult::RateLimited { retry_after } => {
                return Err(Error::RateLimited { retry_after_secs: retry_after });
            }
            RateLimitResult::TimedOut { retry_after, .. } => {
                return Err(Error::RateLimited { retry_after_secs: retry_after });
            }
            RateLimitResult::Allowed { .. } => {}
        }

        let target_url = Self::decode_url(&params.url)?;

        if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
            return Err(Error::BadRequest("Invalid URL format".to_string()));
        }

        let target_host = url::Url::parse(&target_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()));

        let allowed_hosts = services.config.proxy_allowed_hosts();
        let host_allowed = target_host
            .as_deref()
            .is_some_and(|host| allowed_hosts.iter().any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}"))));

        if !host_allowed {
            error!("Rejecting proxy request to disallowed host: {:?}", target_host);
            return Err(Error::Forbidden("Target host is not on the proxy allow list".to_string()));
        }

        let source = params.source.as_deref().unwrap_or("vidsrc");
        debug!("Proxying (source={}): {}", source, target_url);

        let (cached_m3u8, cached_segment) = services.proxy_cache.get_cached(&target_url).await;

        if let Some(text) = cached_m3u8 {
            debug!("Serving m3u8 from cache: {}", target_url);
            let processed_body = Self::process_manifest(&text, &target_url, &client_id, &services.signature_util, source)?;
            return Ok(Self::build_m3u8_response(&processed_body, &headers)?);
        }

        if let Some(bytes) = cached_segment {
            debug!("Serving segment from cache ({} bytes): {}", bytes.len(), target_url);
            return Ok(Self::segment_response(bytes, &headers, None)?);
        }

        if let Some(bytes) = services.proxy_cache.wait_for_inflight(&target_url).await {
            debug!("Serving segment after inflight wait ({} bytes): {}", bytes.len(), target_url);
            return Ok(Self::segment_response(bytes, &headers, None)?);
        }

        // extract domain for cookie handling
        let domain = CookieService::extract_domain(&target_url);

        let stored_cookies = if let Some(ref d) = domain {
            services.cookies.get_cookies(d).await
        } else {
            None
        };

        let build_request = || {
            let mut request_builder = apply_source_headers(
                services.http.get(&target_url),
                source,
                &target_url,
                &services.config.stream_user_agent,
            );
            if let Some(cookies) = &stored_cookies {
                request_builder = request_builder.header(header::COOKIE, cookies.clone());
            }
            request_builder
        };

        // origin 5xx gets exactly one retry after a short backoff before we give
        // up and surface it as an origin_failure - transport-level failures are
        // not retried here since reqwest already applies its own connect retry.
        let mut target_response = build_request().send().await.map_err(|e| {
            error!("Request failed: {}", e);
            let rate_limit = services.rate_limit.clone();
            let uid = client_id.clone();
            tokio::spawn(async move {
                rate_limit.record_error(&uid, "proxy_request_failed").await;
            });
            Error::InternalServerErrorWithContext(format!("Request failed: {}", e))
        })?;

        if target_response.status().is_server_error() {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            target_response = build_request().send().await.map_err(|e| {
                error!("Retry request failed: {}", e);
                Error::InternalServerErrorWithContext(format!("Request failed: {}", e))
            })?;
        }

        if let Some(ref d) = domain {
            let set_cookies: Vec<String> = target_response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
                .collect();

            if !set_cookies.is_empty() {
                let cookie_service = services.cookies.clone();
                let domain_clone = d.clone();
                tokio::spawn(async move {
                    cookie_service.store_cookies(&domain_clone, &set_cookies).await;
                });
            }
        }

        let response_status = target_response.status();
        if !response_status.is_success() {
            error!("User: {}, Response from target not successful: {}", client_id, response_status);
            if response_status.is_client_error() {
                let rate_limit = services.rate_limit.clone();
                let uid = client_id.clone();
                tokio::spawn(async move {
                    rate_limit.record_error(&uid, "proxy_upstream_client_error").await;
                });
            }
            return Err(Error::OriginFailure(format!("upstream returned {response_status}")));
        }

        let content_type = target_response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let content_encoding = target_response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let is_mp4 = content_type.contains("video/mp4");

        let bytes = target_response.bytes().await.map_err(|e| {
            error!("Failed to read response: {}", e);
            Error::InternalServerErrorWithContext(format!("Failed to read response: {}", e))
        })?;

        let decompressed: Vec<u8> = match content_encoding.as_deref() {
            Some("zstd") => zstd::decode_all(&bytes[..]).map_err(|e| {
                error!("Failed to decompress zstd: {}", e);
                Error::InternalServerErrorWithContext("Failed to decompress response".to_string())
            })?,
            Some("gzip") => {
                let mut decoder = GzDecoder::new(&bytes[..]);
                let mut decomp: Vec<u8> = Vec::new();
                decoder.read_to_end(&mut decomp).map_err(|e| {
                    error!("Failed to decompress gzip response: {}", e);
                    Error::InternalServerErrorWithContext("Failed to decompress response".to_string())
                })?;
                decomp
            }
            _ => bytes.to_vec(),
        };

        let is_m3u8 = if is_mp4 {
            false
        } else {
            decompressed.starts_with(b"#EXT") || content_type.contains("mpegurl") || content_type.contains("m3u8")
        };

        if is_m3u8 {
            let text = String::from_utf8(decompressed).map_err(|e| {
                error!("Failed to parse m3u8 as UTF-8: {}", e);
                Error::InternalServerErrorWithContext("Invalid m3u8 encoding".to_string())
            })?;

            let cache = services.proxy_cache.clone();
            let cache_url = target_url.clone();
            let cache_text = text.clone();
            tokio::spawn(async move { cache.cache_m3u8(&cache_url, &cache_text).await });

            let segment_urls = Self::collect_segment_urls(&text, &target_url);
            if !segment_urls.is_empty() {
                let cache = services.proxy_cache.clone();
                let source = source.to_string();
                tokio::spawn(async move { cache.prefetch_segments(segment_urls, source).await });
            }

            let processed_body = Self::process_manifest(&text, &target_url, &client_id, &services.signature_util, source)?;
            Ok(Self::build_m3u8_response(&processed_body, &headers)?)
        } else {
            let cache = services.proxy_cache.clone();
            let cache_url = target_url.clone();
            let cache_bytes = decompressed.clone();
            tokio::spawn(async move { cache.cache_segment(&cache_url, &cache_bytes).await });

            Ok(Self::segment_response(decompressed, &headers, Some(is_mp4))?)
        }
    }

    /// byte-range aware response for segments/MP4 bodies, honoring the client's
    /// Accept-Encoding for full (non-range) responses only.
    fn segment_response(full_bytes: Vec<u8>, headers: &HeaderMap, is_mp4: Option<bool>) -> AppResult<Response> {
        let is_mp4 = is_mp4.unwrap_or(false);
        let total_len = full_bytes.len();

        let (response_bytes, status_code, range_header) = if let Some(range_value) = headers.get(header::RANGE) {
            if let Ok(range_str) = range_value.to_str() {
                if let Some(range_part) = range_str.strip_prefix("bytes=") {
                    let parts: Vec<&str> = range_part.split('-').collect();
                    if parts.len() == 2 {
                        let start: usize = parts[0].parse().unwrap_or(0);
                        let end: usize = if parts[1].is_empty() {
                            total_len.saturating_sub(1)
                        } else {
                            parts[1].parse().unwrap_or(total_len.saturating_sub(1))
                        };
                        let end = end.min(total_len.saturating_sub(1));

                        if start < total_len && start <= end {
                            let sliced = full_bytes[start..=end].to_vec();
                            let content_range = format!("bytes {}-{}/{}", start, end, total_len);
                            (sliced, StatusCode::PARTIAL_CONTENT, Some(content_range))
                        } else {
                            (full_bytes, StatusCode::OK, None)
                        }
                    } else {
                        (full_bytes, StatusCode::OK, None)
                    }
                } else {
                    (full_bytes, StatusCode::OK, None)
                }
            } else {
                (full_bytes, StatusCode::OK, None)
            }
        } else {
            (full_bytes, StatusCode::OK, None)
        };

        let encoding = ContentEncoding::from_accept_encoding(
            headers.get(header::ACCEPT_ENCODING).and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            "video/mp2t".parse().expect("static header value should parse"),
        );

        let cache_control = if is_mp4 { "public, max-age=3600" } else { "public, max-age=31536000" };
        response_headers.insert(header::CACHE_CONTROL, cache_control.parse().expect("static header value should parse"));
        response_headers.insert(header::ACCEPT_RANGES, "bytes".parse().expect("static header value should parse"));

        if let Some(range_val) = range_header {
            response_headers.insert(header::CONTENT_RANGE, range_val.parse().expect("range header should parse"));
        }

        let final_bytes = if encoding != ContentEncoding::None && status_code != StatusCode::PARTIAL_CONTENT {
            let compressed_bytes = encoding.compress(&response_bytes).map_err(|e| {
                error!("Failed to compress binary response with {:?}: {}", encoding, e);
                Error::InternalServerErrorWithContext("Failed to compress response".to_string())
            })?;
            if let Some(enc_header) = encoding.as_header_value() {
                response_headers.insert(header::CONTENT_ENCODING, enc_header.parse().expect("static header value should parse"));
            }
            compressed_bytes
        } else {
            response_bytes
        };

        response_headers.insert(
            header::CONTENT_LENGTH,
            final_bytes.len().to_string().parse().expect("content length should parse"),
        );

        Ok((status_code, response_headers, final_bytes).into_response())
    }

    async fn proxy_options() -> impl IntoResponse {
        StatusCode::NO_CONTENT
    }

    fn decode_url(url_param: &str) -> AppResult<String> {
        if url_param.starts_with("http://") || url_param.starts_with("https://") {
            urlencoding::decode(url_param).map(|s| s.to_string()).map_err(|e| {
                error!("Failed to decode URL: {}", e);
                Error::BadRequest("Invalid URL encoding".to_string())
            })
        } else {
            let mut padded = url_param.to_string();
            while !padded.len().is_multiple_of(4) {
                padded.push('=');
            }

            URL_SAFE
                .decode(&padded)
                .map_err(|e| {
                    error!("Failed to decode base64: {}", e);
                    Error::BadRequest("Invalid URL encoding".to_string())
                })
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|e| {
                        error!("Failed to parse UTF-8: {}", e);
                        Error::BadRequest("Invalid URL encoding".to_string())
                    })
                })
        }
    }

    fn resolve(base_path: &str, base_url: &url::Url, trimmed: &str) -> String {
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else if trimmed.starts_with('/') {
            format!("{}://{}{}", base_url.scheme(), base_url.host_str().unwrap_or(""), trimmed)
        } else {
            match url::Url::parse(base_path).and_then(|base| base.join(trimmed)) {
                Ok(resolved) => resolved.to_string(),
                Err(e) => {
                    error!("Failed to resolve: {} - {}", trimmed, e);
                    trimmed.to_string()
                }
            }
        }
    }

    /// a line or URI attribute already pointing at this proxy's own mount path
    /// (`/stream-proxy?url=...`) has already been rewritten in a prior pass -
    /// re-signing it would double-wrap the URL instead of leaving it alone.
    fn is_already_proxied(uri: &str) -> bool {
        uri.contains("/stream-proxy?url=")
    }

    fn sign(full_url: &str, client_id: &str, signature_util: &SignatureUtil, source: &str) -> String {
        let encoded = URL_SAFE.encode(full_url.as_bytes()).trim_end_matches('=').to_string();
        let expiry = SignatureUtil::generate_expiry(12);
        let signature = signature_util.generate_signature(client_id, expiry, &encoded);

        format!(
            "/stream-proxy?url={}&source={}&sig={}&exp={}&client={}",
            encoded,
            urlencoding::encode(source),
            signature,
            expiry,
            urlencoding::encode(client_id)
        )
    }

    /// walks a manifest once collecting every segment/sub-resource URI a player
    /// will fetch next, so they can be prefetched into cache ahead of the
    /// client actually asking for them.
    fn collect_segment_urls(text: &str, target_url: &str) -> Vec<String> {
        let Ok(base_url) = url::Url::parse(target_url) else {
            return Vec::new();
        };
        let base_path = Self::base_path(&base_url);

        text.lines()
            .filter(|line| !line.trim().starts_with("##"))
            .filter_map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return None;
                }
                Some(Self::resolve(&base_path, &base_url, trimmed))
            })
            .collect()
    }

    fn base_path(base_url: &url::Url) -> String {
        format!(
            "{}://{}{}",
            base_url.scheme(),
            base_url.host_str().unwrap_or(""),
            &base_url.path()[..base_url.path().rfind('/').unwrap_or(0) + 1]
        )
    }

    /// rewrites every URI a HLS manifest can carry into a signed proxy URL:
    /// plain media/segment lines, `#EXT-X-STREAM-INF` variant URIs on the
    /// following line, and the `URI="..."` attribute on `#EXT-X-MEDIA`,
    /// `#EXT-X-MAP` and `#EXT-X-KEY` tags.
    fn process_manifest(
        text: &str,
        target_url: &str,
        client_id: &str,
        signature_util: &SignatureUtil,
        source: &str,
    ) -> AppResult<String> {
        let base_url = url::Url::parse(target_url).map_err(|e| {
            error!("Failed to parse base URL: {}", e);
            Error::InternalServerErrorWithContext(format!("Invalid base URL: {}", e))
        })?;
        let base_path = Self::base_path(&base_url);

        let mut out_lines: Vec<String> = Vec::new();
        let mut next_line_is_variant_uri = false;

        for raw_line in text.lines() {
            let trimmed = raw_line.trim();

            if trimmed.starts_with("##") {
                continue;
            }

            if trimmed.is_empty() {
                out_lines.push(raw_line.to_string());
                continue;
            }

            if let Some(rewritten) =
                Self::rewrite_attribute_uri(trimmed, &base_path, &base_url, client_id, signature_util, source)
            {
                out_lines.push(rewritten);
                next_line_is_variant_uri = trimmed.starts_with("#EXT-X-STREAM-INF");
                continue;
            }

            if trimmed.starts_with('#') {
                out_lines.push(raw_line.to_string());
                next_line_is_variant_uri = trimmed.starts_with("#EXT-X-STREAM-INF");
                continue;
            }

            if next_line_is_variant_uri {
                next_line_is_variant_uri = false;
            }

            if Self::is_already_proxied(trimmed) {
                out_lines.push(raw_line.to_string());
                continue;
            }

            let full_url = Self::resolve(&base_path, &base_url, trimmed);
            out_lines.push(Self::sign(&full_url, client_id, signature_util, source));
        }

        Ok(out_lines.join("\n"))
    }

    /// rewrites the `URI="..."` attribute found on `#EXT-X-MEDIA`, `#EXT-X-MAP`
    /// and `#EXT-X-KEY` tags in place, leaving the rest of the tag untouched.
    /// returns `None` for tags without a rewritable URI attribute.
    fn rewrite_attribute_uri(
        tag_line: &str,
        base_path: &str,
        base_url: &url::Url,
        client_id: &str,
        signature_util: &SignatureUtil,
        source: &str,
    ) -> Option<String> {
        let is_rewritable_tag = tag_line.starts_with("#EXT-X-MEDIA:")
            || tag_line.starts_with("#EXT-X-MAP:")
            || tag_line.starts_with("#EXT-X-KEY:");

        if !is_rewritable_tag {
            return None;
        }

        let uri_start = tag_line.find("URI=\"")? + "URI=\"".len();
        let uri_end = uri_start + tag_line[uri_start..].find('"')?;
        let original_uri = &tag_line[uri_start..uri_end];

        if Self::is_already_proxied(original_uri) {
            return None;
        }

        let full_url = Self::resolve(base_path, base_url, original_uri);
        let signed = Self::sign(&full_url, client_id, signature_util, source);

        Some(format!("{}{}{}", &tag_line[..uri_start], signed, &tag_line[uri_end..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig_util() -> SignatureUtil {
        SignatureUtil::new("test-secret".to_string())
    }

    fn assert_all_lines_proxied(rewritten: &str) {
        for line in rewritten.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || (trimmed.starts_with('#') && !trimmed.contains("URI=\"")) {
                continue;
            }
            assert!(
                trimmed.contains("/stream-proxy?url=") || trimmed.starts_with("#EXT"),
                "line not rewritten: {trimmed}"
            );
        }
    }

    #[test]
    fn process_manifest_rewrites_plain_segment_lines() {
        let manifest = "#EXTM3U\n#EXTINF:10.0,\nsegment0.ts\nsegment1.ts\n";
        let out = ProxyController::process_manifest(
            manifest,
            "https://shadowlands.example/hls/index.m3u8",
            "client-1",
            &sig_util(),
            "vidsrc",
        )
        .expect("process_manifest should succeed");

        assert!(out.starts_with("#EXTM3U"));
        assert_all_lines_proxied(&out);
        assert!(out.lines().filter(|l| l.contains("/stream-proxy?url=")).count() == 2);
    }

    #[test]
    fn process_manifest_rewrites_variant_stream_inf_uris() {
        let manifest = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2000000\nhttps://cdn.example/hi/index.m3u8\n";
        let out = ProxyController::process_manifest(
            manifest,
            "https://shadowlands.example/hls/master.m3u8",
            "client-1",
            &sig_util(),
            "vidsrc",
        )
        .expect("process_manifest should succeed");

        let rewritten_lines: Vec<&str> =
            out.lines().filter(|l| l.contains("/stream-proxy?url=")).collect();
        assert_eq!(rewritten_lines.len(), 2, "both variant URIs should be rewritten: {out}");
    }

    #[test]
    fn process_manifest_rewrites_media_map_and_key_uri_attributes() {
        let manifest = "#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",URI=\"audio/index.m3u8\"\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXT-X-KEY:METHOD=AES-128,URI=\"https://shadowlands.example/key?x=1\"\nsegment0.ts\n";
        let out = ProxyController::process_manifest(
            manifest,
            "https://shadowlands.example/hls/index.m3u8",
            "client-1",
            &sig_util(),
            "vidsrc",
        )
        .expect("process_manifest should succeed");

        for tag in ["#EXT-X-MEDIA:", "#EXT-X-MAP:", "#EXT-X-KEY:"] {
            let line = out.lines().find(|l| l.starts_with(tag)).expect("tag line present");
            assert!(line.contains("URI=\"/stream-proxy?url="), "tag not rewritten: {line}");
        }
        assert_all_lines_proxied(&out);
    }

    #[test]
    fn process_manifest_preserves_blank_lines_and_comment_ordering() {
        let manifest = "#EXTM3U\n\n#EXTINF:6.0,\nsegment0.ts\n\n";
        let out = ProxyController::process_manifest(
            manifest,
            "https://shadowlands.example/hls/index.m3u8",
            "client-1",
            &sig_util(),
            "vidsrc",
        )
        .expect("process_manifest should succeed");

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "#EXTINF:6.0,");
        assert!(lines[3].contains("/stream-proxy?url="));
        assert_eq!(lines[4], "");
    }

    #[test]
    fn process_manifest_is_idempotent_on_an_already_proxied_manifest() {
        let manifest = "#EXTM3U\n#EXTINF:10.0,\nsegment0.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n";
        let once = ProxyController::process_manifest(
            manifest,
            "https://shadowlands.example/hls/index.m3u8",
            "client-1",
            &sig_util(),
            "vidsrc",
        )
        .expect("first pass should succeed");

        let twice = ProxyController::process_manifest(
            &once,
            "https://shadowlands.example/hls/index.m3u8",
            "client-1",
            &sig_util(),
            "vidsrc",
        )
        .expect("second pass over an already-proxied manifest should succeed");

        assert_eq!(once, twice, "re-running process_manifest on its own output should not double-wrap URIs");
    }

    #[test]
    fn resolve_keeps_absolute_uris_untouched() {
        let base_url = url::Url::parse("https://shadowlands.example/hls/index.m3u8").unwrap();
        let resolved = ProxyController::resolve(
            "https://shadowlands.example/hls/",
            &base_url,
            "https://other.example/x.ts",
        );
        assert_eq!(resolved, "https://other.example/x.ts");
    }

    #[test]
    fn resolve_handles_root_relative_and_sibling_paths() {
        let base_url = url::Url::parse("https://shadowlands.example/hls/index.m3u8").unwrap();

        let root_relative = ProxyController::resolve("https://shadowlands.example/hls/", &base_url, "/abs/seg.ts");
        assert_eq!(root_relative, "https://shadowlands.example/abs/seg.ts");

        let sibling = ProxyController::resolve("https://shadowlands.example/hls/", &base_url, "seg0.ts");
        assert_eq!(sibling, "https://shadowlands.example/hls/seg0.ts");
    }

    #[test]
    fn decode_url_accepts_plain_percent_encoded_urls() {
        let decoded = ProxyController::decode_url("https%3A%2F%2Fexample.com%2Fa%3Fb%3D1").unwrap();
        assert_eq!(decoded, "https://example.com/a?b=1");
    }

    #[test]
    fn decode_url_accepts_unpadded_base64() {
        let encoded = URL_SAFE.encode(b"https://example.com/x.m3u8").trim_end_matches('=').to_string();
        let decoded = ProxyController::decode_url(&encoded).unwrap();
        assert_eq!(decoded, "https://example.com/x.m3u8");
    }

    #[test]
    fn decode_url_rejects_invalid_base64() {
        assert!(ProxyController::decode_url("not-valid-base64!!!").is_err());
    }

    #[test]
    fn sign_produces_a_stream_proxy_path_carrying_source_and_signature() {
        let signed = ProxyController::sign(
            "https://shadowlands.example/hls/index.m3u8",
            "client-1",
            &sig_util(),
            "vidsrc",
        );
        assert!(signed.starts_with("/stream-proxy?url="));
        assert!(signed.contains("source=vidsrc"));
        assert!(signed.contains("&sig="));
        assert!(signed.contains("&exp="));
        assert!(signed.contains("&client=client-1"));
    }

    #[test]
    fn content_encoding_prefers_zstd_then_gzip_then_identity() {
        assert_eq!(ContentEncoding::from_accept_encoding(Some("zstd, gzip")), ContentEncoding::Zstd);
        assert_eq!(ContentEncoding::from_accept_encoding(Some("gzip, deflate")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_accept_encoding(Some("identity")), ContentEncoding::None);
        assert_eq!(ContentEncoding::from_accept_encoding(None), ContentEncoding::None);
    }
}
