use reqwest::header;

/// per-`source` header forging, shared between the stream proxy and the segment
/// prefetcher so both send identical upstream requests. clean headers for
/// `vidsrc`, Referer/Origin set for `embed.su`/cloudnestra, matching what those
/// hosts expect from a same-origin browser request.
pub fn apply_source_headers(
    mut request_builder: reqwest::RequestBuilder,
    source: &str,
    target_url: &str,
    user_agent: &str,
) -> reqwest::RequestBuilder {
    let accept_encoding = "gzip, deflate, br, zstd";

    match source {
        "vidsrc" => {
            request_builder = request_builder
                .header(header::USER_AGENT, user_agent)
                .header(header::ACCEPT, "*/*")
                .header(header::ACCEPT_ENCODING, accept_encoding);
        }
        "embed.su" | "cloudnestra" => {
            request_builder = request_builder
                .header(header::REFERER, "https://cloudnestra.com/")
                .header(header::ORIGIN, "https://cloudnestra.com")
                .header(header::USER_AGENT, user_agent)
                .header(header::ACCEPT, "*/*")
                .header(header::ACCEPT_ENCODING, accept_encoding);
        }
        "shadowlands" => {
            request_builder = request_builder
                .header(header::REFERER, "https://cloudnestra.com/")
                .header(header::USER_AGENT, user_agent)
                .header(header::ACCEPT, "*/*")
                .header(header::ACCEPT_ENCODING, accept_encoding);
        }
        _ => {
            if target_url.contains("shadowlandschronicles") {
                request_builder = request_builder
                    .header(header::REFERER, "https://cloudnestra.com/")
                    .header(header::USER_AGENT, user_agent);
            } else {
                request_builder = request_builder.header(header::USER_AGENT, user_agent);
            }
            request_builder = request_builder
                .header(header::ACCEPT, "*/*")
                .header(header::ACCEPT_ENCODING, accept_encoding);
        }
    }

    request_builder
}
