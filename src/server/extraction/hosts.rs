/// single source of truth for the embed hosts this service walks. both the "needs
/// header masking" invariant and the stream proxy allow-list read from here
/// instead of duplicating host strings across modules.
pub const VIDSRC_HOST: &str = "vidsrc.xyz";
pub const EMBEDSU_HOST: &str = "embed.su";
pub const CLOUDNESTRA_HOST: &str = "cloudnestra.com";
pub const SHADOWLANDS_HOST: &str = "shadowlandschronicles.com";

/// hosts whose manifests/segments need header masking through the stream proxy -
/// anything that isn't a direct, CORS-friendly primary CDN.
pub fn requires_proxy(host: &str) -> bool {
    let host = host.to_lowercase();
    host.contains(CLOUDNESTRA_HOST) || host.contains(SHADOWLANDS_HOST) || host.contains(EMBEDSU_HOST)
}

pub fn base_url_for(server: crate::server::extraction::model::ServerChoice) -> &'static str {
    use crate::server::extraction::model::ServerChoice;
    match server {
        ServerChoice::Primary => "https://vidsrc.xyz",
        ServerChoice::Backup => "https://embed.su",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowlands_and_cloudnestra_require_proxy() {
        assert!(requires_proxy("cdn.shadowlandschronicles.com"));
        assert!(requires_proxy("rcp.cloudnestra.com"));
    }

    #[test]
    fn plain_primary_cdn_does_not_require_proxy() {
        assert!(!requires_proxy("cdn.primary-friendly.example"));
    }
}
