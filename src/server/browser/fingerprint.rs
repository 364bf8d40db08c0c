use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::server::extraction::model::FingerprintProfile;

/// finite, file-embedded catalog of fingerprint profiles, partitioned into
/// buckets so the pool can hand out distinct profiles per concurrent job without
/// ever reusing the same bitwise-identical one within a bucket.
const CATALOG: &[FingerprintProfileStatic] = &[
    FingerprintProfileStatic {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        platform: "Win32",
        vendor: "Google Inc.",
        languages: &["en-US", "en"],
        screen: (1920, 1080),
        hardware_concurrency: 8,
        device_memory: 8,
        timezone: "America/New_York",
        webgl_vendor: "Google Inc. (NVIDIA)",
        webgl_renderer: "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    FingerprintProfileStatic {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        platform: "MacIntel",
        vendor: "Apple Computer, Inc.",
        languages: &["en-US", "en"],
        screen: (1440, 900),
        hardware_concurrency: 10,
        device_memory: 16,
        timezone: "America/Los_Angeles",
        webgl_vendor: "Apple Inc.",
        webgl_renderer: "Apple M2",
    },
    FingerprintProfileStatic {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        platform: "Linux x86_64",
        vendor: "Google Inc.",
        languages: &["en-GB", "en"],
        screen: (1920, 1080),
        hardware_concurrency: 12,
        device_memory: 16,
        timezone: "Europe/London",
        webgl_vendor: "Mesa/X.org",
        webgl_renderer: "llvmpipe (LLVM 17.0.6, 256 bits)",
    },
    FingerprintProfileStatic {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
        platform: "Win32",
        vendor: "Google Inc.",
        languages: &["en-US", "en"],
        screen: (2560, 1440),
        hardware_concurrency: 16,
        device_memory: 32,
        timezone: "America/Chicago",
        webgl_vendor: "Google Inc. (Intel)",
        webgl_renderer: "ANGLE (Intel, Intel(R) UHD Graphics 770 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
];

struct FingerprintProfileStatic {
    user_agent: &'static str,
    platform: &'static str,
    vendor: &'static str,
    languages: &'static [&'static str],
    screen: (u32, u32),
    hardware_concurrency: u8,
    device_memory: u8,
    timezone: &'static str,
    webgl_vendor: &'static str,
    webgl_renderer: &'static str,
}

impl From<&FingerprintProfileStatic> for FingerprintProfile {
    fn from(p: &FingerprintProfileStatic) -> Self {
        FingerprintProfile {
            user_agent: p.user_agent.to_string(),
            platform: p.platform.to_string(),
            vendor: p.vendor.to_string(),
            languages: p.languages.iter().map(|s| s.to_string()).collect(),
            screen: p.screen,
            hardware_concurrency: p.hardware_concurrency,
            device_memory: p.device_memory,
            timezone: p.timezone.to_string(),
            webgl_vendor: p.webgl_vendor.to_string(),
            webgl_renderer: p.webgl_renderer.to_string(),
        }
    }
}

/// picks a profile for bucket `bucket_index`, cycling through the catalog so two
/// concurrent jobs in distinct buckets never draw the same entry.
pub fn profile_for_bucket(bucket_index: usize) -> FingerprintProfile {
    let entry = &CATALOG[bucket_index % CATALOG.len()];
    entry.into()
}

pub fn catalog_len() -> usize {
    CATALOG.len()
}

/// plausible player preferences pre-populated into a fresh tab's localStorage,
/// drawn from a small randomized set so two jobs never seed the same values,
/// which would itself be a fingerprintable tell.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerPrefs {
    pub subtitle_language: String,
    pub volume: f32,
    pub quality: String,
}

const SUBTITLE_LANGUAGES: &[&str] = &["off", "eng", "spa", "fre", "ger"];
const QUALITIES: &[&str] = &["auto", "1080p", "720p"];

pub fn random_player_prefs() -> PlayerPrefs {
    let mut rng = rand::rng();
    PlayerPrefs {
        subtitle_language: SUBTITLE_LANGUAGES.choose(&mut rng).copied().unwrap_or("off").to_string(),
        volume: (rng.random_range(40..=100) as f32) / 100.0,
        quality: QUALITIES.choose(&mut rng).copied().unwrap_or("auto").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_buckets_yield_distinct_profiles_within_catalog_size() {
        let a = profile_for_bucket(0);
        let b = profile_for_bucket(1);
        assert_ne!(a.user_agent, b.user_agent);
    }

    #[test]
    fn random_player_prefs_stay_within_the_documented_set() {
        let prefs = random_player_prefs();
        assert!(SUBTITLE_LANGUAGES.contains(&prefs.subtitle_language.as_str()));
        assert!(QUALITIES.contains(&prefs.quality.as_str()));
        assert!((0.4..=1.0).contains(&prefs.volume));
    }

    #[test]
    fn bucket_index_wraps_around_catalog() {
        let wrapped = profile_for_bucket(catalog_len());
        let first = profile_for_bucket(0);
        assert_eq!(wrapped.user_agent, first.user_agent);
    }
}
