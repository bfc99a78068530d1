//! Fingerprint generator
//!
//! Draws a device profile for the requested category, synthesizes a matching
//! user agent for the engine family, and resolves the timezone from the
//! proxy's exit IP when one is configured.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use super::devices::{self, DeviceCategory, DeviceProfile};
use super::{BatteryProfile, ConnectionProfile, Fingerprint};

/// Fingerprint generation errors
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Unsupported engine family: {0}")]
    UnsupportedEngine(String),
}

const LANGUAGE_PAIRS: &[&[&str]] = &[
    &["en-US", "en"],
    &["en-GB", "en"],
    &["fr-FR", "fr", "en"],
    &["de-DE", "de", "en"],
    &["es-ES", "es", "en"],
    &["hi-IN", "hi", "en"],
];

const FONTS: &[&str] = &[
    "Arial",
    "Verdana",
    "Tahoma",
    "Times New Roman",
    "Courier New",
    "Georgia",
    "Segoe UI",
];

/// (vendor, renderer) pairs for desktop WebGL spoofing.
const DESKTOP_WEBGL: &[(&str, &str)] = &[
    ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
    ("Google Inc. (Intel)", "ANGLE (Intel, Intel(R) UHD Graphics 620 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
    ("Google Inc. (AMD)", "ANGLE (AMD, AMD Radeon RX 6600 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
    ("Apple Inc.", "Apple GPU"),
];

/// Plausible engine build versions for user-agent synthesis.
const ENGINE_VERSIONS: &[&str] = &["130.0.6723.92", "131.0.6778.139", "132.0.6834.84"];

/// Generates spoofed device descriptors.
pub struct FingerprintGenerator {
    http: reqwest::Client,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Generate a descriptor for the given engine family and device category.
    ///
    /// `geo_ip` is the proxy exit host, if any; its geolocation drives the
    /// spoofed timezone so the clock matches the apparent origin. Lookup
    /// failures fall back to UTC.
    pub async fn generate(
        &self,
        engine: &str,
        category: DeviceCategory,
        geo_ip: Option<&str>,
    ) -> Result<Fingerprint, FingerprintError> {
        let timezone = match geo_ip {
            Some(raw) => self.lookup_timezone(raw).await.unwrap_or_else(|| {
                warn!("Timezone lookup failed for {}, falling back to UTC", raw);
                "UTC".to_string()
            }),
            None => "UTC".to_string(),
        };

        let mut rng = rand::thread_rng();
        let profile = devices::pick(category, &mut rng);
        let user_agent = build_user_agent(engine, profile, &mut rng)?;

        let languages: Vec<String> = LANGUAGE_PAIRS[rng.gen_range(0..LANGUAGE_PAIRS.len())]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut fonts: Vec<String> = FONTS.iter().map(|s| s.to_string()).collect();
        fonts.shuffle(&mut rng);
        fonts.truncate(3);

        let (webgl_vendor, webgl_renderer) = if category.is_mobile() {
            let vendor = if profile.os == "iOS" { "Apple Inc." } else { "Qualcomm" };
            (vendor.to_string(), profile.gpu.to_string())
        } else {
            let (vendor, renderer) = DESKTOP_WEBGL[rng.gen_range(0..DESKTOP_WEBGL.len())];
            (vendor.to_string(), renderer.to_string())
        };

        let canvas_seed: String = (0..16)
            .map(|_| format!("{:02x}", rng.gen::<u8>()))
            .collect();

        Ok(Fingerprint {
            user_agent,
            platform: profile.navigator_platform.to_string(),
            viewport_width: profile.width,
            viewport_height: profile.height,
            device_scale_factor: profile.scale,
            browser_languages: languages,
            timezone,
            hardware_concurrency: profile.cores,
            device_memory: profile.memory_gb,
            max_touch_points: profile.touch_points,
            is_mobile: category.is_mobile(),
            has_touch: profile.touch_points > 0,
            webgl_vendor,
            webgl_renderer,
            canvas_seed,
            fonts,
            connection: ConnectionProfile {
                effective_type: "4g".to_string(),
                downlink: (rng.gen_range(50..500) as f64) / 10.0,
                rtt: rng.gen_range(30..120),
            },
            battery: BatteryProfile {
                charging: rng.gen_bool(0.6),
                level: (rng.gen_range(40..100) as f64) / 100.0,
            },
        })
    }

    /// Resolve the timezone for a proxy exit host via its geolocation.
    async fn lookup_timezone(&self, raw: &str) -> Option<String> {
        let host = proxy_host(raw);

        let response = self
            .http
            .get(format!("http://ip-api.com/json/{}", host))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;

        let body: serde_json::Value = response.json().await.ok()?;
        let timezone = body.get("timezone")?.as_str()?.to_string();
        debug!("Resolved timezone {} for {}", timezone, host);
        Some(timezone)
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the bare host from a proxy URL.
fn proxy_host(raw: &str) -> String {
    if let Ok(parsed) = url::Url::parse(raw) {
        if let Some(host) = parsed.host_str() {
            return host.to_string();
        }
    }
    // Not URL-shaped; strip any scheme prefix and port manually.
    let trimmed = raw
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_start_matches("socks5://");
    trimmed.split(':').next().unwrap_or(trimmed).to_string()
}

/// Synthesize a user agent for an engine family on the profile's OS.
fn build_user_agent(
    engine: &str,
    profile: &DeviceProfile,
    rng: &mut impl Rng,
) -> Result<String, FingerprintError> {
    let version = ENGINE_VERSIONS[rng.gen_range(0..ENGINE_VERSIONS.len())];

    let os_token = match profile.os {
        "Windows" => "Windows NT 10.0; Win64; x64".to_string(),
        "macOS" => "Macintosh; Intel Mac OS X 10_15_7".to_string(),
        "Linux" => "X11; Linux x86_64".to_string(),
        "Android" => format!("Linux; Android 14; Pixel {}", rng.gen_range(6..9)),
        "iOS" => "iPhone; CPU iPhone OS 17_5 like Mac OS X".to_string(),
        other => other.to_string(),
    };

    let base = match engine {
        "chromium" | "chrome" | "edge" => {
            if profile.os == "iOS" {
                format!(
                    "Mozilla/5.0 ({}) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/{} Mobile/15E148 Safari/604.1",
                    os_token, version
                )
            } else if profile.os == "Android" {
                format!(
                    "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Mobile Safari/537.36",
                    os_token, version
                )
            } else {
                format!(
                    "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
                    os_token, version
                )
            }
        }
        other => return Err(FingerprintError::UnsupportedEngine(other.to_string())),
    };

    if engine == "edge" {
        let major = version.split('.').next().unwrap_or("131");
        return Ok(format!("{} Edg/{}.0.0.0", base, major));
    }

    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_desktop() {
        let generator = FingerprintGenerator::new();
        let fp = generator
            .generate("chromium", DeviceCategory::Desktop, None)
            .await
            .unwrap();

        assert!(fp.user_agent.contains("Chrome/"));
        assert!(!fp.is_mobile);
        assert!(!fp.has_touch);
        assert_eq!(fp.timezone, "UTC");
        assert_eq!(fp.canvas_seed.len(), 32);
        assert_eq!(fp.fonts.len(), 3);
        assert!(DeviceCategory::Desktop
            .profiles()
            .iter()
            .any(|p| p.width == fp.viewport_width && p.height == fp.viewport_height));
    }

    #[tokio::test]
    async fn test_generate_mobile_has_touch() {
        let generator = FingerprintGenerator::new();
        let fp = generator
            .generate("chrome", DeviceCategory::Mobile, None)
            .await
            .unwrap();

        assert!(fp.is_mobile);
        assert!(fp.has_touch);
        assert!(fp.max_touch_points > 0);
    }

    #[tokio::test]
    async fn test_edge_user_agent_suffix() {
        let generator = FingerprintGenerator::new();
        let fp = generator
            .generate("edge", DeviceCategory::Desktop, None)
            .await
            .unwrap();
        assert!(fp.user_agent.contains("Edg/"));
    }

    #[tokio::test]
    async fn test_unknown_engine_family_fails() {
        let generator = FingerprintGenerator::new();
        let result = generator
            .generate("netscape", DeviceCategory::Desktop, None)
            .await;
        assert!(matches!(result, Err(FingerprintError::UnsupportedEngine(_))));
    }

    #[test]
    fn test_proxy_host_extraction() {
        assert_eq!(proxy_host("http://203.0.113.9:8080"), "203.0.113.9");
        assert_eq!(proxy_host("socks5://proxy.example.com:1080"), "proxy.example.com");
        assert_eq!(proxy_host("203.0.113.9:3128"), "203.0.113.9");
        assert_eq!(proxy_host("203.0.113.9"), "203.0.113.9");
    }

    #[test]
    fn test_language_pairs_have_primary() {
        for pair in LANGUAGE_PAIRS {
            assert!(pair[0].contains('-'));
        }
    }
}
