//! Fingerprint generation and injection
//!
//! Produces the spoofed device descriptor a profile runs under (viewport,
//! user agent, locale, timezone, hardware characteristics, WebGL/canvas/audio
//! spoof parameters) and renders the init script that applies it to a page
//! before any navigation.

mod devices;
mod generator;
mod inject;

pub use devices::{DeviceCategory, DeviceProfile};
pub use generator::{FingerprintError, FingerprintGenerator};
pub use inject::spoof_script;

use serde::Serialize;

use crate::engine::ContextOptions;

/// Spoofed device/browser descriptor applied to one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub user_agent: String,
    /// `navigator.platform` value.
    pub platform: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub browser_languages: Vec<String>,
    pub timezone: String,
    pub hardware_concurrency: u32,
    pub device_memory: u32,
    pub max_touch_points: u32,
    pub is_mobile: bool,
    pub has_touch: bool,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    /// Per-session noise seed for canvas readback.
    pub canvas_seed: String,
    pub fonts: Vec<String>,
    pub connection: ConnectionProfile,
    pub battery: BatteryProfile,
}

/// Spoofed `navigator.connection` characteristics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub effective_type: String,
    pub downlink: f64,
    pub rtt: u32,
}

/// Spoofed Battery API state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryProfile {
    pub charging: bool,
    pub level: f64,
}

impl Fingerprint {
    /// Primary locale (first entry of the language list).
    pub fn locale(&self) -> &str {
        self.browser_languages
            .first()
            .map(String::as_str)
            .unwrap_or("en-US")
    }

    /// `Accept-Language` header derived from the language list.
    pub fn accept_language(&self) -> String {
        let mut parts = Vec::with_capacity(self.browser_languages.len());
        for (i, lang) in self.browser_languages.iter().enumerate() {
            if i == 0 {
                parts.push(lang.clone());
            } else {
                parts.push(format!("{};q=0.{}", lang, 9 - i.min(8)));
            }
        }
        parts.join(",")
    }

    /// Context parameters for the engine boundary.
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            user_agent: self.user_agent.clone(),
            platform: self.platform.clone(),
            accept_language: self.accept_language(),
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            device_scale_factor: self.device_scale_factor,
            timezone: self.timezone.clone(),
            is_mobile: self.is_mobile,
            has_touch: self.has_touch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_language_shape() {
        let generator = FingerprintGenerator::new();
        let fp = generator
            .generate("chromium", DeviceCategory::Desktop, None)
            .await
            .unwrap();

        let header = fp.accept_language();
        assert!(header.starts_with(fp.locale()));
        assert!(header.contains(";q=0."));
    }

    #[tokio::test]
    async fn test_context_options_mirror_descriptor() {
        let generator = FingerprintGenerator::new();
        let fp = generator
            .generate("chrome", DeviceCategory::Mobile, None)
            .await
            .unwrap();

        let opts = fp.context_options();
        assert_eq!(opts.user_agent, fp.user_agent);
        assert_eq!(opts.viewport_width, fp.viewport_width);
        assert!(opts.is_mobile);
        assert!(opts.has_touch);
    }
}
