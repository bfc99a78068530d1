//! Device profile pools
//!
//! Representative hardware/viewport combinations per device category, used
//! to seed fingerprint generation.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Device category a fingerprint is drawn for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceCategory {
    /// Whether the category reports as a mobile device.
    pub fn is_mobile(self) -> bool {
        matches!(self, DeviceCategory::Mobile | DeviceCategory::Tablet)
    }

    /// The profile pool for this category.
    pub fn profiles(self) -> &'static [DeviceProfile] {
        match self {
            DeviceCategory::Desktop => DESKTOP_PROFILES,
            DeviceCategory::Mobile => MOBILE_PROFILES,
            DeviceCategory::Tablet => TABLET_PROFILES,
        }
    }
}

/// One concrete hardware/viewport combination.
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    /// OS family, drives the user-agent template.
    pub os: &'static str,
    /// Value reported by `navigator.platform`.
    pub navigator_platform: &'static str,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub cores: u32,
    pub memory_gb: u32,
    pub gpu: &'static str,
    pub touch_points: u32,
}

const DESKTOP_PROFILES: &[DeviceProfile] = &[
    DeviceProfile { os: "Windows", navigator_platform: "Win32", width: 1920, height: 1080, scale: 1.0, cores: 8, memory_gb: 16, gpu: "NVIDIA GeForce RTX 3060", touch_points: 0 },
    DeviceProfile { os: "Windows", navigator_platform: "Win32", width: 1366, height: 768, scale: 1.0, cores: 4, memory_gb: 8, gpu: "Intel UHD Graphics 620", touch_points: 0 },
    DeviceProfile { os: "Windows", navigator_platform: "Win32", width: 1536, height: 864, scale: 1.25, cores: 8, memory_gb: 16, gpu: "NVIDIA GeForce GTX 1660", touch_points: 0 },
    DeviceProfile { os: "macOS", navigator_platform: "MacIntel", width: 1440, height: 900, scale: 2.0, cores: 8, memory_gb: 16, gpu: "Apple M1", touch_points: 0 },
    DeviceProfile { os: "macOS", navigator_platform: "MacIntel", width: 1680, height: 1050, scale: 2.0, cores: 10, memory_gb: 32, gpu: "Apple M2 Pro", touch_points: 0 },
    DeviceProfile { os: "Linux", navigator_platform: "Linux x86_64", width: 1920, height: 1080, scale: 1.0, cores: 8, memory_gb: 16, gpu: "AMD Radeon RX 6600", touch_points: 0 },
];

const MOBILE_PROFILES: &[DeviceProfile] = &[
    DeviceProfile { os: "Android", navigator_platform: "Linux armv8l", width: 360, height: 640, scale: 2.0, cores: 4, memory_gb: 3, gpu: "Mali-G52", touch_points: 5 },
    DeviceProfile { os: "Android", navigator_platform: "Linux armv8l", width: 390, height: 844, scale: 3.0, cores: 8, memory_gb: 6, gpu: "Adreno 610", touch_points: 5 },
    DeviceProfile { os: "Android", navigator_platform: "Linux armv8l", width: 412, height: 915, scale: 3.0, cores: 8, memory_gb: 8, gpu: "Adreno 650", touch_points: 5 },
    DeviceProfile { os: "iOS", navigator_platform: "iPhone", width: 390, height: 844, scale: 3.0, cores: 6, memory_gb: 4, gpu: "Apple A14", touch_points: 5 },
    DeviceProfile { os: "iOS", navigator_platform: "iPhone", width: 393, height: 852, scale: 3.0, cores: 6, memory_gb: 8, gpu: "Apple A17 Pro", touch_points: 5 },
];

const TABLET_PROFILES: &[DeviceProfile] = &[
    DeviceProfile { os: "Android", navigator_platform: "Linux armv8l", width: 800, height: 1280, scale: 1.5, cores: 8, memory_gb: 6, gpu: "Mali-G57", touch_points: 5 },
    DeviceProfile { os: "Android", navigator_platform: "Linux armv8l", width: 1200, height: 1600, scale: 2.0, cores: 8, memory_gb: 8, gpu: "Adreno 650", touch_points: 5 },
    DeviceProfile { os: "iOS", navigator_platform: "iPad", width: 768, height: 1024, scale: 2.0, cores: 6, memory_gb: 4, gpu: "Apple A13", touch_points: 5 },
    DeviceProfile { os: "iOS", navigator_platform: "iPad", width: 1024, height: 1366, scale: 2.0, cores: 8, memory_gb: 8, gpu: "Apple M1", touch_points: 5 },
];

/// Pick a profile uniformly from the category's pool.
pub fn pick(category: DeviceCategory, rng: &mut impl Rng) -> &'static DeviceProfile {
    let pool = category.profiles();
    &pool[rng.gen_range(0..pool.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pools_are_nonempty() {
        for category in [DeviceCategory::Desktop, DeviceCategory::Mobile, DeviceCategory::Tablet] {
            assert!(!category.profiles().is_empty());
        }
    }

    #[test]
    fn test_pick_stays_in_pool() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let profile = pick(DeviceCategory::Mobile, &mut rng);
            assert!(DeviceCategory::Mobile
                .profiles()
                .iter()
                .any(|p| p.width == profile.width && p.os == profile.os));
            assert!(profile.touch_points > 0);
        }
    }

    #[test]
    fn test_desktop_has_no_touch() {
        assert!(DeviceCategory::Desktop.profiles().iter().all(|p| p.touch_points == 0));
        assert!(!DeviceCategory::Desktop.is_mobile());
        assert!(DeviceCategory::Tablet.is_mobile());
    }
}
