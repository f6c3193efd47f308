//! Coarse device classification from a user-agent string.

use serde::Serialize;

/// Device family reported alongside every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceClass {
    #[serde(rename = "Android")]
    Android,
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "Windows")]
    Windows,
    #[serde(rename = "Mac")]
    Mac,
    #[serde(rename = "Linux")]
    Linux,
    #[serde(rename = "unknown")]
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Android => "Android",
            DeviceClass::Ios => "iOS",
            DeviceClass::Windows => "Windows",
            DeviceClass::Mac => "Mac",
            DeviceClass::Linux => "Linux",
            DeviceClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered marker table, first match wins.
///
/// Android user agents also mention "Linux", so Android is checked first.
/// Mobile families always precede desktop ones.
const MARKERS: &[(&str, DeviceClass)] = &[
    ("android", DeviceClass::Android),
    ("iphone", DeviceClass::Ios),
    ("ipad", DeviceClass::Ios),
    ("ipod", DeviceClass::Ios),
    ("windows", DeviceClass::Windows),
    ("macintosh", DeviceClass::Mac),
    ("mac os", DeviceClass::Mac),
    ("linux", DeviceClass::Linux),
];

/// Classify a user agent by case-insensitive substring match.
pub fn classify_device(user_agent: &str) -> DeviceClass {
    let ua = user_agent.to_lowercase();
    MARKERS
        .iter()
        .find(|(marker, _)| ua.contains(marker))
        .map(|(_, class)| *class)
        .unwrap_or(DeviceClass::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn android_in_any_case_is_android() {
        assert_eq!(
            classify_device("Mozilla/5.0 (Linux; ANDROID 14; Pixel 8)"),
            DeviceClass::Android
        );
        assert_eq!(classify_device("android"), DeviceClass::Android);
        assert_eq!(classify_device("Android; also mentions iPhone"), DeviceClass::Android);
    }

    #[test]
    fn iphone_without_android_is_ios() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
        assert_eq!(classify_device(ua), DeviceClass::Ios);
        assert_eq!(classify_device("IPAD"), DeviceClass::Ios);
    }

    #[test]
    fn desktop_families() {
        assert_eq!(
            classify_device("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"),
            DeviceClass::Windows
        );
        assert_eq!(
            classify_device("Mozilla/5.0 (Macintosh; Intel Mac OS X 14_1)"),
            DeviceClass::Mac
        );
        assert_eq!(classify_device("Mozilla/5.0 (X11; Linux x86_64)"), DeviceClass::Linux);
    }

    #[test]
    fn unrecognized_is_unknown() {
        assert_eq!(classify_device("curl/8.4.0"), DeviceClass::Unknown);
        assert_eq!(classify_device(""), DeviceClass::Unknown);
        assert_eq!(DeviceClass::Unknown.to_string(), "unknown");
    }
}
