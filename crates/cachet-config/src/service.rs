//! Cache service protocol selection

use std::fmt;

use url::Url;

use crate::toml::CacheSettings;

/// Cache service protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVersion {
    /// REST reserve/upload/commit protocol
    V1,
    /// Signed-URL RPC protocol
    V2,
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceVersion::V1 => f.write_str("v1"),
            ServiceVersion::V2 => f.write_str("v2"),
        }
    }
}

const DEFAULT_SERVER_URL: &str = "https://github.com";

/// Whether the hosting server is a self-hosted installation
pub fn is_self_hosted(server_url: Option<&str>) -> bool {
    let raw = server_url.unwrap_or(DEFAULT_SERVER_URL);
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    let host = url.host_str().unwrap_or_default().trim_end().to_ascii_uppercase();

    let hosted = host == "GITHUB.COM";
    let regional = host.ends_with(".GHE.COM");
    let local = host.ends_with(".LOCALHOST");
    !hosted && !regional && !local
}

impl CacheSettings {
    /// Protocol to use; self-hosted servers only speak v1
    pub fn service_version(&self) -> ServiceVersion {
        if self.is_self_hosted() {
            return ServiceVersion::V1;
        }
        if self.service.service_v2 {
            ServiceVersion::V2
        } else {
            ServiceVersion::V1
        }
    }

    pub fn is_self_hosted(&self) -> bool {
        is_self_hosted(self.service.server_url.as_deref())
    }

    /// Base URL for the selected protocol
    pub fn service_url(&self) -> Option<&str> {
        match self.service_version() {
            ServiceVersion::V1 => self.service.cache_url.as_deref(),
            ServiceVersion::V2 => self.service.results_url.as_deref(),
        }
    }

    /// Whether the selected protocol has an endpoint configured
    pub fn is_feature_available(&self) -> bool {
        self.service_url().is_some_and(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_hosted_detection() {
        assert!(!is_self_hosted(None));
        assert!(!is_self_hosted(Some("https://github.com")));
        assert!(!is_self_hosted(Some("https://acme.ghe.com")));
        assert!(!is_self_hosted(Some("http://github.localhost")));
        assert!(is_self_hosted(Some("https://git.acme.internal")));
    }

    #[test]
    fn test_version_selection() {
        let mut settings = CacheSettings::default();
        assert_eq!(settings.service_version(), ServiceVersion::V1);

        settings.service.service_v2 = true;
        assert_eq!(settings.service_version(), ServiceVersion::V2);

        settings.service.server_url = Some("https://git.acme.internal".to_string());
        assert_eq!(settings.service_version(), ServiceVersion::V1);
    }

    #[test]
    fn test_feature_availability() {
        let mut settings = CacheSettings::default();
        assert!(!settings.is_feature_available());

        settings.service.cache_url = Some("https://cache.example.com/".to_string());
        assert!(settings.is_feature_available());

        settings.service.service_v2 = true;
        assert!(!settings.is_feature_available());

        settings.service.results_url = Some("https://results.example.com/".to_string());
        assert!(settings.is_feature_available());
    }
}
