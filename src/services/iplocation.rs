//! IP geolocation abstraction
//!
//! New subscribers imported with a usable IP_ADDRESS column get a one-shot
//! country/city lookup. The locator is pluggable and disabled unless an
//! endpoint is configured, so imports never depend on an external service.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// Result of one IP lookup
#[derive(Debug, Clone)]
pub struct IpLocation {
    pub country_code: Option<String>,
    pub city: Option<String>,
}

/// IP locator trait - abstraction for all lookup implementations
#[async_trait]
pub trait IpLocator: Send + Sync {
    /// Look up an IP address. Returns None when the service has no answer.
    async fn locate(&self, ip: &str) -> Result<Option<IpLocation>>;

    /// Get the name of this locator implementation
    fn name(&self) -> &'static str;
}

/// No-op locator used when no endpoint is configured
pub struct DisabledIpLocator;

#[async_trait]
impl IpLocator for DisabledIpLocator {
    async fn locate(&self, _ip: &str) -> Result<Option<IpLocation>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// HTTP locator against an ip-api.com style endpoint:
/// GET {base_url}/{ip} returns {"status": "...", "countryCode": "...", "city": "..."}
pub struct HttpIpLocator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: String,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    city: Option<String>,
}

impl HttpIpLocator {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IpLocator for HttpIpLocator {
    async fn locate(&self, ip: &str) -> Result<Option<IpLocation>> {
        let url = format!("{}/{}", self.base_url, ip);
        let response: LookupResponse = self.client.get(&url).send().await?.json().await?;

        if response.status != "success" {
            return Ok(None);
        }

        Ok(Some(IpLocation {
            country_code: response.country_code,
            city: response.city,
        }))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Create the locator from the optional configured endpoint
pub fn create_ip_locator(endpoint: Option<&str>) -> Box<dyn IpLocator> {
    match endpoint {
        Some(url) if !url.is_empty() => {
            info!("Using HTTP IP locator at {}", url);
            Box::new(HttpIpLocator::new(url))
        }
        _ => {
            info!("IP geolocation disabled");
            Box::new(DisabledIpLocator)
        }
    }
}
