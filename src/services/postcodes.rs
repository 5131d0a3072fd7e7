//! Postcode lookup against postcodes.io

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::types::{CommunityError, Result};

/// The fields of a postcodes.io result the client uses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostcodeInfo {
    pub postcode: String,
    #[serde(default)]
    pub admin_district: Option<String>,
    #[serde(default)]
    pub admin_ward: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
struct LookupResponse {
    result: Option<UpstreamResult>,
}

#[derive(Deserialize)]
struct UpstreamResult {
    postcode: String,
    admin_district: Option<String>,
    admin_ward: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Clone)]
pub struct PostcodeClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl PostcodeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("connected-community/0.1")
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a postcode. Unknown postcodes are `NotFound`, an unreachable
    /// service is `Upstream`.
    pub async fn resolve(&self, postcode: &str) -> Result<PostcodeInfo> {
        let postcode = postcode.trim();
        if postcode.is_empty() {
            return Err(CommunityError::Validation("postcode is required".into()));
        }

        let url = format!("{}/postcodes/{}", self.base_url, urlencoding::encode(postcode));
        debug!(url = %url, "Resolving postcode");

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CommunityError::NotFound("Postcode not found".into()));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| CommunityError::Upstream(format!("Bad postcode response: {}", e)))?;
        let result = body
            .result
            .ok_or_else(|| CommunityError::NotFound("Postcode not found".into()))?;

        Ok(PostcodeInfo {
            postcode: result.postcode,
            admin_district: result.admin_district,
            admin_ward: result.admin_ward,
            latitude: result.latitude,
            longitude: result.longitude,
        })
    }
}
