//! Public instance configuration.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigResponse {
    pub site_name: String,
    pub description: Option<String>,
    pub public_url: String,
    pub registration_enabled: bool,
}

impl From<&Config> for ConfigResponse {
    fn from(config: &Config) -> Self {
        Self {
            site_name: config.metadata.site_name.clone(),
            description: config.metadata.description.clone(),
            public_url: config.public_url.clone(),
            registration_enabled: config.auth.native.enabled && config.auth.native.allow_registration,
        }
    }
}
