//! API key model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential for one content generation provider, unique by `service`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    /// Lowercase service name, e.g. `openai`
    pub service: String,
    #[serde(skip_serializing)]
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Key with everything but the last four characters hidden
    pub fn masked(&self) -> String {
        mask_key(&self.key)
    }

    /// Safe-to-render view of this key
    pub fn summary(&self) -> ApiKeySummary {
        ApiKeySummary {
            service: self.service.clone(),
            masked_key: self.masked(),
            updated_at: self.updated_at,
        }
    }
}

/// What the settings page shows for a stored key
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeySummary {
    pub service: String,
    pub masked_key: String,
    pub updated_at: DateTime<Utc>,
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(8), visible)
}
