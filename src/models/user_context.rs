use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// User energy preference applied during scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyPreference {
    Low,
    Moderate,
    High,
}

/// Optional per-user scoring preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    #[serde(default)]
    pub energy_preference: Option<EnergyPreference>,
    #[serde(default)]
    pub style_preference: Option<String>,
    #[serde(default)]
    pub genre_preferences: Option<Vec<String>>,
}

/// Client device details, recorded for analytics only
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Per-request user context for personalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
}

impl UserContext {
    /// Short stable hash of the full context, used in response-cache keys
    ///
    /// Two requests with identical context hash to the same cache entry;
    /// any difference (preferences, device) produces a distinct key.
    pub fn context_hash(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(serialized.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..16].to_string()
    }
}
