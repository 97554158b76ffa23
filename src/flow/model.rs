//! User profile produced by a completed onboarding flow.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account details collected during onboarding.
///
/// Stored in the `users` table, keyed by phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prison_id: Option<String>,
    /// Referral code used at signup. `None` when the caller had none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliate_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Build a profile from the fields of a finished onboarding flow.
    pub fn from_fields(phone: &str, fields: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let now = Utc::now();
        Self {
            phone: phone.to_string(),
            name: get("name"),
            prison_id: get("prison_id"),
            affiliate_code: get("affiliate_code"),
            created_at: now,
            updated_at: now,
        }
    }
}
