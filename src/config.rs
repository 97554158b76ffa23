//! Configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::flow::Line;

/// Default Polly voice used when no TTS override is configured.
pub const DEFAULT_TTS_VOICE: &str = "Polly.Joanna";

/// Voices a caller can pick with `VOICE <keyword>` when `VOICE_MAP` is unset.
const DEFAULT_VOICE_MAP: &[(&str, &str)] = &[
    ("joanna", "Polly.Joanna"),
    ("matthew", "Polly.Matthew"),
    ("amy", "Polly.Amy"),
    ("brian", "Polly.Brian"),
];

/// Service configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Port the webhook server binds to.
    pub port: u16,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Number that routes callers into onboarding automatically.
    pub onboarding_number: Option<String>,
    /// Owner/admin line.
    pub master_number: Option<String>,
    /// How long a `<Gather>` waits for speech or digits.
    pub gather_timeout: Duration,
    /// Voice used for `<Say>`.
    pub tts_voice: String,
    /// Extra greeting put in front of the built-in rotation.
    pub greeting_text: Option<String>,
    /// Caller-selectable voices: lowercase keyword to `<Say>` voice name.
    pub voice_map: BTreeMap<String, String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 5050,
            db_path: PathBuf::from("./data/aicon.db"),
            onboarding_number: None,
            master_number: None,
            gather_timeout: Duration::from_secs(10),
            tts_voice: DEFAULT_TTS_VOICE.to_string(),
            greeting_text: None,
            voice_map: DEFAULT_VOICE_MAP
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ServiceConfig {
    /// Build configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_var("AICON_PORT")?.unwrap_or(defaults.port);
        let gather_timeout = parse_var::<u64>("GATHER_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.gather_timeout);

        let db_path = std::env::var("AICON_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        Ok(Self {
            port,
            db_path,
            onboarding_number: non_empty_var("ONBOARDING_PHONE_NUMBER"),
            master_number: non_empty_var("MASTER_PHONE_NUMBER"),
            gather_timeout,
            tts_voice: non_empty_var("AICON_TTS_VOICE").unwrap_or(defaults.tts_voice),
            greeting_text: non_empty_var("GREETING_TEXT"),
            voice_map: match non_empty_var("VOICE_MAP") {
                Some(raw) => parse_voice_map(&raw)?,
                None => defaults.voice_map,
            },
        })
    }

    /// `<Say>` voice for a caller's stored keyword, or the service default.
    pub fn voice_for(&self, keyword: Option<&str>) -> &str {
        keyword
            .and_then(|k| self.voice_map.get(&k.to_lowercase()))
            .map(String::as_str)
            .unwrap_or(&self.tts_voice)
    }

    /// Which line a webhook arrived on, given the dialed (`To`) number.
    pub fn line_for(&self, to: &str) -> Line {
        let to = to.trim();
        if to.is_empty() {
            return Line::Normal;
        }
        if self.onboarding_number.as_deref() == Some(to) {
            Line::Onboarding
        } else if self.master_number.as_deref() == Some(to) {
            Line::Master
        } else {
            Line::Normal
        }
    }
}

/// `VOICE_MAP` is a JSON object such as `{"nova": "Polly.Ivy"}`.
fn parse_voice_map(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let map: BTreeMap<String, String> =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "VOICE_MAP".to_string(),
            message: e.to_string(),
        })?;
    Ok(map
        .into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect())
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        None => Ok(None),
    }
}
