//! Twilio webhook endpoints.

use std::sync::Arc;

use axum::{Json, Router};
use axum::extract::{Form, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::flow::{
    CallerIdentity, Channel, Keyword, RawInput, TurnHandler, TurnReply, UserProfile,
};
use crate::store::Database;

use super::replies;
use super::twiml::{self, TwiML, VoiceSettings};

/// Preference key holding the caller's chosen voice keyword.
pub const VOICE_PREFERENCE: &str = "voice";

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub turns: Arc<TurnHandler>,
    pub db: Arc<dyn Database>,
    pub config: Arc<ServiceConfig>,
}

impl WebhookState {
    pub fn new(db: Arc<dyn Database>, config: ServiceConfig) -> Self {
        Self {
            turns: Arc::new(TurnHandler::new(Arc::clone(&db))),
            db,
            config: Arc::new(config),
        }
    }

    /// Rendering settings for `identity`, honoring a stored voice choice.
    async fn voice_settings(&self, identity: &CallerIdentity) -> VoiceSettings {
        let keyword = match self.db.get_preference(&identity.phone, VOICE_PREFERENCE).await {
            Ok(keyword) => keyword,
            Err(e) => {
                warn!(%identity, error = %e, "Failed to load voice preference");
                None
            }
        };
        VoiceSettings {
            tts_voice: self.config.voice_for(keyword.as_deref()).to_string(),
            gather_timeout: self.config.gather_timeout,
            action: "/voice".to_string(),
        }
    }
}

/// Form fields Twilio posts for calls and messages.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TwilioForm {
    pub from: String,
    pub to: String,
    pub body: Option<String>,
    pub speech_result: Option<String>,
    pub digits: Option<String>,
    pub message_sid: Option<String>,
    pub sms_sid: Option<String>,
}

impl TwilioForm {
    fn identity(&self, config: &ServiceConfig) -> CallerIdentity {
        CallerIdentity::new(self.from.as_str(), config.line_for(&self.to))
    }

    fn is_sms(&self) -> bool {
        self.message_sid.is_some() || self.sms_sid.is_some()
    }

    /// Keypad digits win over a speech transcript.
    fn voice_input(&self) -> Option<RawInput> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        present(&self.digits)
            .map(RawInput::Digits)
            .or_else(|| present(&self.speech_result).map(RawInput::Speech))
    }
}

/// POST /voice
async fn voice(State(state): State<WebhookState>, Form(form): Form<TwilioForm>) -> TwiML {
    handle_voice(&state, &form).await
}

/// POST /sms
async fn sms(State(state): State<WebhookState>, Form(form): Form<TwilioForm>) -> TwiML {
    handle_sms(&state, &form).await
}

/// POST /twilio, POST /onboard
///
/// One URL for both webhooks; message SIDs mark SMS.
async fn unified(State(state): State<WebhookState>, Form(form): Form<TwilioForm>) -> TwiML {
    if form.is_sms() {
        handle_sms(&state, &form).await
    } else {
        handle_voice(&state, &form).await
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "aicon"}))
}

async fn handle_voice(state: &WebhookState, form: &TwilioForm) -> TwiML {
    let identity = form.identity(&state.config);
    let input = form.voice_input();

    let reply = match &input {
        Some(raw) => state.turns.handle(&identity, raw, Channel::Voice).await,
        None => {
            debug!(%identity, "Call without input, greeting");
            state.turns.greet(&identity).await
        }
    };

    let (text, gather) = match reply {
        TurnReply::Prompt {
            prompt,
            gather,
            completed,
        } => {
            if let Some(fields) = completed {
                save_profile(state, &identity, &fields).await;
            }
            (prompt.for_channel(Channel::Voice).to_string(), gather)
        }
        TurnReply::Command(keyword) => (
            command_reply(state, &identity, &keyword, Channel::Voice).await,
            true,
        ),
        TurnReply::Idle if input.is_none() => (
            replies::greeting(&identity, state.config.greeting_text.as_deref()),
            true,
        ),
        TurnReply::Idle => (replies::idle(Channel::Voice).to_string(), true),
        TurnReply::Fallback => (replies::fallback(Channel::Voice).to_string(), true),
    };

    // Resolved after the turn so a voice switch is heard right away.
    let settings = state.voice_settings(&identity).await;
    if gather {
        settings.gather(&text)
    } else {
        settings.say_and_hang_up(&text)
    }
}

async fn handle_sms(state: &WebhookState, form: &TwilioForm) -> TwiML {
    let identity = form.identity(&state.config);
    let body = form.body.as_deref().unwrap_or_default().trim();
    if identity.phone.is_empty() {
        warn!("SMS webhook without a sender");
        return twiml::empty();
    }

    let raw = RawInput::Text(body.to_string());
    let text = match state.turns.handle(&identity, &raw, Channel::Sms).await {
        TurnReply::Prompt {
            prompt, completed, ..
        } => {
            if let Some(fields) = completed {
                save_profile(state, &identity, &fields).await;
            }
            prompt.for_channel(Channel::Sms).to_string()
        }
        TurnReply::Command(keyword) => {
            command_reply(state, &identity, &keyword, Channel::Sms).await
        }
        TurnReply::Idle => replies::idle(Channel::Sms).to_string(),
        TurnReply::Fallback => replies::fallback(Channel::Sms).to_string(),
    };
    twiml::message(&text)
}

/// Carry out the side effects of a command, then word the reply.
async fn command_reply(
    state: &WebhookState,
    identity: &CallerIdentity,
    keyword: &Keyword,
    channel: Channel,
) -> String {
    let voices: Vec<&str> = state.config.voice_map.keys().map(String::as_str).collect();
    match keyword {
        Keyword::Voice(name) if voices.contains(&name.as_str()) => {
            if let Err(e) = state
                .db
                .set_preference(&identity.phone, VOICE_PREFERENCE, name)
                .await
            {
                warn!(%identity, error = %e, "Failed to save voice preference");
                return replies::fallback(channel).to_string();
            }
            info!(%identity, voice = %name, "Voice preference saved");
        }
        Keyword::Support => info!(%identity, %channel, "Support requested"),
        _ => {}
    }
    replies::command(keyword, channel, &voices)
}

/// Persist the account collected by a finished signup. The caller still
/// gets the closing prompt if this fails.
async fn save_profile(
    state: &WebhookState,
    identity: &CallerIdentity,
    fields: &std::collections::BTreeMap<String, String>,
) {
    let profile = UserProfile::from_fields(&identity.phone, fields);
    match state.db.upsert_profile(&profile).await {
        Ok(()) => info!(%identity, "User profile saved"),
        Err(e) => warn!(%identity, error = %e, "Failed to save user profile"),
    }
}

/// Build the webhook routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/voice", post(voice))
        .route("/sms", post(sms))
        .route("/twilio", post(unified))
        .route("/onboard", post(unified))
        .route("/health", get(health))
        .with_state(state)
}
