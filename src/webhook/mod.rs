//! Telephony channel adapter: Twilio voice and SMS webhooks rendered as TwiML.

pub mod replies;
pub mod routes;
pub mod twiml;

pub use routes::{TwilioForm, WebhookState, webhook_routes};
