//! Onboarding conversation flow.
//!
//! Caller input is normalized into a small token vocabulary, interpreted
//! against a static step table, and persisted per caller and line so a
//! conversation can move between voice and SMS.

pub mod definition;
pub mod engine;
pub mod input;
pub mod model;
pub mod prompts;
pub mod state;
pub mod turn;

pub use definition::{FlowDefinition, FlowRegistry, ONBOARD_FLOW, StepDefinition};
pub use engine::{FlowEngine, StepOutcome};
pub use input::{Channel, Keyword, NormalizedInput, RawInput, Token, normalize};
pub use model::UserProfile;
pub use prompts::Prompt;
pub use state::{CallerIdentity, FlowState, Line, TERMINAL_STEP};
pub use turn::{TurnHandler, TurnReply};
