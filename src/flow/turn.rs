//! Runs one webhook turn: load state, step, save.
//!
//! Turns for the same caller are serialized by a per-identity async lock so
//! a duplicated webhook delivery cannot lose an update. Different callers
//! never wait on each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::FlowError;
use crate::store::Database;

use super::definition::ONBOARD_FLOW;
use super::engine::{FlowEngine, StepOutcome};
use super::input::{Channel, Keyword, RawInput, Token, normalize};
use super::prompts::Prompt;
use super::state::{CallerIdentity, FlowState, Line};

/// What the channel adapter should do with a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReply {
    /// Flow output. `gather` is false once the flow has ended.
    Prompt {
        prompt: Prompt,
        gather: bool,
        /// Fields of a flow that just finished with collected data.
        completed: Option<BTreeMap<String, String>>,
    },
    /// A global command short-circuited the flow.
    Command(Keyword),
    /// No active flow and nothing to start.
    Idle,
    /// The state store failed; answer with a generic, flow-free reply.
    Fallback,
}

/// Per-identity mutual exclusion.
#[derive(Debug, Default)]
struct TurnLocks {
    inner: DashMap<CallerIdentity, Arc<Mutex<()>>>,
}

impl TurnLocks {
    async fn acquire(&self, identity: &CallerIdentity) -> TurnGuard<'_> {
        let lock = self.inner.entry(identity.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        TurnGuard {
            guard: Some(guard),
            locks: self,
            identity: identity.clone(),
        }
    }
}

/// Releases the caller's lock on drop and forgets it when nobody is waiting.
struct TurnGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a TurnLocks,
    identity: CallerIdentity,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .inner
            .remove_if(&self.identity, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Coordinates the normalizer, the engine, and the state store.
pub struct TurnHandler {
    db: Arc<dyn Database>,
    engine: FlowEngine,
    locks: TurnLocks,
}

impl TurnHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            engine: FlowEngine::new(),
            locks: TurnLocks::default(),
        }
    }

    /// Handle one input from a caller.
    ///
    /// If the active step accepts the input, it goes to the step, even
    /// when it is also a keyword (`number` at the support menu). Otherwise
    /// keywords short-circuit the flow.
    pub async fn handle(
        &self,
        identity: &CallerIdentity,
        raw: &RawInput,
        channel: Channel,
    ) -> TurnReply {
        let input = normalize(raw, channel);
        let _guard = self.locks.acquire(identity).await;

        let existing = match self.db.load_flow_state(identity).await {
            Ok(existing) => existing,
            Err(e) => return fallback(identity, e.into()),
        };

        debug!(
            %identity,
            %channel,
            token = input.token.kind(),
            active = existing.is_some(),
            "Handling turn"
        );

        match (existing, &input.token) {
            (Some(state), Token::Keyword(keyword)) if !self.engine.accepts(&state, &input) => {
                match keyword {
                    Keyword::Cancel => {
                        if let Err(e) = self.db.clear_flow_state(identity).await {
                            return fallback(identity, e.into());
                        }
                        info!(%identity, flow = %state.flow_name, "Flow cancelled");
                        TurnReply::Command(Keyword::Cancel)
                    }
                    Keyword::Signup => self.start(identity).await,
                    other => TurnReply::Command(other.clone()),
                }
            }
            (Some(state), _) => {
                let outcome = self.engine.step(&state, &input);
                self.commit(identity, outcome).await
            }
            (None, Token::Keyword(Keyword::Signup)) => self.start(identity).await,
            (None, Token::Keyword(keyword)) => TurnReply::Command(keyword.clone()),
            (None, _) if identity.line == Line::Onboarding => self.start(identity).await,
            (None, _) => TurnReply::Idle,
        }
    }

    /// Answer a call that arrived without input.
    ///
    /// Repeats the current step for a caller already in a flow, starts
    /// onboarding on the onboarding line, and is idle otherwise.
    pub async fn greet(&self, identity: &CallerIdentity) -> TurnReply {
        let _guard = self.locks.acquire(identity).await;

        match self.db.load_flow_state(identity).await {
            Ok(Some(state)) => {
                let outcome = self.engine.current_prompt(&state);
                self.commit(identity, outcome).await
            }
            Ok(None) if identity.line == Line::Onboarding => self.start(identity).await,
            Ok(None) => TurnReply::Idle,
            Err(e) => fallback(identity, e.into()),
        }
    }

    async fn start(&self, identity: &CallerIdentity) -> TurnReply {
        let outcome = self.engine.start(ONBOARD_FLOW, identity.line);
        info!(%identity, flow = ONBOARD_FLOW, "Flow started");
        self.commit(identity, outcome).await
    }

    /// Persist the outcome: save while the flow runs, clear once it ends.
    async fn commit(&self, identity: &CallerIdentity, outcome: StepOutcome) -> TurnReply {
        let StepOutcome {
            state,
            prompt,
            terminal,
        } = outcome;

        if terminal {
            if let Err(e) = self.db.clear_flow_state(identity).await {
                return fallback(identity, e.into());
            }
            info!(%identity, flow = %state.flow_name, "Flow complete");
            return TurnReply::Prompt {
                prompt,
                gather: false,
                completed: completed_fields(state),
            };
        }

        if let Err(e) = self.db.save_flow_state(identity, &state).await {
            return fallback(identity, e.into());
        }
        TurnReply::Prompt {
            prompt,
            gather: true,
            completed: None,
        }
    }
}

fn completed_fields(state: FlowState) -> Option<BTreeMap<String, String>> {
    (!state.collected_fields.is_empty()).then_some(state.collected_fields)
}

fn fallback(identity: &CallerIdentity, error: FlowError) -> TurnReply {
    warn!(%identity, %error, "Turn failed, answering with fallback");
    TurnReply::Fallback
}
