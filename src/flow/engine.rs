//! Flow engine: a pure function of (state, input) to (state, prompt).
//!
//! The engine owns no mutable state. Loading and saving are the caller's
//! job, so replaying a turn yields the same outcome.

use tracing::{debug, warn};

use crate::error::FlowError;

use super::definition::{FlowDefinition, FlowRegistry, Record, StepDefinition, Target};
use super::input::NormalizedInput;
use super::prompts::Prompt;
use super::state::{FlowState, Line, TERMINAL_STEP};

/// Result of one engine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub state: FlowState,
    pub prompt: Prompt,
    /// The flow finished; the caller clears the stored state.
    pub terminal: bool,
}

/// Interprets the flow definition table.
#[derive(Debug, Clone, Copy)]
pub struct FlowEngine {
    registry: &'static FlowRegistry,
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEngine {
    /// Engine over the built-in flow table.
    pub fn new() -> Self {
        Self {
            registry: FlowRegistry::builtin(),
        }
    }

    /// Begin `flow_name` at its initial step.
    pub fn start(&self, flow_name: &str, line: Line) -> StepOutcome {
        let flow = self.flow_or_default(flow_name);
        self.fresh(flow, line)
    }

    /// The prompt for the caller's current step, without advancing.
    pub fn current_prompt(&self, state: &FlowState) -> StepOutcome {
        match self.resolve(state) {
            Ok((_, step)) => StepOutcome {
                state: state.clone(),
                prompt: step.prompt.render(state.line, &state.collected_fields),
                terminal: false,
            },
            Err(e) => self.reset(state, &e),
        }
    }

    /// Whether the caller's current step has a route for `input`.
    pub fn accepts(&self, state: &FlowState, input: &NormalizedInput) -> bool {
        self.resolve(state)
            .is_ok_and(|(_, step)| step.accepts(input))
    }

    /// Advance `state` by one input.
    ///
    /// Input the current step does not accept leaves the state untouched and
    /// re-prompts. Corrupt state restarts the flow from its initial step.
    pub fn step(&self, state: &FlowState, input: &NormalizedInput) -> StepOutcome {
        let (flow, step) = match self.resolve(state) {
            Ok(found) => found,
            Err(e) => return self.reset(state, &e),
        };

        let Some(route) = step.route_for(input) else {
            debug!(
                flow = flow.name,
                step = step.name,
                token = input.token.kind(),
                "Input not accepted, re-prompting"
            );
            return StepOutcome {
                state: state.clone(),
                prompt: step
                    .prompt
                    .render(state.line, &state.collected_fields)
                    .as_reprompt(),
                terminal: false,
            };
        };

        let mut next = state.clone();
        match route.record {
            Some(Record::Raw(field)) => {
                next.collected_fields
                    .insert(field.to_string(), input.raw.clone());
            }
            Some(Record::Value(field, value)) => {
                next.collected_fields
                    .insert(field.to_string(), value.to_string());
            }
            None => {}
        }

        match route.target {
            Target::Step(name) => {
                let Some(next_step) = flow.step(name) else {
                    let e = FlowError::InvalidStepReference {
                        flow: flow.name.to_string(),
                        step: name.to_string(),
                    };
                    return self.reset(state, &e);
                };
                next.current_step = next_step.name.to_string();
                debug!(flow = flow.name, from = step.name, to = name, "Step advanced");
                StepOutcome {
                    prompt: next_step.prompt.render(next.line, &next.collected_fields),
                    state: next,
                    terminal: false,
                }
            }
            Target::Terminal(closing) => {
                next.current_step = TERMINAL_STEP.to_string();
                debug!(flow = flow.name, from = step.name, "Flow reached terminal step");
                StepOutcome {
                    prompt: closing.render(next.line, &next.collected_fields),
                    state: next,
                    terminal: true,
                }
            }
        }
    }

    fn resolve(&self, state: &FlowState) -> Result<(&FlowDefinition, &StepDefinition), FlowError> {
        let flow = self
            .registry
            .get(&state.flow_name)
            .ok_or_else(|| FlowError::UnknownFlow(state.flow_name.clone()))?;
        let step = flow
            .step(&state.current_step)
            .ok_or_else(|| FlowError::InvalidStepReference {
                flow: flow.name.to_string(),
                step: state.current_step.clone(),
            })?;
        Ok((flow, step))
    }

    fn reset(&self, state: &FlowState, cause: &FlowError) -> StepOutcome {
        warn!(
            flow = %state.flow_name,
            step = %state.current_step,
            error = %cause,
            "Resetting flow to its initial step"
        );
        let flow = self.flow_or_default(&state.flow_name);
        self.fresh(flow, state.line)
    }

    fn fresh(&self, flow: &FlowDefinition, line: Line) -> StepOutcome {
        let initial = flow.initial_step();
        let state = FlowState::new(flow.name, initial.name, line);
        StepOutcome {
            prompt: initial.prompt.render(line, &state.collected_fields),
            state,
            terminal: false,
        }
    }

    fn flow_or_default(&self, name: &str) -> &FlowDefinition {
        self.registry
            .get(name)
            .unwrap_or_else(|| self.registry.default_flow())
    }
}
