//! Static flow definitions: steps, accepted tokens, and transitions.
//!
//! The table is shared by both channel adapters, so a branch that exists
//! for SMS exists for voice and vice versa.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::input::{Keyword, NormalizedInput, Token};
use super::prompts::{self, PromptSet};

/// Name of the onboarding flow.
pub const ONBOARD_FLOW: &str = "onboard";

/// Which inputs a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Yes,
    No,
    Digit(u8),
    Number,
    Support,
    /// Free-form answer: unrecognized text or a lone digit, never empty.
    Text,
}

impl Pattern {
    pub fn matches(&self, input: &NormalizedInput) -> bool {
        match (self, &input.token) {
            (Self::Yes, Token::Yes) | (Self::No, Token::No) => true,
            (Self::Digit(want), Token::Digit(got)) => want == got,
            (Self::Number, Token::Keyword(Keyword::Number)) => true,
            (Self::Support, Token::Keyword(Keyword::Support)) => true,
            (Self::Text, Token::Unrecognized | Token::Digit(_)) => !input.raw.is_empty(),
            _ => false,
        }
    }
}

/// Field written when a route is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// Store the raw input under this field name.
    Raw(&'static str),
    /// Store a fixed value.
    Value(&'static str, &'static str),
}

/// Where a route leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Step(&'static str),
    /// Ends the flow with a closing prompt.
    Terminal(PromptSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub pattern: Pattern,
    pub target: Target,
    pub record: Option<Record>,
}

impl Route {
    const fn to(pattern: Pattern, target: Target) -> Self {
        Self {
            pattern,
            target,
            record: None,
        }
    }

    const fn recording(pattern: Pattern, target: Target, record: Record) -> Self {
        Self {
            pattern,
            target,
            record: Some(record),
        }
    }
}

/// One prompt/decision point.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub name: &'static str,
    pub prompt: PromptSet,
    pub routes: Vec<Route>,
}

impl StepDefinition {
    /// First route accepting `input`, if any.
    pub fn route_for(&self, input: &NormalizedInput) -> Option<&Route> {
        self.routes.iter().find(|r| r.pattern.matches(input))
    }

    pub fn accepts(&self, input: &NormalizedInput) -> bool {
        self.route_for(input).is_some()
    }
}

/// A named set of steps with a designated entry step.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub name: &'static str,
    pub initial: &'static str,
    pub steps: Vec<StepDefinition>,
}

impl FlowDefinition {
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn initial_step(&self) -> &StepDefinition {
        // Checked by `FlowRegistry::builtin` tests: the initial step is always defined.
        self.step(self.initial).unwrap_or(&self.steps[0])
    }
}

/// All flows known to the engine.
#[derive(Debug)]
pub struct FlowRegistry {
    flows: HashMap<&'static str, FlowDefinition>,
    default_flow: &'static str,
}

impl FlowRegistry {
    pub fn new(flows: Vec<FlowDefinition>, default_flow: &'static str) -> Self {
        Self {
            flows: flows.into_iter().map(|f| (f.name, f)).collect(),
            default_flow,
        }
    }

    /// The built-in flow table, built once per process.
    pub fn builtin() -> &'static FlowRegistry {
        static REGISTRY: LazyLock<FlowRegistry> =
            LazyLock::new(|| FlowRegistry::new(vec![onboard_flow()], ONBOARD_FLOW));
        &REGISTRY
    }

    pub fn get(&self, name: &str) -> Option<&FlowDefinition> {
        self.flows.get(name)
    }

    /// Flow used when stored state names one that no longer exists.
    pub fn default_flow(&self) -> &FlowDefinition {
        &self.flows[self.default_flow]
    }
}

fn onboard_flow() -> FlowDefinition {
    use Pattern::*;
    use Target::{Step, Terminal};

    FlowDefinition {
        name: ONBOARD_FLOW,
        initial: "ask_has_account",
        steps: vec![
            StepDefinition {
                name: "ask_has_account",
                prompt: prompts::ASK_HAS_ACCOUNT,
                routes: vec![
                    Route::to(Yes, Step("ask_support")),
                    Route::to(No, Step("ask_name")),
                ],
            },
            StepDefinition {
                name: "ask_name",
                prompt: prompts::ASK_NAME,
                routes: vec![Route::recording(
                    Text,
                    Step("ask_prison_id"),
                    Record::Raw("name"),
                )],
            },
            StepDefinition {
                name: "ask_prison_id",
                prompt: prompts::ASK_PRISON_ID,
                routes: vec![Route::recording(
                    Text,
                    Step("ask_affiliate"),
                    Record::Raw("prison_id"),
                )],
            },
            StepDefinition {
                name: "ask_affiliate",
                prompt: prompts::ASK_AFFILIATE,
                routes: vec![
                    Route::recording(
                        No,
                        Terminal(prompts::CLOSE_COMPLETE),
                        Record::Value("affiliate_code", ""),
                    ),
                    Route::recording(
                        Text,
                        Terminal(prompts::CLOSE_COMPLETE),
                        Record::Raw("affiliate_code"),
                    ),
                ],
            },
            StepDefinition {
                name: "ask_support",
                prompt: prompts::ASK_SUPPORT,
                routes: vec![
                    Route::to(Number, Terminal(prompts::CLOSE_NUMBER)),
                    Route::to(Digit(3), Terminal(prompts::CLOSE_NUMBER)),
                    Route::to(Support, Terminal(prompts::CLOSE_SUPPORT)),
                    Route::to(Digit(4), Terminal(prompts::CLOSE_SUPPORT)),
                    Route::to(No, Terminal(prompts::CLOSE_GOODBYE)),
                ],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(token: Token, raw: &str) -> NormalizedInput {
        NormalizedInput::new(token, raw)
    }

    #[test]
    fn every_step_target_exists() {
        let registry = FlowRegistry::builtin();
        let flow = registry.get(ONBOARD_FLOW).unwrap();
        assert!(flow.step(flow.initial).is_some());
        for step in &flow.steps {
            for route in &step.routes {
                if let Target::Step(next) = route.target {
                    assert!(flow.step(next).is_some(), "{} -> {next}", step.name);
                }
            }
        }
    }

    #[test]
    fn step_names_are_unique() {
        let flow = FlowRegistry::builtin().default_flow();
        let mut names: Vec<_> = flow.steps.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), flow.steps.len());
    }

    #[test]
    fn text_pattern_rejects_empty_and_decisions() {
        assert!(Pattern::Text.matches(&input(Token::Unrecognized, "Jordan")));
        assert!(Pattern::Text.matches(&input(Token::Digit(7), "7")));
        assert!(!Pattern::Text.matches(&input(Token::Unrecognized, "")));
        assert!(!Pattern::Text.matches(&input(Token::Yes, "yes")));
        assert!(!Pattern::Text.matches(&input(Token::Keyword(Keyword::Help), "help")));
    }

    #[test]
    fn affiliate_none_is_checked_before_free_text() {
        let flow = FlowRegistry::builtin().default_flow();
        let step = flow.step("ask_affiliate").unwrap();
        let route = step.route_for(&input(Token::No, "none")).unwrap();
        assert_eq!(route.record, Some(Record::Value("affiliate_code", "")));
    }

    #[test]
    fn support_menu_accepts_words_and_digits() {
        let flow = FlowRegistry::builtin().default_flow();
        let step = flow.step("ask_support").unwrap();
        assert!(step.accepts(&input(Token::Keyword(Keyword::Number), "number")));
        assert!(step.accepts(&input(Token::Digit(3), "3")));
        assert!(step.accepts(&input(Token::Keyword(Keyword::Support), "support")));
        assert!(step.accepts(&input(Token::Digit(4), "4")));
        assert!(step.accepts(&input(Token::No, "no")));
        assert!(!step.accepts(&input(Token::Yes, "yes")));
        assert!(!step.accepts(&input(Token::Unrecognized, "what")));
    }
}
