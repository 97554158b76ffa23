//! Input normalizer: speech, keypad digits, and SMS text to decision tokens.
//!
//! The channel is never consulted when choosing a token: a synonym or digit
//! accepted on one channel is accepted on every channel.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Channel a turn arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Voice,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voice => write!(f, "voice"),
            Self::Sms => write!(f, "sms"),
        }
    }
}

/// Raw input as handed over by a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    /// Speech-to-text transcript.
    Speech(String),
    /// DTMF keypad digits.
    Digits(String),
    /// SMS body.
    Text(String),
}

impl RawInput {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Speech(s) | Self::Digits(s) | Self::Text(s) => s,
        }
    }
}

/// Commands recognised in any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    Help,
    /// How to find the caller's assigned number.
    Number,
    /// Ask for a human.
    Support,
    Signup,
    Cancel,
    Pay { plan: String, crypto: bool },
    /// Switch the TTS voice to the given keyword.
    Voice(String),
    VoiceList,
}

/// Normalized meaning of one turn's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Yes,
    No,
    /// A single keypad/spoken digit other than the yes/no digits.
    Digit(u8),
    Keyword(Keyword),
    Unrecognized,
}

impl Token {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Digit(_) => "digit",
            Self::Keyword(_) => "keyword",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// A decision token plus the cleaned-up original text, for steps that
/// capture free-form answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput {
    pub token: Token,
    pub raw: String,
}

impl NormalizedInput {
    pub fn new(token: Token, raw: impl Into<String>) -> Self {
        Self {
            token,
            raw: raw.into(),
        }
    }
}

const YES_WORDS: &[&str] = &[
    "yes", "y", "yeah", "yea", "yep", "yup", "sure", "ok", "okay", "correct", "i do",
    "yes i do", "yeah i do", "yes please", "1",
];

const NO_WORDS: &[&str] = &[
    "no", "n", "nope", "nah", "none", "skip", "no thanks", "no thank you", "i dont",
    "no i dont", "no i do not", "not yet", "2",
];

/// First words that make a whole sentence an answer ("yes I have one").
const YES_LEADS: &[&str] = &[
    "yes", "yeah", "yea", "yep", "yup", "sure", "ok", "okay", "correct",
];
const NO_LEADS: &[&str] = &["no", "nope", "nah"];

/// Words that cancel a leading yes ("yes I don't", "ok no").
const NEGATORS: &[&str] = &["no", "not", "dont", "never", "nope", "nah"];

const NUMBER_WORDS: &[(&str, &str)] = &[
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
];

const PAY_PLANS: &[&str] = &["basic", "pro", "custom"];

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    // The pattern is a literal; failure here is a programming error.
    Regex::new(r"[^\p{L}\p{N}\s]").expect("punctuation pattern compiles")
});

/// Map raw channel input to a decision token.
pub fn normalize(input: &RawInput, channel: Channel) -> NormalizedInput {
    let raw = clean_raw(input.as_str());
    let text = canonical_text(&raw);
    let token = classify(&text);
    debug!(%channel, token = token.kind(), "Normalized input");
    NormalizedInput { token, raw }
}

/// Trim whitespace and trailing sentence punctuation, keep case.
fn clean_raw(s: &str) -> String {
    s.trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_string()
}

/// Lowercase, strip punctuation, collapse whitespace, spell out digits.
fn canonical_text(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    NUMBER_WORDS
        .iter()
        .find(|(word, _)| *word == collapsed)
        .map(|(_, digit)| digit.to_string())
        .unwrap_or(collapsed)
}

fn classify(text: &str) -> Token {
    if text.is_empty() {
        return Token::Unrecognized;
    }
    if YES_WORDS.contains(&text) {
        return Token::Yes;
    }
    if NO_WORDS.contains(&text) {
        return Token::No;
    }
    if let [d] = text.as_bytes() {
        if d.is_ascii_digit() {
            return Token::Digit(d - b'0');
        }
    }
    if let Some(keyword) = parse_keyword(text) {
        return Token::Keyword(keyword);
    }
    leading_answer(text).unwrap_or(Token::Unrecognized)
}

/// A sentence that opens with yes or no and never contradicts itself.
fn leading_answer(text: &str) -> Option<Token> {
    let mut words = text.split(' ');
    let first = words.next()?;
    let mut rest = words;
    if YES_LEADS.contains(&first) {
        return rest.all(|w| !NEGATORS.contains(&w)).then_some(Token::Yes);
    }
    if NO_LEADS.contains(&first) {
        return rest.all(|w| !YES_LEADS.contains(&w)).then_some(Token::No);
    }
    None
}

fn parse_keyword(text: &str) -> Option<Keyword> {
    let keyword = match text {
        "help" | "menu" => Keyword::Help,
        "number" | "my number" | "phone number" => Keyword::Number,
        "support" | "agent" | "human" | "operator" => Keyword::Support,
        "signup" | "sign up" | "onboard" => Keyword::Signup,
        "cancel" | "stop" | "quit" => Keyword::Cancel,
        "voice list" | "voices" | "voice help" => Keyword::VoiceList,
        _ => return parse_prefixed(text),
    };
    Some(keyword)
}

fn parse_prefixed(text: &str) -> Option<Keyword> {
    let words: Vec<&str> = text.split(' ').collect();
    match words.as_slice() {
        ["pay" | "payment" | "subscribe", rest @ ..] => parse_pay(rest),
        ["voice", rest @ ..] | ["upgrade", "voice", rest @ ..] if !rest.is_empty() => {
            Some(Keyword::Voice(rest.join(" ")))
        }
        _ => None,
    }
}

fn parse_pay(rest: &[&str]) -> Option<Keyword> {
    let (plan, crypto) = match rest {
        [] => ("basic", false),
        ["crypto"] => ("basic", true),
        [plan] => (*plan, false),
        [plan, "crypto"] => (*plan, true),
        _ => return None,
    };
    PAY_PLANS.contains(&plan).then(|| Keyword::Pay {
        plan: plan.to_string(),
        crypto,
    })
}
