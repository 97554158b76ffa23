//! Prompt wording for every step, per line and channel.
//!
//! Wording may differ between lines and channels; which prompt a step uses
//! is fixed by the definition table.

use std::collections::BTreeMap;

use super::input::Channel;
use super::state::Line;

/// One prompt in both channel renderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptText {
    pub sms: &'static str,
    pub voice: &'static str,
}

/// Default wording plus an optional onboarding-line variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSet {
    pub default: PromptText,
    pub onboarding: Option<PromptText>,
}

impl PromptSet {
    pub const fn same(default: PromptText) -> Self {
        Self {
            default,
            onboarding: None,
        }
    }

    pub fn for_line(&self, line: Line) -> PromptText {
        match (line, self.onboarding) {
            (Line::Onboarding, Some(text)) => text,
            _ => self.default,
        }
    }

    /// Fill in template fields for `line`.
    pub fn render(&self, line: Line, fields: &BTreeMap<String, String>) -> Prompt {
        let text = self.for_line(line);
        Prompt {
            sms: interpolate(text.sms, fields),
            voice: interpolate(text.voice, fields),
        }
    }
}

/// A rendered prompt, ready for either channel adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub sms: String,
    pub voice: String,
}

impl Prompt {
    pub fn for_channel(&self, channel: Channel) -> &str {
        match channel {
            Channel::Sms => &self.sms,
            Channel::Voice => &self.voice,
        }
    }

    /// Prefix both renderings with the "didn't catch that" line.
    pub fn as_reprompt(&self) -> Self {
        Self {
            sms: format!("{} {}", REPROMPT.sms, self.sms),
            voice: format!("{} {}", REPROMPT.voice, self.voice),
        }
    }
}

/// Replace `{field}` placeholders. Missing `name` reads as "friend".
fn interpolate(template: &str, fields: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in fields {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out.replace("{name}", "friend")
}

pub const REPROMPT: PromptText = PromptText {
    sms: "Sorry, I didn't get that.",
    voice: "Sorry, I didn't catch that.",
};

pub const ASK_HAS_ACCOUNT: PromptSet = PromptSet {
    default: PromptText {
        sms: "Do you already have an account? Reply YES (1) or NO (2).",
        voice: "Do you already have an account? Say yes or press 1. Say no or press 2.",
    },
    onboarding: Some(PromptText {
        sms: "Welcome! Let's get you set up. Do you already have an account? Reply YES (1) or NO (2).",
        voice: "Welcome! Let's get you set up. Do you already have an account? \
                Say yes or press 1. Say no or press 2.",
    }),
};

pub const ASK_NAME: PromptSet = PromptSet::same(PromptText {
    sms: "Great, let's create your account. What's your full name?",
    voice: "Great, let's create your account. Please say your full name after the tone.",
});

pub const ASK_PRISON_ID: PromptSet = PromptSet::same(PromptText {
    sms: "Got it, {name}. What's your prison ID?",
    voice: "Thanks, {name}. Please say your prison I D, or key it in.",
});

pub const ASK_AFFILIATE: PromptSet = PromptSet::same(PromptText {
    sms: "Thanks. If you have an affiliate code, reply with it now. If not, reply NONE.",
    voice: "If you have an affiliate referral code, say it now. Otherwise say none.",
});

pub const ASK_SUPPORT: PromptSet = PromptSet {
    default: PromptText {
        sms: "Welcome back! Reply NUMBER (3) to learn how to get your assigned number, \
              SUPPORT (4) to reach a person, or NO (2) if you're all set.",
        voice: "Welcome back! Say number or press 3 to hear how to get your assigned number. \
                Say support or press 4 to reach a person. Say no or press 2 if you're all set.",
    },
    onboarding: Some(PromptText {
        sms: "You're already registered, so there's no need to sign up again. \
              Reply NUMBER (3) to learn how to get your assigned number, \
              SUPPORT (4) to reach a person, or NO (2) if you're all set.",
        voice: "You're already registered, so there's no need to sign up again. \
                Say number or press 3 to hear how to get your assigned number. \
                Say support or press 4 to reach a person. Say no or press 2 if you're all set.",
    }),
};

pub const CLOSE_NUMBER: PromptSet = PromptSet::same(PromptText {
    sms: "Your assigned number is in your welcome text. You can text NUMBER to this line \
          any time to get it again, or text HELP if you can't find it.",
    voice: "Your assigned number is in your welcome text message. You can text the word \
            number to this line any time to get it again, or text help if you can't find it.",
});

pub const CLOSE_SUPPORT: PromptSet = PromptSet::same(PromptText {
    sms: "To reach a person, text HELP to this number and someone from our team will follow up.",
    voice: "To reach a person, text the word help to this number and someone from our team \
            will follow up.",
});

pub const CLOSE_GOODBYE: PromptSet = PromptSet::same(PromptText {
    sms: "No problem. Thanks for reaching out!",
    voice: "No problem. Thanks for calling, goodbye!",
});

pub const CLOSE_COMPLETE: PromptSet = PromptSet::same(PromptText {
    sms: "All set, {name}! Reply PAY to get a billing link, or say pay on a call to pay by phone.",
    voice: "You're all set up, {name}. To pay now, say pay, or you can text pay for a link.",
});
