//! Fixed reply texts for commands and non-flow turns.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::flow::prompts;
use crate::flow::{CallerIdentity, Channel, Keyword, Line};

const GREETINGS: &[&str] = &[
    "Hi, thanks for calling. How can I help?",
    "Hello! What can I do for you today?",
    "Hey there, I'm ready whenever you are.",
    "Thanks for calling. What should we tackle first?",
];

/// Pick a greeting for `caller`. A configured greeting joins the rotation.
///
/// The same caller always hears the same greeting.
pub fn greeting(caller: &CallerIdentity, configured: Option<&str>) -> String {
    let mut variants: Vec<&str> = Vec::with_capacity(GREETINGS.len() + 1);
    variants.extend(configured);
    variants.extend_from_slice(GREETINGS);

    let mut hasher = DefaultHasher::new();
    caller.phone.hash(&mut hasher);
    let idx = (hasher.finish() % variants.len() as u64) as usize;
    variants[idx].to_string()
}

/// Reply to a global command.
///
/// `voices` are the keywords a caller may pick with `VOICE <keyword>`. For
/// a known voice the adapter stores the choice before replying.
pub fn command(keyword: &Keyword, channel: Channel, voices: &[&str]) -> String {
    let voice = channel == Channel::Voice;
    match keyword {
        Keyword::Help | Keyword::Signup => {
            if voice {
                "You can say sign up to create an account, or say pay to pay by phone. \
                 You can also text help to this number for more options."
                    .to_string()
            } else {
                "Text SIGNUP to create an account, PAY for a billing link, NUMBER for your \
                 assigned number, or VOICE LIST to hear voice options."
                    .to_string()
            }
        }
        Keyword::Number => {
            if voice {
                "Your assigned number is in your welcome text message. \
                 Text the word help to this number if you can't find it."
                    .to_string()
            } else {
                "Your assigned number is in your welcome text. Reply HELP if you can't find it."
                    .to_string()
            }
        }
        Keyword::Support => {
            let text = prompts::CLOSE_SUPPORT.for_line(Line::Normal);
            let reply = if voice { text.voice } else { text.sms };
            reply.to_string()
        }
        Keyword::Cancel => {
            if voice {
                "Okay, I've stopped. Say sign up any time to start again.".to_string()
            } else {
                "Okay, I've stopped. Text SIGNUP any time to start again.".to_string()
            }
        }
        Keyword::Pay { plan, crypto } => {
            let method = if *crypto { " with crypto" } else { "" };
            format!("Got it. We'll text you a secure link to pay for the {plan} plan{method}.")
        }
        Keyword::Voice(name) if voices.contains(&name.as_str()) => {
            format!("Okay, I'll use the {name} voice from now on.")
        }
        Keyword::Voice(name) => format!(
            "I don't know a voice called {name}. Voices: {}.",
            voices.join(", ")
        ),
        Keyword::VoiceList => {
            if voices.is_empty() {
                "No alternate voices are set up right now.".to_string()
            } else {
                format!(
                    "Voices: {}. Text VOICE followed by a name to switch.",
                    voices.join(", ")
                )
            }
        }
    }
}

/// Reply when no flow is active and nothing was started.
pub fn idle(channel: Channel) -> &'static str {
    match channel {
        Channel::Voice => "I'm here. Say sign up to create an account, or help for options.",
        Channel::Sms => "Thanks for your message! Text SIGNUP to create an account or HELP for options.",
    }
}

/// Generic reply when the turn could not be processed.
pub fn fallback(channel: Channel) -> &'static str {
    match channel {
        Channel::Voice => "Sorry, give me just a moment. Let's try that again.",
        Channel::Sms => "Thanks for your message. Please try again in a moment.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICES: &[&str] = &["amy", "brian"];

    #[test]
    fn greeting_is_stable_per_caller() {
        let caller = CallerIdentity::new("+15550001111", Line::Normal);
        assert_eq!(greeting(&caller, None), greeting(&caller, None));
        assert!(GREETINGS.contains(&greeting(&caller, None).as_str()));
    }

    #[test]
    fn configured_greeting_joins_rotation() {
        let picked: Vec<String> = (0..50)
            .map(|i| {
                let caller = CallerIdentity::new(format!("+1555000{i:04}"), Line::Normal);
                greeting(&caller, Some("Custom hello"))
            })
            .collect();
        assert!(picked.iter().any(|g| g == "Custom hello"));
    }

    #[test]
    fn pay_reply_names_plan() {
        let reply = command(
            &Keyword::Pay {
                plan: "pro".into(),
                crypto: true,
            },
            Channel::Sms,
            VOICES,
        );
        assert!(reply.contains("pro plan with crypto"));
    }

    #[test]
    fn help_differs_by_channel() {
        assert!(command(&Keyword::Help, Channel::Sms, VOICES).contains("SIGNUP"));
        assert!(command(&Keyword::Help, Channel::Voice, VOICES).contains("say sign up"));
    }

    #[test]
    fn number_reply_matches_channel() {
        let spoken = command(&Keyword::Number, Channel::Voice, VOICES);
        assert!(!spoken.contains("Reply"));
        assert!(spoken.contains("Text the word help"));
        assert!(command(&Keyword::Number, Channel::Sms, VOICES).contains("Reply HELP"));
    }

    #[test]
    fn support_reply_promises_no_callback() {
        for channel in [Channel::Voice, Channel::Sms] {
            let reply = command(&Keyword::Support, channel, VOICES);
            assert!(reply.starts_with("To reach a person"), "{reply}");
        }
    }

    #[test]
    fn voice_replies_depend_on_known_voices() {
        let known = command(&Keyword::Voice("amy".into()), Channel::Sms, VOICES);
        assert!(known.contains("use the amy voice"));

        let unknown = command(&Keyword::Voice("nova".into()), Channel::Sms, VOICES);
        assert!(unknown.contains("don't know a voice called nova"));
        assert!(unknown.contains("amy, brian"));

        let list = command(&Keyword::VoiceList, Channel::Sms, VOICES);
        assert!(list.contains("amy, brian"));
        assert!(command(&Keyword::VoiceList, Channel::Sms, &[]).contains("No alternate voices"));
    }

    #[test]
    fn fallback_never_mentions_errors() {
        for channel in [Channel::Voice, Channel::Sms] {
            let text = fallback(channel).to_lowercase();
            assert!(!text.contains("error"));
            assert!(!text.contains("database"));
        }
    }
}
