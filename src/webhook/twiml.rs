//! TwiML response builders.

use std::fmt::Write as _;
use std::time::Duration;

use axum::http::header;
use axum::response::{IntoResponse, Response};

/// Longest body sent in one `<Message>`; longer replies are split.
pub const SMS_CHUNK_CHARS: usize = 400;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const NUDGE: &str = "Still with me? Just say something or hang tight!";

/// A rendered TwiML document, served as `text/xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwiML(pub String);

impl IntoResponse for TwiML {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml")], self.0).into_response()
    }
}

/// Escape text for use inside an XML element or attribute.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Voice response rendering settings.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub tts_voice: String,
    pub gather_timeout: Duration,
    /// Where Twilio posts the gathered input.
    pub action: String,
}

impl VoiceSettings {
    /// Speak `text` and wait for speech or keypad input.
    ///
    /// A caller who stays silent hears a nudge and is redirected back to the
    /// action URL, which repeats the current prompt.
    pub fn gather(&self, text: &str) -> TwiML {
        let voice = escape_xml(&self.tts_voice);
        let action = escape_xml(&self.action);
        let mut xml = String::from(XML_HEADER);
        let _ = write!(
            xml,
            r#"<Response><Gather input="speech dtmf" action="{action}" method="POST" speechTimeout="auto" timeout="{}">"#,
            self.gather_timeout.as_secs()
        );
        let _ = write!(xml, r#"<Say voice="{voice}">{}</Say>"#, escape_xml(text));
        let _ = write!(xml, r#"<Say voice="{voice}">{NUDGE}</Say>"#);
        let _ = write!(
            xml,
            r#"</Gather><Redirect method="POST">{action}</Redirect></Response>"#
        );
        TwiML(xml)
    }

    /// Speak `text` and end the call.
    pub fn say_and_hang_up(&self, text: &str) -> TwiML {
        TwiML(format!(
            r#"{XML_HEADER}<Response><Say voice="{}">{}</Say><Hangup/></Response>"#,
            escape_xml(&self.tts_voice),
            escape_xml(text)
        ))
    }
}

/// SMS reply, one `<Message>` per chunk.
pub fn message(text: &str) -> TwiML {
    let mut xml = String::from(XML_HEADER);
    xml.push_str("<Response>");
    for chunk in chunk_message(text, SMS_CHUNK_CHARS) {
        let _ = write!(xml, "<Message>{}</Message>", escape_xml(&chunk));
    }
    xml.push_str("</Response>");
    TwiML(xml)
}

/// Empty response; Twilio sends nothing back.
pub fn empty() -> TwiML {
    TwiML(format!("{XML_HEADER}<Response></Response>"))
}

/// Split `text` into pieces of at most `max` characters, preferring
/// whitespace boundaries.
pub fn chunk_message(text: &str, max: usize) -> Vec<String> {
    let text = text.trim();
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if word.chars().count() > max {
            // A single overlong word is hard-split.
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> VoiceSettings {
        VoiceSettings {
            tts_voice: "Polly.Joanna".into(),
            gather_timeout: Duration::from_secs(10),
            action: "/voice".into(),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_xml(r#"Tom & "Jerry" <3 it's"#),
            "Tom &amp; &quot;Jerry&quot; &lt;3 it&apos;s"
        );
    }

    #[test]
    fn gather_wraps_say_and_loops_back() {
        let TwiML(xml) = settings().gather("Say yes or no.");
        assert!(xml.starts_with(XML_HEADER));
        assert!(xml.contains(r#"<Gather input="speech dtmf" action="/voice""#));
        assert!(xml.contains(r#"timeout="10""#));
        assert!(xml.contains(r#"<Say voice="Polly.Joanna">Say yes or no.</Say>"#));
        assert!(xml.ends_with(r#"<Redirect method="POST">/voice</Redirect></Response>"#));
        assert!(!xml.contains("<Hangup/>"));
    }

    #[test]
    fn terminal_reply_hangs_up() {
        let TwiML(xml) = settings().say_and_hang_up("Goodbye & thanks");
        assert!(xml.contains("<Say voice=\"Polly.Joanna\">Goodbye &amp; thanks</Say><Hangup/>"));
        assert!(!xml.contains("<Gather"));
    }

    #[test]
    fn message_escapes_body() {
        let TwiML(xml) = message("Reply <YES> & go");
        assert!(xml.contains("<Response><Message>Reply &lt;YES&gt; &amp; go</Message></Response>"));
    }

    #[test]
    fn long_messages_split_on_words() {
        let text = "word ".repeat(200);
        let chunks = chunk_message(&text, 50);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
        assert!(chunks.iter().all(|c| !c.starts_with(' ') && !c.ends_with(' ')));
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn overlong_word_is_hard_split() {
        let chunks = chunk_message(&"x".repeat(25), 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn short_message_is_single_chunk() {
        assert_eq!(chunk_message("  hi  ", 10), vec!["hi".to_string()]);
    }
}
