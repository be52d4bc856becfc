//! Text preprocessing for synthesis.
//!
//! Script fragments arrive from lesson content and may carry markup,
//! emphasis markers and irregular whitespace. Everything handed to a
//! provider goes through [`normalize_fragment`]; cloud synthesis further
//! embeds the result in SSML via [`build_ssml`].

use kidvox_core::Prosody;

/// Normalize a fragment for speech: strip markup, drop emphasis markers,
/// collapse whitespace and trim.
///
/// Handles:
/// - HTML/XML tags (`<b>`, `</span>`, `<br/>`) → removed
/// - Bold / strikethrough markers (`**`, `__`, `~~`) → removed
/// - Runs of whitespace (including newlines and tabs) → single space
///
/// A bare `<` that does not open a tag (`2 < 3`) is kept.
#[must_use]
pub fn normalize_fragment(text: &str) -> String {
    let text = strip_tags(text);
    let text = text.replace("**", "").replace("__", "").replace("~~", "");
    collapse_whitespace(&text)
}

/// Escape the five XML special characters.
#[must_use]
pub fn xml_escape(text: &str) -> String {
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

/// Wrap already-normalized text in an SSML document with the given voice
/// and prosody.
#[must_use]
pub fn build_ssml(text: &str, locale: &str, voice: &str, prosody: Prosody) -> String {
    format!(
        "<speak version='1.0' xml:lang='{locale}'><voice name='{voice}'>\
         <prosody rate='{rate}' pitch='{pitch}'>{body}</prosody></voice></speak>",
        locale = xml_escape(locale),
        voice = xml_escape(voice),
        rate = prosody.rate_attr(),
        pitch = prosody.pitch_attr(),
        body = xml_escape(text),
    )
}

/// Collapse whitespace runs to single spaces and trim the ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_space {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(c);
            prev_space = false;
        }
    }

    result.trim().to_string()
}

fn strip_tags(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '<' && chars.peek().is_some_and(|n| n.is_ascii_alphabetic() || *n == '/') {
            // Skip to the closing '>'; an unterminated tag swallows the rest.
            for t in chars.by_ref() {
                if t == '>' {
                    break;
                }
            }
            // Tags often separate words ("one<br>two").
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}
