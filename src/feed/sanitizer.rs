//! Clean-up of WordPress-rendered HTML before it is cached.
//!
//! Every public function here is idempotent: each field's pass is applied
//! until the text stops changing. Passes only ever delete text, apart from
//! the single `</p>` that is appended when a body opens a paragraph without
//! closing it, so the iteration always settles.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;

const TRUNCATION_MARKERS: [&str; 3] = ["[&hellip;]", "[…]", "[&#8230;]"];
const PROTECTED_PLACEHOLDER: &str = "(Passwortgeschützer Inhalt)";

fn re_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn re_more_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<a class="more-link"[^>]*>.*?</a>"#).unwrap())
}

fn re_shortcode() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[/?[^\]]+\]").unwrap())
}

pub fn sanitize_title(raw: &str) -> String {
    to_fixed_point(raw, |s| {
        let stripped = re_tag().replace_all(s, "");
        stripped.replace(PROTECTED_PLACEHOLDER, "")
    })
}

pub fn sanitize_content(raw: &str) -> String {
    to_fixed_point(raw, |s| body_pass(s, true))
}

pub fn sanitize_excerpt(raw: &str) -> String {
    to_fixed_point(raw, |s| body_pass(s, false))
}

/// Drops a fractional-second part and pins the result to UTC, e.g.
/// `2024-03-08T12:34:56.789` becomes `2024-03-08T12:34:56Z`.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    match raw.find('.') {
        Some(dot) => format!("{}Z", &raw[..dot]),
        None => raw.to_string(),
    }
}

/// Parses an upstream timestamp into a second-precision UTC instant.
/// Timestamps without an offset are taken as UTC.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = normalize_date(raw);
    let parsed = DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })?;
    parsed.with_nanosecond(0)
}

fn body_pass(input: &str, close_paragraph: bool) -> String {
    let mut text = input.to_string();
    for marker in TRUNCATION_MARKERS {
        text = text.replace(marker, "");
    }
    text = re_more_link().replace_all(&text, "").into_owned();
    text = re_shortcode().replace_all(&text, "").into_owned();
    text = text.replace("&hellip;", "...");
    strip_trailing_ellipsis(&mut text);

    if close_paragraph && text.contains("<p>") && !text.contains("</p>") {
        text.push_str("</p>");
    }

    text.replace(PROTECTED_PLACEHOLDER, "")
}

fn strip_trailing_ellipsis(text: &mut String) {
    loop {
        if text.ends_with('…') {
            text.pop();
        } else if text.ends_with("...") {
            text.truncate(text.len() - 2);
        } else {
            break;
        }
    }
}

fn to_fixed_point(input: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = pass(input);
    loop {
        let next = pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
