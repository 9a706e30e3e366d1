//! Profile fields scraped from a snapshot of the rendered Nextcloud
//! personal-settings page. Each field is a cascade of selectors where the
//! first non-empty match wins.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::models::UserProfile;

const NAME_SELECTORS: [&str; 2] = [
    "span[data-v-55600bf5]",
    "div#settings div.user-info__header-full-name",
];

const CLASS_SELECTORS: [&str; 3] = [
    "span[data-v-29a613a4].details__groups-list",
    ".details__groups-list",
    "span[data-v-29a613a4]",
];

fn re_display_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""displayName":\s*"([^"]+)""#).unwrap())
}

fn re_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""email":\s*"([^"]+)""#).unwrap())
}

fn re_avatar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/avatar/([^/]+)/").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Name,
    Email,
    Class,
    Avatar,
}

impl ProfileField {
    pub fn screenshot_name(self) -> &'static str {
        match self {
            ProfileField::Name => "missing_name.png",
            ProfileField::Email => "missing_email.png",
            ProfileField::Class => "missing_class.png",
            ProfileField::Avatar => "missing_avatar.png",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapedProfile {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub school_class: Option<String>,
    pub avatar_id: Option<String>,
}

impl ScrapedProfile {
    pub fn missing_fields(&self) -> Vec<ProfileField> {
        let mut missing = Vec::new();
        if self.full_name.is_none() {
            missing.push(ProfileField::Name);
        }
        if self.email.is_none() {
            missing.push(ProfileField::Email);
        }
        if self.school_class.is_none() {
            missing.push(ProfileField::Class);
        }
        if self.avatar_id.is_none() {
            missing.push(ProfileField::Avatar);
        }
        missing
    }

    /// Missing fields become empty strings.
    pub fn into_profile(self, base_url: &str, webdav_prefix: &str) -> UserProfile {
        let (first_name, last_name) = self
            .full_name
            .as_deref()
            .map(split_name)
            .unwrap_or_default();

        UserProfile {
            first_name,
            last_name,
            email: self.email.unwrap_or_default(),
            school_class: self.school_class.unwrap_or_default(),
            webdav_url: self
                .avatar_id
                .map(|id| webdav_url(base_url, webdav_prefix, &id))
                .unwrap_or_default(),
        }
    }
}

pub fn scrape_settings_page(source: &str) -> ScrapedProfile {
    let document = Html::parse_document(source);

    ScrapedProfile {
        full_name: first_text(&document, &NAME_SELECTORS)
            .or_else(|| capture(re_display_name(), source)),
        email: first_text(&document, &["span[data-v-3670cfbc]"])
            .or_else(|| first_attr(&document, "#email", "value"))
            .or_else(|| capture(re_email(), source)),
        school_class: first_text(&document, &CLASS_SELECTORS).and_then(|groups| first_group(&groups)),
        avatar_id: find_avatar_id(&document),
    }
}

/// The last token is the last name; everything before it, joined by single
/// spaces, is the first name.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut tokens: Vec<&str> = full_name.split_whitespace().collect();
    match tokens.len() {
        0 => (String::new(), String::new()),
        1 => (tokens[0].to_string(), String::new()),
        _ => {
            let last = tokens.pop().unwrap_or_default();
            (tokens.join(" "), last.to_string())
        }
    }
}

pub fn avatar_id_from_src(src: &str) -> Option<String> {
    re_avatar()
        .captures(src)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn webdav_url(base_url: &str, webdav_prefix: &str, avatar_id: &str) -> String {
    format!(
        "{}/{}/{}/",
        base_url.trim_end_matches('/'),
        webdav_prefix.trim_matches('/'),
        avatar_id
    )
}

fn first_group(groups: &str) -> Option<String> {
    groups
        .split(',')
        .next()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
}

fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document.select(&selector).find_map(|element| {
            let text = element.text().collect::<String>();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
    })
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn capture(re: &Regex, source: &str) -> Option<String> {
    re.captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn find_avatar_id(document: &Html) -> Option<String> {
    let selector = Selector::parse("img").ok()?;
    document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| src.contains("/avatar/"))
        .find_map(avatar_id_from_src)
}
