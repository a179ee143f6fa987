//! Trigger normalization: reaction emoji and message text become trigger keys.

use once_cell::sync::Lazy;
use regex::Regex;
use serenity::all::ReactionType;

static CUSTOM_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<a?:([A-Za-z0-9_~]+):[0-9]*>").expect("valid custom emoji regex"));

/// Longest emoji sequence we try to match, in chars (ZWJ families, tagged flags).
const MAX_EMOJI_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A Unicode emoji, as sent by the gateway.
    Unicode(String),
    /// A guild emoji, by registered name.
    Custom(String),
    /// A free-text token.
    Text(String),
}

impl Trigger {
    pub fn from_reaction(emoji: &ReactionType) -> Option<Self> {
        match emoji {
            ReactionType::Unicode(s) => Some(Self::Unicode(s.clone())),
            ReactionType::Custom {
                name: Some(name), ..
            } => Some(Self::Custom(name.clone())),
            _ => None,
        }
    }

    /// Canonical key used for every table lookup.
    pub fn key(&self) -> String {
        match self {
            Self::Unicode(raw) => unicode_key(raw),
            Self::Custom(name) => name.clone(),
            Self::Text(token) => token.to_lowercase(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

fn lookup(raw: &str) -> Option<&'static emojis::Emoji> {
    emojis::get(raw)
        .or_else(|| emojis::get(raw.trim_end_matches('\u{fe0f}')))
        .or_else(|| emojis::get(&format!("{raw}\u{fe0f}")))
}

/// `♨️` becomes `hot_springs`; unknown sequences are kept verbatim.
pub fn unicode_key(raw: &str) -> String {
    match lookup(raw) {
        Some(e) => canonical_name(e.name()),
        None => raw.to_string(),
    }
}

/// CLDR name to key: `flag: ` dropped, runs of non-alphanumerics folded into `_`.
pub fn canonical_name(name: &str) -> String {
    let name = name.strip_prefix("flag: ").unwrap_or(name);
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Reverse of [`unicode_key`], used when adding reactions.
pub fn unicode_for_key(key: &str) -> Option<&'static str> {
    emojis::iter()
        .find(|e| canonical_name(e.name()) == key)
        .map(|e| e.as_str())
}

/// Trigger key for a user-typed reaction: a custom marker, an emoji, a guild
/// emoji name (matched case-insensitively, stored as the guild spells it), or a word.
pub fn key_from_input<'a>(input: &str, guild_emojis: impl IntoIterator<Item = &'a str>) -> String {
    let input = input.trim();
    if let Some(cap) = CUSTOM_MARKER.captures(input)
        && cap.get(0).is_some_and(|m| m.as_str() == input)
    {
        return cap[1].to_string();
    }
    if lookup(input).is_some() {
        return unicode_key(input);
    }
    if let Some(name) = guild_emojis
        .into_iter()
        .find(|name| name.eq_ignore_ascii_case(input))
    {
        return name.to_string();
    }
    input.to_lowercase()
}

/// Extracts triggers from message content, in order of appearance per kind:
/// custom markers first, then Unicode emoji, then words. Duplicates are dropped.
pub fn scan_message(content: &str) -> Vec<Trigger> {
    let mut found = Vec::new();
    for cap in CUSTOM_MARKER.captures_iter(content) {
        found.push(Trigger::Custom(cap[1].to_string()));
    }

    let rest = CUSTOM_MARKER.replace_all(content, " ");
    let chars: Vec<(usize, char)> = rest.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        let (start, c) = chars[i];
        if c.is_ascii() {
            i += 1;
            continue;
        }
        let longest = (i + 1..=(i + MAX_EMOJI_CHARS).min(chars.len()))
            .rev()
            .find_map(|end| {
                let stop = chars.get(end).map_or(rest.len(), |(idx, _)| *idx);
                emojis::get(&rest[start..stop]).map(|e| (end, e))
            });
        match longest {
            Some((end, e)) => {
                found.push(Trigger::Unicode(e.as_str().to_string()));
                i = end;
            }
            None => i += 1,
        }
    }

    for word in rest.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if !word.is_empty() {
            found.push(Trigger::Text(word.to_lowercase()));
        }
    }

    let mut seen = std::collections::HashSet::new();
    found.retain(|t| seen.insert(t.clone()));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicode_emoji_normalize_to_cldr_keys() {
        assert_eq!(unicode_key("\u{2668}\u{fe0f}"), "hot_springs");
        assert_eq!(unicode_key("\u{2668}"), "hot_springs");
        assert_eq!(unicode_key("🍺"), "beer_mug");
        assert_eq!(unicode_key("🇯🇵"), "Japan");
    }

    #[test]
    fn canonical_name_folds_punctuation() {
        assert_eq!(
            canonical_name("Japanese “open for business” button"),
            "Japanese_open_for_business_button"
        );
        assert_eq!(
            canonical_name("thumbs up: medium skin tone"),
            "thumbs_up_medium_skin_tone"
        );
    }

    #[test]
    fn reverse_lookup_finds_the_emoji() {
        assert_eq!(unicode_for_key("beer_mug"), Some("🍺"));
        assert_eq!(unicode_for_key("definitely_not_an_emoji"), None);
    }

    #[test]
    fn reaction_types_become_triggers() {
        let custom = ReactionType::Custom {
            animated: false,
            id: serenity::all::EmojiId::new(42),
            name: Some("windowsxp".into()),
        };
        assert_eq!(
            Trigger::from_reaction(&custom).map(|t| t.key()),
            Some("windowsxp".to_string())
        );
        let unicode = ReactionType::Unicode("🍺".into());
        assert_eq!(
            Trigger::from_reaction(&unicode).map(|t| t.key()),
            Some("beer_mug".to_string())
        );
    }

    #[test]
    fn scan_finds_markers_emoji_and_words() {
        let found = scan_message("Hello <:windowsxp:123> 🍺 <a:party:9> Hello");
        assert_eq!(
            found,
            vec![
                Trigger::Custom("windowsxp".into()),
                Trigger::Custom("party".into()),
                Trigger::Unicode("🍺".into()),
                Trigger::Text("hello".into()),
            ]
        );
    }

    #[test]
    fn typed_input_becomes_a_key() {
        assert_eq!(key_from_input(" <:windowsxp:123> ", []), "windowsxp");
        assert_eq!(key_from_input("🍺", []), "beer_mug");
        assert_eq!(key_from_input("Atsumori", []), "atsumori");
    }

    #[test]
    fn bare_guild_emoji_name_keeps_guild_casing() {
        let guild = ["windowsxp", "Nyanchu"];
        assert_eq!(key_from_input("nyanchu", guild), "Nyanchu");
        assert_eq!(key_from_input("NYANCHU", guild), "Nyanchu");
        assert_eq!(key_from_input("Hello", guild), "hello");
    }

    #[test]
    fn text_keys_are_lowercase() {
        assert_eq!(Trigger::Text("Atsumori".into()).key(), "atsumori");
        assert!(Trigger::Text("x".into()).is_text());
    }
}
