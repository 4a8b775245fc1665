//! Artist, composer, and title name handling: featured-artist
//! extraction, separator splitting, and the Atmos title prefix.

use regex::Regex;

use super::policy::ATMOS_PREFIX;

fn featured_bracket_re() -> Regex {
    Regex::new(r"(?i)\s*[\(\[]\s*(?:feat(?:\.|uring)?|ft\.?)\s+([^\)\]]+?)\s*[\)\]]\s*$")
        .expect("static regex")
}

fn featured_inline_re() -> Regex {
    Regex::new(r"(?i)\s+(?:[-–—]\s*)?(?:feat(?:\.|uring)?|ft\.?)\s+(.+?)\s*$")
        .expect("static regex")
}

fn feat_separator_re() -> Regex {
    Regex::new(r"(?i)\s+(?:feat(?:\.|uring)?|ft\.?)\s+").expect("static regex")
}

/// Trim, drop empties, and dedupe preserving first-seen order.
pub fn normalized_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in names {
        let name = raw.as_ref().trim().to_string();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}

fn split_tokens(raw: &str, delimiters: &[&str]) -> Vec<String> {
    let mut parts = vec![raw.to_string()];
    for delimiter in delimiters {
        let mut next = Vec::with_capacity(parts.len());
        for part in parts {
            if part.contains(delimiter) {
                next.extend(part.split(delimiter).map(str::to_string));
            } else {
                next.push(part);
            }
        }
        parts = next;
    }
    parts
}

/// Split the catalog `artistName` field on its separators, folding
/// `feat.`-style joiners into `; ` first.
pub fn artists_from_field(value: &str) -> Vec<String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let raw = feat_separator_re().replace_all(raw, "; ").into_owned();
    normalized_names(split_tokens(
        &raw,
        &["; ", ";", " / ", " x ", " X ", " × "],
    ))
}

fn parse_featured_artists(value: &str) -> Vec<String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    normalized_names(split_tokens(
        raw,
        &[
            "; ", ";", " / ", " x ", " X ", " × ", " and ", " And ", " with ", " With ", ", ", ",",
        ],
    ))
}

/// Strip `(feat. X)` / `[ft. X]` / ` - feat. X` suffixes from a title,
/// returning the cleaned title and the featured names. Idempotent after
/// one application.
pub fn strip_featured_from_title(title: &str) -> (String, Vec<String>) {
    let mut cleaned = title.trim().to_string();
    if cleaned.is_empty() {
        return (String::new(), Vec::new());
    }
    let bracket = featured_bracket_re();
    let inline = featured_inline_re();
    let mut featured = Vec::new();

    loop {
        if let Some(caps) = bracket.captures(&cleaned) {
            featured.extend(parse_featured_artists(&caps[1]));
            let full = caps.get(0).expect("whole match").as_str().to_string();
            cleaned = cleaned
                .strip_suffix(&full)
                .unwrap_or(&cleaned)
                .trim()
                .to_string();
            continue;
        }
        if let Some(caps) = inline.captures(&cleaned) {
            featured.extend(parse_featured_artists(&caps[1]));
            let full = caps.get(0).expect("whole match").as_str().to_string();
            cleaned = cleaned
                .strip_suffix(&full)
                .unwrap_or(&cleaned)
                .trim()
                .trim_end_matches(['-', '–', '—'])
                .trim()
                .to_string();
            continue;
        }
        break;
    }

    if cleaned.is_empty() {
        cleaned = title.trim().to_string();
    }
    (cleaned, normalized_names(featured))
}

pub fn format_artist_list(names: &[String]) -> String {
    normalized_names(names).join(", ")
}

pub fn primary_artist(names: &[String]) -> String {
    normalized_names(names).into_iter().next().unwrap_or_default()
}

fn looks_like_composer_abbreviation(token: &str) -> bool {
    let trimmed = token.trim();
    if trimmed.is_empty() || trimmed.len() > 3 {
        return false;
    }
    let has_letter = trimmed.chars().any(|c| c.is_ascii_alphabetic());
    has_letter && trimmed.to_uppercase() == trimmed
}

fn should_split_standalone_ampersand(raw: &str) -> bool {
    if raw.matches(" & ").count() != 1 {
        return false;
    }
    if raw.contains(',')
        || raw.contains(';')
        || raw.contains(" / ")
        || raw.contains(" x ")
        || raw.contains(" X ")
        || raw.contains(" × ")
    {
        return false;
    }
    let Some((left, right)) = raw.split_once(" & ") else {
        return false;
    };
    let left = left.trim();
    let right = right.trim();
    if left.is_empty() || right.is_empty() {
        return false;
    }
    let left_words: Vec<&str> = left.split_whitespace().collect();
    let right_words: Vec<&str> = right.split_whitespace().collect();
    if left_words.is_empty() || right_words.is_empty() {
        return false;
    }
    if left_words.len() == 1
        && right_words.len() == 1
        && !looks_like_composer_abbreviation(left_words[0])
        && !looks_like_composer_abbreviation(right_words[0])
    {
        return false;
    }
    true
}

fn should_split_composer_conjunction(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.contains(';')
        || trimmed.contains(" / ")
        || trimmed.contains(" x ")
        || trimmed.contains(" X ")
        || trimmed.contains(" × ")
    {
        return true;
    }
    if should_split_standalone_ampersand(trimmed) {
        return true;
    }
    trimmed.matches(',').count() >= 2
}

/// Split a composer field. Conjunctions (` & `, ` and `) split only when
/// the field already looks multi-composer: multiple commas, or an
/// ampersand pair where at least one side is an ALL-CAPS short token.
pub fn composers_from_field(value: &str) -> Vec<String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let parts = split_tokens(raw, &["; ", ";", " / ", " x ", " X ", " × ", ", ", ","]);
    let split_conjunction = should_split_composer_conjunction(raw);
    let mut expanded = Vec::with_capacity(parts.len());
    for part in parts {
        let token = part.trim().to_string();
        if token.is_empty() {
            continue;
        }
        if split_conjunction {
            for sub in split_tokens(&token, &[" & ", " and ", " And "]) {
                let sub = sub.trim();
                if !sub.is_empty() {
                    expanded.push(sub.to_string());
                }
            }
        } else {
            expanded.push(token);
        }
    }
    normalized_names(expanded)
}

pub fn format_composer_list(value: &str) -> String {
    format_artist_list(&composers_from_field(value))
}

/// Apply the Atmos prefix to a display string. Idempotent; empty input
/// stays empty.
pub fn with_atmos_prefix(value: &str, apply: bool) -> String {
    let clean = value.trim();
    if clean.is_empty() {
        return String::new();
    }
    if !apply || clean.starts_with(ATMOS_PREFIX) {
        return clean.to_string();
    }
    format!("{ATMOS_PREFIX}{clean}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atmos_prefix_is_idempotent() {
        let once = with_atmos_prefix("Song X", true);
        assert_eq!(once, "\u{1F133} Song X");
        assert_eq!(with_atmos_prefix(&once, true), once);
        assert_eq!(with_atmos_prefix("Song X", false), "Song X");
        assert_eq!(with_atmos_prefix("  ", true), "");
    }

    #[test]
    fn featured_extraction_handles_brackets_and_inline() {
        let (title, featured) = strip_featured_from_title("Song (feat. A & B)");
        assert_eq!(title, "Song");
        assert_eq!(featured, vec!["A & B"]);

        let (title, featured) = strip_featured_from_title("Song [ft. Someone]");
        assert_eq!(title, "Song");
        assert_eq!(featured, vec!["Someone"]);

        let (title, featured) = strip_featured_from_title("Song - feat. A, B");
        assert_eq!(title, "Song");
        assert_eq!(featured, vec!["A", "B"]);
    }

    #[test]
    fn featured_extraction_is_idempotent() {
        let (title, _) = strip_featured_from_title("Song (feat. A)");
        let (again, featured) = strip_featured_from_title(&title);
        assert_eq!(again, title);
        assert!(featured.is_empty());
    }

    #[test]
    fn artist_field_splits_on_separators() {
        assert_eq!(
            artists_from_field("A; B / C x D"),
            vec!["A", "B", "C", "D"]
        );
        assert_eq!(
            artists_from_field("Artist feat. Guest"),
            vec!["Artist", "Guest"]
        );
        assert_eq!(artists_from_field("One × Two"), vec!["One", "Two"]);
    }

    #[test]
    fn artist_list_dedupes_first_seen() {
        let names = vec![
            "A".to_string(),
            " A ".to_string(),
            "B".to_string(),
            "".to_string(),
        ];
        assert_eq!(format_artist_list(&names), "A, B");
        assert_eq!(primary_artist(&names), "A");
    }

    #[test]
    fn composer_conjunctions_split_only_when_multi() {
        // Simple duo stays together.
        assert_eq!(
            composers_from_field("Simon & Garfunkel"),
            vec!["Simon & Garfunkel"]
        );
        // ALL-CAPS short token marks a credit list.
        assert_eq!(composers_from_field("JID & Friend"), vec!["JID", "Friend"]);
        // Two commas mark a list; conjunctions split too.
        assert_eq!(
            composers_from_field("A Writer, B Writer, C & D"),
            vec!["A Writer", "B Writer", "C", "D"]
        );
    }
}
