//! Active-tag resolution per container, plus custom tag rules scoped by
//! source format.
//!
//! Resolution order per container: environment variable (empty string
//! disables all tags) → config list → canonical default list. Unknown
//! ids are dropped with a warning and the result is deduplicated in
//! canonical order.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::config::{Config, CustomTagRule};

pub const ENV_METADATA_TAGS_M4A: &str = "AMR_METADATA_TAGS_M4A";
pub const ENV_METADATA_TAGS_FLAC: &str = "AMR_METADATA_TAGS_FLAC";
pub const ENV_SOURCE_FORMAT: &str = "AMR_SOURCE_FORMAT";

pub const MAX_CUSTOM_TAGS: usize = 30;
pub const MAX_CUSTOM_VALUE: usize = 512;

/// Title/album prefix applied in Atmos runs (U+1F133 + space).
pub const ATMOS_PREFIX: &str = "\u{1F133} ";

const M4A_TAGS: &[&str] = &[
    "title",
    "title_sort",
    "artist",
    "artist_sort",
    "album",
    "album_sort",
    "album_artist",
    "album_artist_sort",
    "composer",
    "composer_sort",
    "genre",
    "track_number",
    "track_total",
    "disc_number",
    "disc_total",
    "release_date",
    "release_type",
    "isrc",
    "upc",
    "label",
    "publisher",
    "copyright",
    "advisory",
    "itunes_album_id",
    "itunes_artist_id",
    "album_version",
    "lyrics",
    "cover",
    "performer",
];

const FLAC_TAGS: &[&str] = &[
    "title",
    "title_sort",
    "artist",
    "artist_sort",
    "album",
    "album_sort",
    "album_artist",
    "album_artist_sort",
    "composer",
    "composer_sort",
    "genre",
    "track_number",
    "track_total",
    "disc_number",
    "disc_total",
    "release_date",
    "original_date",
    "release_type",
    "isrc",
    "upc",
    "label",
    "publisher",
    "copyright",
    "advisory",
    "album_version",
    "lyrics",
    "cover",
    "performer",
    "loudness",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    M4a,
    Flac,
}

pub fn canonical_tag_order(container: Container) -> &'static [&'static str] {
    match container {
        Container::M4a => M4A_TAGS,
        Container::Flac => FLAC_TAGS,
    }
}

/// Normalize a raw tag list: lowercase/trim, drop unknown ids with a
/// warning, dedupe, and sort into canonical order.
fn normalize_known_tags(entries: &[String], container: Container) -> Vec<String> {
    let order = canonical_tag_order(container);
    let known: HashSet<&str> = order.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for raw in entries {
        let tag = raw.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if !known.contains(tag.as_str()) {
            warn!(tag = %tag, "skipping unknown metadata tag");
            continue;
        }
        if seen.insert(tag.clone()) {
            kept.push(tag);
        }
    }
    kept.sort_by_key(|tag| order.iter().position(|t| t == tag).unwrap_or(order.len()));
    kept
}

/// Resolve the enabled tag set for a container from an optional env value
/// and optional config list.
pub fn resolve_enabled_tags(
    container: Container,
    env_value: Option<&str>,
    config_list: Option<&[String]>,
) -> HashSet<String> {
    let active: Vec<String> = match env_value {
        Some(env) => {
            if env.trim().is_empty() {
                Vec::new()
            } else {
                env.split(',').map(str::to_string).collect()
            }
        }
        None => match config_list {
            Some(list) => list.to_vec(),
            None => canonical_tag_order(container)
                .iter()
                .map(|t| t.to_string())
                .collect(),
        },
    };
    normalize_known_tags(&active, container).into_iter().collect()
}

/// Resolve the run's active source format: env override when it names a
/// valid format, else derived from the mode flags (atmos > aac >
/// lossless).
pub fn resolve_source_format(env_value: Option<&str>, atmos: bool, aac: bool) -> String {
    if let Some(raw) = env_value {
        let source = raw.trim().to_lowercase();
        if matches!(source.as_str(), "lossless" | "hires" | "aac" | "atmos") {
            return source;
        }
        warn!(value = raw, "ignoring unsupported source format override");
    }
    if atmos {
        "atmos".to_string()
    } else if aac {
        "aac".to_string()
    } else {
        "lossless".to_string()
    }
}

fn key_is_valid(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 64
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '_' | ':' | '-'))
}

/// Parse custom tag rules into per-container maps, honoring the active
/// source format and the per-container cap.
pub fn parse_custom_tag_rules(
    rules: &[CustomTagRule],
    active_source_format: &str,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut m4a = BTreeMap::new();
    let mut flac = BTreeMap::new();
    let mut capped_m4a = false;
    let mut capped_flac = false;

    for (idx, rule) in rules.iter().enumerate() {
        let rule_number = idx + 1;
        let key = rule.key.trim().to_uppercase();
        let value = rule.value.trim().to_string();
        if !key_is_valid(&key) {
            warn!(rule = rule_number, key = %rule.key, "skipping custom metadata rule: invalid key");
            continue;
        }
        if value.is_empty() {
            warn!(rule = rule_number, key = %key, "skipping custom metadata rule: empty value");
            continue;
        }
        if value.len() > MAX_CUSTOM_VALUE {
            warn!(rule = rule_number, key = %key, "skipping custom metadata rule: value too long");
            continue;
        }
        let containers: HashSet<String> = rule
            .containers
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| matches!(c.as_str(), "m4a" | "flac"))
            .collect();
        if containers.is_empty() {
            warn!(rule = rule_number, key = %key, "skipping custom metadata rule: no valid containers");
            continue;
        }
        let source_formats: HashSet<String> = rule
            .source_formats
            .iter()
            .map(|f| f.trim().to_lowercase())
            .filter(|f| matches!(f.as_str(), "lossless" | "hires" | "aac" | "atmos"))
            .collect();
        if source_formats.is_empty() {
            warn!(rule = rule_number, key = %key, "skipping custom metadata rule: no valid source formats");
            continue;
        }
        if !source_formats.contains(active_source_format) {
            continue;
        }

        if containers.contains("m4a") {
            assign_with_limit(&mut m4a, &key, &value, "m4a", &mut capped_m4a);
        }
        if containers.contains("flac") {
            assign_with_limit(&mut flac, &key, &value, "flac", &mut capped_flac);
        }
    }
    (m4a, flac)
}

fn assign_with_limit(
    target: &mut BTreeMap<String, String>,
    key: &str,
    value: &str,
    container: &str,
    capped: &mut bool,
) {
    if target.contains_key(key) {
        target.insert(key.to_string(), value.to_string());
        return;
    }
    if target.len() >= MAX_CUSTOM_TAGS {
        if !*capped {
            warn!(container, limit = MAX_CUSTOM_TAGS, "custom tag limit reached; remaining entries ignored");
            *capped = true;
        }
        return;
    }
    target.insert(key.to_string(), value.to_string());
}

/// Resolved metadata policy for a run.
#[derive(Debug, Clone, Default)]
pub struct MetadataPolicy {
    pub m4a_enabled: HashSet<String>,
    pub flac_enabled: HashSet<String>,
    pub custom_m4a: BTreeMap<String, String>,
    pub custom_flac: BTreeMap<String, String>,
    pub atmos_prefix_enabled: bool,
    pub source_format: String,
}

impl MetadataPolicy {
    pub fn from_env(config: &Config, atmos: bool, aac: bool) -> Self {
        let env_m4a = std::env::var(ENV_METADATA_TAGS_M4A).ok();
        let env_flac = std::env::var(ENV_METADATA_TAGS_FLAC).ok();
        let env_source = std::env::var(ENV_SOURCE_FORMAT).ok();
        Self::resolve(
            config,
            env_m4a.as_deref(),
            env_flac.as_deref(),
            env_source.as_deref(),
            atmos,
            aac,
        )
    }

    pub fn resolve(
        config: &Config,
        env_m4a: Option<&str>,
        env_flac: Option<&str>,
        env_source: Option<&str>,
        atmos: bool,
        aac: bool,
    ) -> Self {
        let source_format = resolve_source_format(env_source, atmos, aac);
        let (custom_m4a, custom_flac) =
            parse_custom_tag_rules(&config.metadata_custom_tag_rules, &source_format);
        Self {
            m4a_enabled: resolve_enabled_tags(
                Container::M4a,
                env_m4a,
                config.metadata_tags_m4a.as_deref(),
            ),
            flac_enabled: resolve_enabled_tags(
                Container::Flac,
                env_flac,
                config.metadata_tags_flac.as_deref(),
            ),
            custom_m4a,
            custom_flac,
            atmos_prefix_enabled: config.metadata_atmos_prefix_enabled(),
            source_format,
        }
    }

    pub fn m4a(&self, tag: &str) -> bool {
        self.m4a_enabled.contains(tag)
    }

    pub fn flac(&self, tag: &str) -> bool {
        self.flac_enabled.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_env_disables_everything() {
        let enabled = resolve_enabled_tags(Container::M4a, Some(""), None);
        assert!(enabled.is_empty());
        let enabled = resolve_enabled_tags(Container::M4a, Some("   "), None);
        assert!(enabled.is_empty());
    }

    #[test]
    fn env_overrides_config() {
        let config_list = strings(&["album", "artist"]);
        let enabled =
            resolve_enabled_tags(Container::M4a, Some("title,isrc"), Some(&config_list));
        assert!(enabled.contains("title"));
        assert!(enabled.contains("isrc"));
        assert!(!enabled.contains("album"));
    }

    #[test]
    fn unknown_ids_never_enable_and_duplicates_collapse() {
        let list = strings(&["title", "bogus", "TITLE", " artist "]);
        let enabled = resolve_enabled_tags(Container::M4a, None, Some(&list));
        assert_eq!(enabled.len(), 2);
        assert!(enabled.contains("title"));
        assert!(enabled.contains("artist"));
    }

    #[test]
    fn normalization_keeps_canonical_order() {
        let list = strings(&["isrc", "title", "artist"]);
        let ordered = normalize_known_tags(&list, Container::M4a);
        assert_eq!(ordered, vec!["title", "artist", "isrc"]);
    }

    #[test]
    fn flac_only_tags_stay_flac_only() {
        let list = strings(&["loudness", "original_date"]);
        assert!(resolve_enabled_tags(Container::M4a, None, Some(&list)).is_empty());
        let flac = resolve_enabled_tags(Container::Flac, None, Some(&list));
        assert_eq!(flac.len(), 2);
    }

    #[test]
    fn source_format_env_override_and_flag_fallback() {
        assert_eq!(resolve_source_format(Some("HIRES"), false, false), "hires");
        assert_eq!(resolve_source_format(Some("vinyl"), true, false), "atmos");
        assert_eq!(resolve_source_format(None, false, true), "aac");
        assert_eq!(resolve_source_format(None, false, false), "lossless");
    }

    #[test]
    fn custom_rules_scope_by_source_format() {
        let rules = vec![
            CustomTagRule {
                key: "comment".to_string(),
                value: "hi".to_string(),
                containers: strings(&["m4a", "flac"]),
                source_formats: strings(&["lossless"]),
            },
            CustomTagRule {
                key: "ONLY_ATMOS".to_string(),
                value: "x".to_string(),
                containers: strings(&["m4a"]),
                source_formats: strings(&["atmos"]),
            },
        ];
        let (m4a, flac) = parse_custom_tag_rules(&rules, "lossless");
        assert_eq!(m4a.get("COMMENT").map(String::as_str), Some("hi"));
        assert_eq!(flac.len(), 1);
        assert!(!m4a.contains_key("ONLY_ATMOS"));

        let (m4a, _) = parse_custom_tag_rules(&rules, "atmos");
        assert!(m4a.contains_key("ONLY_ATMOS"));
        assert!(!m4a.contains_key("COMMENT"));
    }

    #[test]
    fn custom_rules_validate_keys_and_values() {
        let rules = vec![
            CustomTagRule {
                key: "bad key!".to_string(),
                value: "x".to_string(),
                containers: strings(&["m4a"]),
                source_formats: strings(&["lossless"]),
            },
            CustomTagRule {
                key: "EMPTY".to_string(),
                value: "  ".to_string(),
                containers: strings(&["m4a"]),
                source_formats: strings(&["lossless"]),
            },
            CustomTagRule {
                key: "NO_CONTAINER".to_string(),
                value: "x".to_string(),
                containers: strings(&["ogg"]),
                source_formats: strings(&["lossless"]),
            },
        ];
        let (m4a, flac) = parse_custom_tag_rules(&rules, "lossless");
        assert!(m4a.is_empty());
        assert!(flac.is_empty());
    }

    #[test]
    fn custom_rules_cap_at_thirty_per_container() {
        let mut rules = Vec::new();
        for i in 0..40 {
            rules.push(CustomTagRule {
                key: format!("KEY_{i}"),
                value: "v".to_string(),
                containers: strings(&["m4a"]),
                source_formats: strings(&["lossless"]),
            });
        }
        let (m4a, _) = parse_custom_tag_rules(&rules, "lossless");
        assert_eq!(m4a.len(), MAX_CUSTOM_TAGS);
    }
}
