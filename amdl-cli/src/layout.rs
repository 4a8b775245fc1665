//! Destination-path construction: template substitution, name
//! sanitization, release-type detection, root-folder selection, and the
//! sibling-directory rules used for idempotence and cover/lyrics reuse.

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Characters never allowed in file or folder names.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// Folder names additionally lose a trailing dot (all dots, when the name
/// ends with one) and surrounding whitespace.
pub fn sanitize_folder_name(name: &str) -> String {
    let mut name = name.trim().to_string();
    if name.ends_with('.') {
        name = name.replace('.', "");
    }
    name.trim().to_string()
}

/// Clamp a display string to `limit` unicode code points.
pub fn limit_string(value: &str, limit: usize) -> String {
    if value.chars().count() > limit {
        value.chars().take(limit).collect()
    } else {
        value.to_string()
    }
}

/// Substitute `{placeholder}` pairs in a template. The placeholder set is
/// closed; unknown braces pass through untouched.
pub fn apply_template(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(key, value);
    }
    out
}

/// Release classification used for folder placement: Singles, EPs, or
/// Albums. Depends only on its arguments.
pub fn detect_release_type(name: &str, track_count: u32, is_single: bool) -> &'static str {
    let lower = name.to_lowercase();
    if is_single || lower.contains("single") {
        return "Singles";
    }
    if looks_like_ep_name(&lower) {
        return "EPs";
    }
    if track_count > 0 {
        if track_count <= 3 {
            return "Singles";
        }
        if track_count <= 6 {
            return "EPs";
        }
    }
    "Albums"
}

/// Release classification used as metadata: single, ep, album,
/// compilation, or mixtape.
pub fn detect_metadata_release_type(
    name: &str,
    track_count: u32,
    is_single: bool,
    is_compilation: bool,
) -> &'static str {
    let lower = name.to_lowercase();
    if is_compilation {
        return "compilation";
    }
    if is_single {
        return "single";
    }
    if lower.contains("mixtape") {
        return "mixtape";
    }
    if lower.contains("single") {
        return "single";
    }
    if looks_like_ep_name(&lower) {
        return "ep";
    }
    if track_count > 0 {
        if track_count <= 3 {
            return "single";
        }
        if track_count <= 6 {
            return "ep";
        }
    }
    "album"
}

pub fn looks_like_ep_name(lower_name: &str) -> bool {
    lower_name.contains(" ep")
        || lower_name.ends_with(" ep")
        || lower_name.contains("- ep")
        || lower_name.contains("(ep)")
        || lower_name.contains("[ep]")
}

pub fn release_folder_label(release_type: &str) -> &'static str {
    match release_type.trim().to_lowercase().as_str() {
        "ep" | "eps" => "EPs",
        "single" | "singles" => "Singles",
        _ => "Albums",
    }
}

/// Root folder for the active mode: Atmos, AAC, or ALAC tree.
pub fn current_root_folder(config: &Config, atmos: bool, aac: bool) -> &str {
    if atmos {
        &config.atmos_save_folder
    } else if aac {
        &config.aac_save_folder
    } else {
        &config.alac_save_folder
    }
}

/// Relocate an ALAC-tree save dir under the AAC root for the
/// lossless-unavailable fallback, preserving the relative path.
pub fn fallback_aac_save_dir(config: &Config, original: &Path) -> PathBuf {
    let target_root = config.aac_save_folder.trim();
    if target_root.is_empty() {
        return original.to_path_buf();
    }
    let source_root = Path::new(config.alac_save_folder.trim());
    if !config.alac_save_folder.trim().is_empty()
        && let Ok(rel) = original.strip_prefix(source_root)
    {
        if rel.as_os_str().is_empty() {
            return PathBuf::from(target_root);
        }
        return Path::new(target_root).join(rel);
    }
    match original.file_name() {
        Some(base) => Path::new(target_root).join(base),
        None => PathBuf::from(target_root),
    }
}

fn relative_to_root(dir: &Path, root: &str) -> Option<PathBuf> {
    if root.is_empty() {
        return None;
    }
    dir.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// The same relative path under each of the other two format roots.
/// Idempotence checks and cover/lyrics reuse treat these as siblings.
pub fn sibling_dirs_for_path(config: &Config, dir: &Path) -> Vec<PathBuf> {
    let roots = [
        config.alac_save_folder.as_str(),
        config.atmos_save_folder.as_str(),
        config.aac_save_folder.as_str(),
    ];
    let mut rel: Option<PathBuf> = None;
    let mut base = "";
    for root in roots {
        if root.is_empty() {
            continue;
        }
        if let Some(candidate) = relative_to_root(dir, root) {
            rel = Some(candidate);
            base = root;
            break;
        }
    }
    let Some(rel) = rel else {
        return Vec::new();
    };
    roots
        .into_iter()
        .filter(|root| !root.is_empty() && *root != base)
        .map(|root| {
            if rel.as_os_str().is_empty() {
                PathBuf::from(root)
            } else {
                Path::new(root).join(&rel)
            }
        })
        .collect()
}

/// Look for `filename` in `dir` first, then in each sibling-format dir.
pub fn find_existing_sibling_file(
    config: &Config,
    dir: &Path,
    filename: &str,
) -> Option<PathBuf> {
    let target = dir.join(filename);
    if target.is_file() {
        return Some(target);
    }
    sibling_dirs_for_path(config, dir)
        .into_iter()
        .map(|sibling| sibling.join(filename))
        .find(|candidate| candidate.is_file())
}

/// Cover file path for a folder, honoring the configured format. For
/// `original` the extension is sniffed from the artwork URL's
/// second-to-last path segment.
pub fn cover_file_path(config: &Config, folder: &Path, name: &str, url: &str) -> PathBuf {
    if config.cover_format == "original" {
        let segments: Vec<&str> = url.split('/').collect();
        let ext = segments
            .len()
            .checked_sub(2)
            .and_then(|i| segments.get(i))
            .and_then(|segment| segment.rsplit('.').next())
            .unwrap_or("jpg");
        folder.join(format!("{name}.{ext}"))
    } else {
        folder.join(format!("{name}.{}", config.cover_format))
    }
}

/// Build the artist folder name from the configured template. An empty
/// template disables the artist level entirely.
pub fn artist_folder_name(config: &Config, artist_name: &str, artist_id: &str) -> String {
    if config.artist_folder_format.is_empty() {
        return String::new();
    }
    let limited = limit_string(artist_name, config.limit_max);
    let folder = apply_template(
        &config.artist_folder_format,
        &[
            ("{UrlArtistName}", limited.as_str()),
            ("{ArtistName}", limited.as_str()),
            ("{ArtistId}", artist_id),
        ],
    );
    sanitize_folder_name(&folder)
}

/// Inputs for the album folder template.
#[derive(Debug, Clone, Default)]
pub struct AlbumFolderParts<'a> {
    pub artist_name: &'a str,
    pub album_name: &'a str,
    pub album_id: &'a str,
    pub release_date: &'a str,
    pub upc: &'a str,
    pub record_label: &'a str,
    pub copyright: &'a str,
    pub quality: &'a str,
    pub codec: &'a str,
    pub tag: &'a str,
}

/// Build the album folder name; Atmos runs get ` (Dolby Atmos)` appended
/// when the template did not already produce it.
pub fn album_folder_name(config: &Config, parts: &AlbumFolderParts<'_>, atmos: bool) -> String {
    let release_year = if parts.release_date.len() >= 4 {
        &parts.release_date[..4]
    } else {
        ""
    };
    let artist = limit_string(parts.artist_name, config.limit_max);
    let album = limit_string(parts.album_name, config.limit_max);
    let mut folder = apply_template(
        &config.album_folder_format,
        &[
            ("{ReleaseDate}", parts.release_date),
            ("{ReleaseYear}", release_year),
            ("{ArtistName}", artist.as_str()),
            ("{AlbumName}", album.as_str()),
            ("{UPC}", parts.upc),
            ("{RecordLabel}", parts.record_label),
            ("{Copyright}", parts.copyright),
            ("{AlbumId}", parts.album_id),
            ("{Quality}", parts.quality),
            ("{Codec}", parts.codec),
            ("{Tag}", parts.tag),
        ],
    );
    folder = sanitize_folder_name(&folder);
    if atmos && !folder.to_lowercase().contains("dolby atmos") {
        folder = format!("{folder} (Dolby Atmos)");
    }
    folder
}

/// Build the playlist folder name.
pub fn playlist_folder_name(
    config: &Config,
    artist_name: &str,
    playlist_name: &str,
    playlist_id: &str,
    codec: &str,
) -> String {
    let name = limit_string(playlist_name, config.limit_max);
    let folder = apply_template(
        &config.playlist_folder_format,
        &[
            ("{ArtistName}", artist_name),
            ("{PlaylistName}", name.as_str()),
            ("{PlaylistId}", playlist_id),
            ("{Quality}", ""),
            ("{Codec}", codec),
            ("{Tag}", ""),
        ],
    );
    sanitize_folder_name(&folder)
}

/// Inputs for the song file template.
#[derive(Debug, Clone, Default)]
pub struct SongFileParts<'a> {
    pub song_id: &'a str,
    pub song_name: &'a str,
    pub track_number: usize,
    pub disc_number: u32,
    pub quality: &'a str,
    pub codec: &'a str,
    pub tag: &'a str,
}

/// Build the song file stem (no extension, not yet sanitized).
pub fn song_file_stem(config: &Config, parts: &SongFileParts<'_>) -> String {
    let name = limit_string(parts.song_name, config.limit_max);
    apply_template(
        &config.song_file_format,
        &[
            ("{SongId}", parts.song_id),
            ("{SongNumer}", &format!("{:02}", parts.track_number)),
            ("{SongName}", name.as_str()),
            ("{DiscNumber}", &parts.disc_number.to_string()),
            ("{TrackNumber}", &parts.track_number.to_string()),
            ("{Quality}", parts.quality),
            ("{Tag}", parts.tag),
            ("{Codec}", parts.codec),
        ],
    )
}

/// The `{Tag}` joiner: Apple-Digital-Master, explicit, and clean badges
/// that apply, space-joined.
pub fn tag_badges(
    config: &Config,
    is_apple_digital_master: bool,
    content_rating: &str,
) -> String {
    let mut badges = Vec::new();
    if is_apple_digital_master && !config.apple_master_choice.is_empty() {
        badges.push(config.apple_master_choice.as_str());
    }
    if content_rating == "explicit" && !config.explicit_choice.is_empty() {
        badges.push(config.explicit_choice.as_str());
    }
    if content_rating == "clean" && !config.clean_choice.is_empty() {
        badges.push(config.clean_choice.as_str());
    }
    badges.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_forbidden_characters() {
        assert_eq!(sanitize_name(r#"a/b\c<d>e:f"g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_folder_name("  Name. "), "Name");
        assert_eq!(sanitize_folder_name("J. Cole"), "J. Cole");
        assert_eq!(sanitize_folder_name("Vol. 2."), "Vol 2");
    }

    #[test]
    fn limit_counts_code_points() {
        assert_eq!(limit_string("héllo wörld", 5), "héllo");
        assert_eq!(limit_string("ok", 5), "ok");
    }

    #[test]
    fn release_type_heuristics() {
        assert_eq!(detect_release_type("Live - EP", 4, false), "EPs");
        assert_eq!(detect_release_type("Album X", 2, false), "Singles");
        assert_eq!(detect_release_type("Album X", 5, false), "EPs");
        assert_eq!(detect_release_type("Album X", 12, false), "Albums");
        assert_eq!(detect_release_type("Whatever", 12, true), "Singles");
        assert_eq!(detect_release_type("Hits (EP)", 0, false), "EPs");
    }

    #[test]
    fn metadata_release_type_extends_the_folder_one() {
        assert_eq!(
            detect_metadata_release_type("Best Of", 20, false, true),
            "compilation"
        );
        assert_eq!(
            detect_metadata_release_type("Summer Mixtape", 9, false, false),
            "mixtape"
        );
        assert_eq!(detect_metadata_release_type("X", 12, false, false), "album");
        assert_eq!(detect_metadata_release_type("X - EP", 5, false, false), "ep");
    }

    #[test]
    fn fallback_dir_relocates_relative_path() {
        let config = Config {
            alac_save_folder: "alac-root".to_string(),
            aac_save_folder: "aac-root".to_string(),
            ..Config::default()
        };
        assert_eq!(
            fallback_aac_save_dir(&config, Path::new("alac-root/Artist/Albums/X")),
            PathBuf::from("aac-root/Artist/Albums/X")
        );
        assert_eq!(
            fallback_aac_save_dir(&config, Path::new("elsewhere/X")),
            PathBuf::from("aac-root/X")
        );
    }

    #[test]
    fn siblings_cover_the_other_two_roots() {
        let config = Config {
            alac_save_folder: "alac".to_string(),
            atmos_save_folder: "atmos".to_string(),
            aac_save_folder: "aac".to_string(),
            ..Config::default()
        };
        let siblings = sibling_dirs_for_path(&config, Path::new("atmos/Artist/Albums/X"));
        assert_eq!(
            siblings,
            vec![
                PathBuf::from("alac/Artist/Albums/X"),
                PathBuf::from("aac/Artist/Albums/X"),
            ]
        );
        assert!(sibling_dirs_for_path(&config, Path::new("unrelated/X")).is_empty());
    }

    #[test]
    fn album_folder_gets_atmos_suffix_once() {
        let config = Config::default();
        let parts = AlbumFolderParts {
            artist_name: "Artist",
            album_name: "Record",
            ..Default::default()
        };
        let name = album_folder_name(&config, &parts, true);
        assert_eq!(name, "Record (Dolby Atmos)");

        let parts = AlbumFolderParts {
            artist_name: "Artist",
            album_name: "Record (Dolby Atmos)",
            ..Default::default()
        };
        let name = album_folder_name(&config, &parts, true);
        assert_eq!(name, "Record (Dolby Atmos)");
    }

    #[test]
    fn cover_path_honors_original_format() {
        let mut config = Config::default();
        config.cover_format = "original".to_string();
        let path = cover_file_path(
            &config,
            Path::new("dir"),
            "cover",
            "https://host/image/thumb/Music/v4/ab/cd/artwork.png/{w}x{h}bb.jpg",
        );
        assert_eq!(path, PathBuf::from("dir/cover.png"));

        config.cover_format = "jpg".to_string();
        let path = cover_file_path(&config, Path::new("dir"), "cover", "ignored");
        assert_eq!(path, PathBuf::from("dir/cover.jpg"));
    }

    #[test]
    fn song_stem_substitutes_the_closed_set() {
        let config = Config {
            song_file_format: "{SongNumer}. {SongName} [{Codec}] [{Quality}]".to_string(),
            ..Config::default()
        };
        let stem = song_file_stem(
            &config,
            &SongFileParts {
                song_id: "1",
                song_name: "Tune",
                track_number: 3,
                disc_number: 1,
                quality: "24B-48.0kHz",
                codec: "ALAC",
                tag: "",
            },
        );
        assert_eq!(stem, "03. Tune [ALAC] [24B-48.0kHz]");
    }

    #[test]
    fn badges_join_in_canonical_order() {
        let config = Config::default();
        assert_eq!(tag_badges(&config, true, "explicit"), "[M] [E]");
        assert_eq!(tag_badges(&config, false, "clean"), "[C]");
        assert_eq!(tag_badges(&config, false, ""), "");
    }
}
