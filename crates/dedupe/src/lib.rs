//! Playlist deduplication.
//!
//! Duplicates are collapsed in two stages: first by normalized ISRC
//! (isolated per track type), then by a fuzzy key of normalized
//! artist/title plus type and content rating, clustering entries whose
//! durations sit within a tolerance. Winners are chosen by release
//! priority (Album > EP > Single > Unknown), ties broken by the earliest
//! playlist position. Outputs preserve input order.

use std::collections::HashMap;

use ampapi::TrackData;

const DEFAULT_DURATION_TOLERANCE_MS: i64 = 2000;

const RANK_UNKNOWN: u8 = 0;
const RANK_SINGLE: u8 = 1;
const RANK_EP: u8 = 2;
const RANK_ALBUM: u8 = 3;

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub enabled: bool,
    pub duration_tolerance_ms: i64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_tolerance_ms: DEFAULT_DURATION_TOLERANCE_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupeResult {
    pub tracks: Vec<TrackData>,
    pub kept_indexes: Vec<usize>,
    pub removed_count: usize,
    pub dropped_to_kept: HashMap<usize, usize>,
}

#[derive(Debug, Clone, Copy)]
struct DurationEntry {
    idx: usize,
    duration: i64,
}

/// Deduplicate playlist tracks. Deterministic and order-preserving for
/// kept items; an ISRC-stage decision is never overridden by the fuzzy
/// fallback stage.
pub fn dedupe_tracks(tracks: &[TrackData], opts: Options) -> DedupeResult {
    let keep_all = || DedupeResult {
        tracks: tracks.to_vec(),
        kept_indexes: (0..tracks.len()).collect(),
        removed_count: 0,
        dropped_to_kept: HashMap::new(),
    };

    if tracks.is_empty() {
        return DedupeResult::default();
    }
    if !opts.enabled || tracks.len() == 1 {
        return keep_all();
    }

    let tolerance = if opts.duration_tolerance_ms > 0 {
        opts.duration_tolerance_ms
    } else {
        DEFAULT_DURATION_TOLERANCE_MS
    };

    let release_ranks: Vec<u8> = tracks.iter().map(release_rank).collect();
    let isrc_by_index: Vec<String> = tracks
        .iter()
        .map(|t| normalize_isrc(&t.attributes.isrc))
        .collect();

    let mut winner_by_index: Vec<usize> = (0..tracks.len()).collect();
    let mut dropped_to_kept: HashMap<usize, usize> = HashMap::new();

    // Stage 1: ISRC grouping, isolated per track type.
    let mut isrc_groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, track) in tracks.iter().enumerate() {
        if isrc_by_index[i].is_empty() {
            continue;
        }
        let key = format!(
            "{}|{}",
            track.kind.trim().to_lowercase(),
            isrc_by_index[i]
        );
        isrc_groups.entry(key).or_default().push(i);
    }
    for members in isrc_groups.values() {
        if members.len() < 2 {
            continue;
        }
        let mut winner = members[0];
        for &idx in &members[1..] {
            if better_candidate(idx, winner, &release_ranks) {
                winner = idx;
            }
        }
        for &idx in members {
            if idx != winner {
                winner_by_index[idx] = winner;
                dropped_to_kept.insert(idx, winner);
            }
        }
    }

    // Stage 2: fuzzy fallback for tracks without an ISRC.
    let mut fallback_groups: HashMap<(String, String, String, String), Vec<DurationEntry>> =
        HashMap::new();
    for (i, track) in tracks.iter().enumerate() {
        if !isrc_by_index[i].is_empty() {
            continue;
        }
        let duration = track.attributes.duration_in_millis;
        if duration <= 0 {
            continue;
        }
        let artist = normalize_text(&track.attributes.artist_name);
        let title = normalize_text(&track.attributes.name);
        if artist.is_empty() || title.is_empty() {
            continue;
        }
        let key = (
            track.kind.trim().to_lowercase(),
            track.attributes.content_rating.trim().to_lowercase(),
            artist,
            title,
        );
        fallback_groups
            .entry(key)
            .or_default()
            .push(DurationEntry { idx: i, duration });
    }

    for entries in fallback_groups.values_mut() {
        if entries.len() < 2 {
            continue;
        }
        entries.sort_by(|a, b| {
            a.duration
                .cmp(&b.duration)
                .then_with(|| a.idx.cmp(&b.idx))
        });

        let mut cluster: Vec<DurationEntry> = Vec::with_capacity(entries.len());
        let mut flush = |cluster: &mut Vec<DurationEntry>| {
            if cluster.len() >= 2 {
                let mut winner = cluster[0].idx;
                for entry in &cluster[1..] {
                    if better_candidate(entry.idx, winner, &release_ranks) {
                        winner = entry.idx;
                    }
                }
                for entry in cluster.iter() {
                    if entry.idx == winner {
                        continue;
                    }
                    // ISRC winner decisions stay authoritative.
                    if dropped_to_kept.contains_key(&entry.idx) {
                        continue;
                    }
                    winner_by_index[entry.idx] = winner;
                    dropped_to_kept.insert(entry.idx, winner);
                }
            }
            cluster.clear();
        };

        for entry in entries.iter().copied() {
            if let Some(last) = cluster.last().copied() {
                if (entry.duration - last.duration).abs() > tolerance {
                    flush(&mut cluster);
                }
            }
            cluster.push(entry);
        }
        flush(&mut cluster);
    }

    let kept_indexes: Vec<usize> = (0..tracks.len())
        .filter(|&i| winner_by_index[i] == i)
        .collect();
    let out: Vec<TrackData> = kept_indexes.iter().map(|&i| tracks[i].clone()).collect();
    let removed_count = tracks.len() - kept_indexes.len();

    DedupeResult {
        tracks: out,
        kept_indexes,
        removed_count,
        dropped_to_kept,
    }
}

fn better_candidate(left: usize, right: usize, release_ranks: &[u8]) -> bool {
    if release_ranks[left] != release_ranks[right] {
        return release_ranks[left] > release_ranks[right];
    }
    left < right
}

fn release_rank(track: &TrackData) -> u8 {
    let Some(album) = track.relationships.albums.data.first() else {
        return RANK_UNKNOWN;
    };
    let album = &album.attributes;
    let name = album.name.trim().to_lowercase();
    if album.is_single || name.contains("single") {
        return RANK_SINGLE;
    }
    if looks_like_ep_name(&name) {
        return RANK_EP;
    }
    if album.track_count > 0 {
        if album.track_count <= 3 {
            return RANK_SINGLE;
        }
        if album.track_count <= 6 {
            return RANK_EP;
        }
        return RANK_ALBUM;
    }
    RANK_UNKNOWN
}

fn looks_like_ep_name(lower_name: &str) -> bool {
    lower_name.contains(" ep")
        || lower_name.ends_with(" ep")
        || lower_name.contains("- ep")
        || lower_name.contains("(ep)")
        || lower_name.contains("[ep]")
}

fn normalize_isrc(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

fn normalize_text(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampapi::{AlbumData, TrackData};

    fn track(
        id: &str,
        kind: &str,
        isrc: &str,
        artist: &str,
        title: &str,
        rating: &str,
        duration: i64,
        album: Option<(&str, u32, bool)>,
    ) -> TrackData {
        let mut t = TrackData {
            id: id.to_string(),
            kind: kind.to_string(),
            ..Default::default()
        };
        t.attributes.isrc = isrc.to_string();
        t.attributes.artist_name = artist.to_string();
        t.attributes.name = title.to_string();
        t.attributes.content_rating = rating.to_string();
        t.attributes.duration_in_millis = duration;
        if let Some((name, track_count, is_single)) = album {
            let mut a = AlbumData::default();
            a.attributes.name = name.to_string();
            a.attributes.track_count = track_count;
            a.attributes.is_single = is_single;
            t.relationships.albums.data.push(a);
        }
        t
    }

    fn ids(result: &DedupeResult) -> Vec<String> {
        result.tracks.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn disabled_keeps_everything() {
        let tracks = vec![
            track("a", "songs", "X1", "a", "t", "", 1000, None),
            track("b", "songs", "X1", "a", "t", "", 1000, None),
        ];
        let result = dedupe_tracks(
            &tracks,
            Options {
                enabled: false,
                ..Options::default()
            },
        );
        assert_eq!(result.kept_indexes, vec![0, 1]);
        assert_eq!(result.removed_count, 0);
    }

    #[test]
    fn isrc_dedupe_prefers_album_over_single() {
        let tracks = vec![
            track(
                "single",
                "songs",
                "USRC17607839",
                "Artist",
                "Song",
                "",
                200_000,
                Some(("Song - Single", 1, true)),
            ),
            track(
                "album",
                "songs",
                "USRC17607839",
                "Artist",
                "Song",
                "",
                200_000,
                Some(("Full Album", 10, false)),
            ),
        ];
        let result = dedupe_tracks(&tracks, Options::default());
        assert_eq!(ids(&result), vec!["album"]);
        assert_eq!(result.removed_count, 1);
        assert_eq!(result.dropped_to_kept.get(&0), Some(&1));
    }

    #[test]
    fn fallback_merges_within_tolerance() {
        let tracks = vec![
            track(
                "single",
                "songs",
                "",
                "Artist",
                "Song",
                "",
                200_000,
                Some(("Song - Single", 1, true)),
            ),
            track(
                "album",
                "songs",
                "",
                "artist",
                "  song ",
                "",
                201_500,
                Some(("Full Album", 10, false)),
            ),
        ];
        let result = dedupe_tracks(&tracks, Options::default());
        assert_eq!(ids(&result), vec!["album"]);
        assert_eq!(result.removed_count, 1);
    }

    #[test]
    fn fallback_keeps_both_beyond_tolerance() {
        let tracks = vec![
            track("a", "songs", "", "Artist", "Song", "", 200_000, None),
            track("b", "songs", "", "Artist", "Song", "", 203_500, None),
        ];
        let result = dedupe_tracks(&tracks, Options::default());
        assert_eq!(result.kept_indexes, vec![0, 1]);
        assert_eq!(result.removed_count, 0);
    }

    #[test]
    fn cross_type_isrc_not_merged() {
        let tracks = vec![
            track("song", "songs", "X", "a", "t", "", 100_000, None),
            track("mv", "music-videos", "X", "a", "t", "", 100_000, None),
        ];
        let result = dedupe_tracks(&tracks, Options::default());
        assert_eq!(result.kept_indexes, vec![0, 1]);
    }

    #[test]
    fn rating_split_prevents_fallback_merge() {
        let tracks = vec![
            track("clean", "songs", "", "Artist", "Song", "clean", 200_000, None),
            track(
                "explicit",
                "songs",
                "",
                "Artist",
                "Song",
                "explicit",
                200_500,
                None,
            ),
        ];
        let result = dedupe_tracks(&tracks, Options::default());
        assert_eq!(result.removed_count, 0);
    }

    #[test]
    fn isrc_winner_not_overridden_by_fallback() {
        // The album copy wins its ISRC group; a later fuzzy cluster with a
        // different winner must not reassign the already-dropped single.
        let tracks = vec![
            track(
                "single",
                "songs",
                "SAME",
                "Artist",
                "Song",
                "",
                200_000,
                Some(("Song - Single", 1, true)),
            ),
            track(
                "album",
                "songs",
                "SAME",
                "Artist",
                "Song",
                "",
                200_000,
                Some(("Full Album", 10, false)),
            ),
        ];
        let result = dedupe_tracks(&tracks, Options::default());
        assert_eq!(result.dropped_to_kept.get(&0), Some(&1));
        assert_eq!(ids(&result), vec!["album"]);
    }

    #[test]
    fn counts_and_order_stay_consistent() {
        let tracks = vec![
            track("a", "songs", "ISRC1", "x", "one", "", 100_000, None),
            track("b", "songs", "", "y", "two", "", 150_000, None),
            track(
                "c",
                "songs",
                "isrc-1",
                "x",
                "one",
                "",
                100_000,
                Some(("Big Album", 12, false)),
            ),
            track("d", "songs", "", "y", "two", "", 151_000, None),
        ];
        let result = dedupe_tracks(&tracks, Options::default());
        assert_eq!(result.kept_indexes.len() + result.removed_count, 4);
        let mut sorted = result.kept_indexes.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, result.kept_indexes, "kept indexes ascending");
        // "c" wins the ISRC group (normalized isrc matches, higher rank);
        // "b" wins its duration cluster by earliest index.
        assert_eq!(ids(&result), vec!["b", "c"]);
    }
}
