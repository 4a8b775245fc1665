use m3u8_rs::{AlternativeMediaType, MasterPlaylist};
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::error::PickError;

/// Audio group priority for a music video, parameterized by the
/// configured audio type.
pub fn mv_audio_priority(audio_type: &str) -> &'static [&'static str] {
    match audio_type {
        "ac3" => &["audio-ac3", "audio-stereo-256"],
        "aac" => &["audio-stereo-256"],
        _ => &["audio-atmos", "audio-ac3", "audio-stereo-256"],
    }
}

/// Pick the highest-resolution video variant whose height does not exceed
/// `max_height`, after sorting by average bandwidth descending. Heights
/// are read from the `_<w>x<h>` URI token.
pub fn pick_mv_video(
    master: &MasterPlaylist,
    base: &Url,
    max_height: i64,
) -> Result<(String, String), PickError> {
    let size_re = Regex::new(r"_(\d+)x(\d+)").expect("static regex");
    let mut variants: Vec<_> = master.variants.iter().collect();
    variants.sort_by(|a, b| {
        b.average_bandwidth
            .unwrap_or(0)
            .cmp(&a.average_bandwidth.unwrap_or(0))
    });

    for variant in variants {
        let Some(caps) = size_re.captures(&variant.uri) else {
            continue;
        };
        let Ok(height) = caps[2].parse::<i64>() else {
            continue;
        };
        if height <= max_height {
            let url = base
                .join(&variant.uri)
                .map_err(|e| PickError::invalid_url(&variant.uri, e.to_string()))?;
            let label = variant
                .resolution
                .map(|r| format!("{}x{}", r.width, r.height))
                .unwrap_or_else(|| format!("{}p", height));
            debug!(uri = %variant.uri, height, "selected MV video variant");
            return Ok((url.to_string(), label));
        }
    }
    Err(PickError::NoVideoStream)
}

/// Pick the music-video audio rendition: walk the group priority list in
/// order and, within the first group that has candidates, take the
/// highest `_gr<N>_` URI.
pub fn pick_mv_audio(
    master: &MasterPlaylist,
    base: &Url,
    audio_type: &str,
) -> Result<(String, String), PickError> {
    let rank_re = Regex::new(r"_gr(\d+)_").expect("static regex");

    for priority in mv_audio_priority(audio_type) {
        let mut best: Option<(i64, &str)> = None;
        for alternative in &master.alternatives {
            if alternative.media_type != AlternativeMediaType::Audio {
                continue;
            }
            if alternative.group_id != *priority {
                continue;
            }
            let Some(uri) = alternative.uri.as_deref() else {
                continue;
            };
            let Some(caps) = rank_re.captures(uri) else {
                continue;
            };
            let Ok(rank) = caps[1].parse::<i64>() else {
                continue;
            };
            if best.is_none_or(|(r, _)| rank > r) {
                best = Some((rank, uri));
            }
        }
        if let Some((rank, uri)) = best {
            let url = base
                .join(uri)
                .map_err(|e| PickError::invalid_url(uri, e.to_string()))?;
            debug!(group = *priority, rank, "selected MV audio rendition");
            return Ok((url.to_string(), priority.to_string()));
        }
    }
    Err(PickError::NoAudioStream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::Playlist;

    const MV_MASTER: &str = r#"#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="audio-stereo-256",NAME="stereo",URI="audio_gr256_stereo.m3u8"
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="audio-atmos",NAME="atmos-low",URI="audio_gr1536_atmos.m3u8"
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="audio-atmos",NAME="atmos-high",URI="audio_gr2448_atmos.m3u8"
#EXT-X-STREAM-INF:BANDWIDTH=20000000,AVERAGE-BANDWIDTH=18000000,CODECS="hvc1",AUDIO="audio-atmos"
video_3840x2160.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=8000000,AVERAGE-BANDWIDTH=7500000,CODECS="avc1",AUDIO="audio-atmos"
video_1920x1080.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=4000000,AVERAGE-BANDWIDTH=3600000,CODECS="avc1",AUDIO="audio-stereo-256"
video_1280x720.m3u8
"#;

    fn master() -> (MasterPlaylist, Url) {
        let playlist = match m3u8_rs::parse_playlist_res(MV_MASTER.as_bytes()) {
            Ok(Playlist::MasterPlaylist(pl)) => pl,
            other => panic!("not a master playlist: {other:?}"),
        };
        (playlist, Url::parse("https://example.com/mv/").unwrap())
    }

    #[test]
    fn video_respects_height_cap() {
        let (pl, base) = master();
        let (url, _) = pick_mv_video(&pl, &base, 2160).unwrap();
        assert_eq!(url, "https://example.com/mv/video_3840x2160.m3u8");

        let (url, _) = pick_mv_video(&pl, &base, 1080).unwrap();
        assert_eq!(url, "https://example.com/mv/video_1920x1080.m3u8");
    }

    #[test]
    fn audio_takes_highest_rank_in_first_available_group() {
        let (pl, base) = master();
        let (url, group) = pick_mv_audio(&pl, &base, "atmos").unwrap();
        assert_eq!(url, "https://example.com/mv/audio_gr2448_atmos.m3u8");
        assert_eq!(group, "audio-atmos");
    }

    #[test]
    fn audio_priority_skips_missing_groups() {
        let (pl, base) = master();
        // No audio-ac3 group in the manifest; ac3 preference falls through
        // to stereo.
        let (url, group) = pick_mv_audio(&pl, &base, "ac3").unwrap();
        assert_eq!(url, "https://example.com/mv/audio_gr256_stereo.m3u8");
        assert_eq!(group, "audio-stereo-256");
    }

    #[test]
    fn missing_everything_is_an_error() {
        let (pl, base) = master();
        assert!(matches!(
            pick_mv_video(&pl, &base, 100),
            Err(PickError::NoVideoStream)
        ));
    }
}
