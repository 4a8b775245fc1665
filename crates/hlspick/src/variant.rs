use m3u8_rs::{MasterPlaylist, Playlist, VariantStream};
use regex::Regex;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::PickError;
use crate::fetch::{fetch_master, fetch_playlist_text};

/// Sentinel encryption-key URI marking a web playlist that can only be
/// decrypted with a device-sourced playlist. Magic literal copied from
/// upstream; its stability is not guaranteed.
pub const PREFETCH_KEY_URI: &str = "skd://itunes.apple.com/P000000000/s1/e1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Alac,
    Aac,
    Atmos,
}

#[derive(Debug, Clone)]
pub struct SelectionCaps {
    /// Maximum ALAC sample rate in Hz.
    pub alac_max: i64,
    /// Maximum Atmos descriptor bitrate token.
    pub atmos_max: i64,
    /// Requested AAC flavor: `aac`, `aac-binaural`, or `aac-downmix`.
    pub aac_type: String,
}

#[derive(Debug, Clone)]
pub struct SelectedVariant {
    pub url: String,
    pub quality: String,
    pub audio_descriptor: String,
}

fn sorted_by_average_bandwidth(master: &MasterPlaylist) -> Vec<&VariantStream> {
    let mut variants: Vec<&VariantStream> = master.variants.iter().collect();
    variants.sort_by(|a, b| {
        b.average_bandwidth
            .unwrap_or(0)
            .cmp(&a.average_bandwidth.unwrap_or(0))
    });
    variants
}

fn codec(variant: &VariantStream) -> &str {
    variant.codecs.as_deref().unwrap_or("")
}

fn audio(variant: &VariantStream) -> &str {
    variant.audio.as_deref().unwrap_or("")
}

fn join(base: &Url, uri: &str) -> Result<String, PickError> {
    base.join(uri)
        .map(|u| u.to_string())
        .map_err(|e| PickError::invalid_url(uri, e.to_string()))
}

/// Select one variant from a master playlist per the active mode.
///
/// Variants are walked in descending average-bandwidth order; the first
/// one passing the mode's filter wins. Atmos mode accepts a capped
/// `ec-3 … atmos` descriptor and falls back to plain `ac-3` Dolby Audio.
pub fn select_variant(
    master: &MasterPlaylist,
    base: &Url,
    mode: SelectionMode,
    caps: &SelectionCaps,
) -> Result<SelectedVariant, PickError> {
    for variant in sorted_by_average_bandwidth(master) {
        let descriptor = audio(variant);
        match mode {
            SelectionMode::Atmos => {
                if codec(variant) == "ec-3" && descriptor.to_lowercase().contains("atmos") {
                    let bitrate_token = descriptor.rsplit('-').next().unwrap_or("");
                    let bitrate: i64 =
                        bitrate_token
                            .parse()
                            .map_err(|_| PickError::BadAudioDescriptor {
                                descriptor: descriptor.to_string(),
                            })?;
                    if bitrate <= caps.atmos_max {
                        debug!(descriptor, bitrate, "selected Atmos variant");
                        return Ok(SelectedVariant {
                            url: join(base, &variant.uri)?,
                            quality: format!("{bitrate_token} Kbps"),
                            audio_descriptor: descriptor.to_string(),
                        });
                    }
                } else if codec(variant) == "ac-3" {
                    let bitrate_token = descriptor.rsplit('-').next().unwrap_or("");
                    debug!(descriptor, "selected Dolby Audio variant");
                    return Ok(SelectedVariant {
                        url: join(base, &variant.uri)?,
                        quality: format!("{bitrate_token} Kbps"),
                        audio_descriptor: descriptor.to_string(),
                    });
                }
            }
            SelectionMode::Aac => {
                if codec(variant) == "mp4a.40.2" {
                    let stereo_re = Regex::new(r"audio-stereo-\d+").expect("static regex");
                    let flavor = stereo_re.replace_all(descriptor, "aac");
                    if flavor == caps.aac_type {
                        let split: Vec<&str> = descriptor.split('-').collect();
                        let kbps = split.get(2).copied().unwrap_or("");
                        debug!(descriptor, "selected AAC variant");
                        return Ok(SelectedVariant {
                            url: join(base, &variant.uri)?,
                            quality: format!("{kbps} Kbps"),
                            audio_descriptor: descriptor.to_string(),
                        });
                    }
                }
            }
            SelectionMode::Alac => {
                if codec(variant) == "alac" {
                    let split: Vec<&str> = descriptor.split('-').collect();
                    if split.len() < 2 {
                        return Err(PickError::BadAudioDescriptor {
                            descriptor: descriptor.to_string(),
                        });
                    }
                    let sample_rate: i64 = split[split.len() - 2].parse().map_err(|_| {
                        PickError::BadAudioDescriptor {
                            descriptor: descriptor.to_string(),
                        }
                    })?;
                    if sample_rate <= caps.alac_max {
                        let bit_depth = split[split.len() - 1];
                        let khz = sample_rate as f64 / 1000.0;
                        debug!(descriptor, sample_rate, "selected ALAC variant");
                        return Ok(SelectedVariant {
                            url: join(base, &variant.uri)?,
                            quality: format!("{bit_depth}B-{khz:.1}kHz"),
                            audio_descriptor: descriptor.to_string(),
                        });
                    }
                }
            }
        }
    }
    Err(PickError::NoCodec)
}

/// A quality label is hi-res when its sample-rate component exceeds 48 kHz.
pub fn is_hires_quality(quality: &str) -> bool {
    let Some(last) = quality.split('-').next_back() else {
        return false;
    };
    let trimmed = last.trim().trim_end_matches("kHz").trim();
    trimmed.parse::<f64>().map(|v| v > 48.0).unwrap_or(false)
}

/// Probe a web master playlist for an `ec-3 … atmos` variant.
pub async fn has_atmos_variant(client: &Client, url: &str) -> Result<bool, PickError> {
    let (master, _) = fetch_master(client, url).await?;
    Ok(master.variants.iter().any(|v| {
        codec(v) == "ec-3" && audio(v).to_lowercase().contains("atmos")
    }))
}

/// Fetch a media playlist and check whether any segment is keyed with the
/// prefetch sentinel, making the web playlist undecryptable.
pub async fn media_playlist_has_prefetch_key(
    client: &Client,
    media_url: &str,
) -> Result<bool, PickError> {
    let body = fetch_playlist_text(client, media_url).await?;
    let playlist = match m3u8_rs::parse_playlist_res(body.as_bytes()) {
        Ok(Playlist::MediaPlaylist(pl)) => pl,
        Ok(Playlist::MasterPlaylist(_)) => return Err(PickError::NotMedia),
        Err(e) => return Err(PickError::parse(e.to_string())),
    };
    Ok(playlist.segments.iter().any(|segment| {
        segment
            .key
            .as_ref()
            .and_then(|k| k.uri.as_deref())
            .is_some_and(|uri| uri == PREFETCH_KEY_URI)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2823000,AVERAGE-BANDWIDTH=2768000,CODECS="ec-3",AUDIO="audio-atmos-2768"
atmos_2768.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1000000,AVERAGE-BANDWIDTH=980000,CODECS="ac-3",AUDIO="audio-ac3-640"
ac3_640.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=4500000,AVERAGE-BANDWIDTH=4320000,CODECS="alac",AUDIO="audio-alac-stereo-96000-24"
alac_96.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1700000,AVERAGE-BANDWIDTH=1650000,CODECS="alac",AUDIO="audio-alac-stereo-44100-16"
alac_44.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=289000,AVERAGE-BANDWIDTH=265000,CODECS="mp4a.40.2",AUDIO="audio-stereo-256"
aac_256.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=289000,AVERAGE-BANDWIDTH=264000,CODECS="mp4a.40.2",AUDIO="audio-stereo-256-binaural"
aac_binaural.m3u8
"#;

    fn master() -> (MasterPlaylist, Url) {
        let playlist = match m3u8_rs::parse_playlist_res(MASTER.as_bytes()) {
            Ok(Playlist::MasterPlaylist(pl)) => pl,
            other => panic!("not a master playlist: {other:?}"),
        };
        (playlist, Url::parse("https://example.com/audio/").unwrap())
    }

    fn caps() -> SelectionCaps {
        SelectionCaps {
            alac_max: 192_000,
            atmos_max: 2768,
            aac_type: "aac".to_string(),
        }
    }

    #[test]
    fn alac_picks_highest_capped_sample_rate() {
        let (pl, base) = master();
        let picked = select_variant(&pl, &base, SelectionMode::Alac, &caps()).unwrap();
        assert_eq!(picked.url, "https://example.com/audio/alac_96.m3u8");
        assert_eq!(picked.quality, "24B-96.0kHz");
    }

    #[test]
    fn alac_cap_falls_through_to_lower_rate() {
        let (pl, base) = master();
        let capped = SelectionCaps {
            alac_max: 48_000,
            ..caps()
        };
        let picked = select_variant(&pl, &base, SelectionMode::Alac, &capped).unwrap();
        assert_eq!(picked.url, "https://example.com/audio/alac_44.m3u8");
        assert_eq!(picked.quality, "16B-44.1kHz");
    }

    #[test]
    fn atmos_picks_capped_ec3() {
        let (pl, base) = master();
        let picked = select_variant(&pl, &base, SelectionMode::Atmos, &caps()).unwrap();
        assert_eq!(picked.url, "https://example.com/audio/atmos_2768.m3u8");
        assert_eq!(picked.quality, "2768 Kbps");
    }

    #[test]
    fn atmos_over_cap_falls_back_to_dolby_audio() {
        let (pl, base) = master();
        let capped = SelectionCaps {
            atmos_max: 2000,
            ..caps()
        };
        let picked = select_variant(&pl, &base, SelectionMode::Atmos, &capped).unwrap();
        assert_eq!(picked.url, "https://example.com/audio/ac3_640.m3u8");
        assert_eq!(picked.quality, "640 Kbps");
    }

    #[test]
    fn aac_flavor_match_is_exact() {
        let (pl, base) = master();
        let picked = select_variant(&pl, &base, SelectionMode::Aac, &caps()).unwrap();
        assert_eq!(picked.url, "https://example.com/audio/aac_256.m3u8");
        assert_eq!(picked.quality, "256 Kbps");

        let binaural = SelectionCaps {
            aac_type: "aac-binaural".to_string(),
            ..caps()
        };
        let picked = select_variant(&pl, &base, SelectionMode::Aac, &binaural).unwrap();
        assert_eq!(picked.url, "https://example.com/audio/aac_binaural.m3u8");
    }

    #[test]
    fn no_match_yields_no_codec() {
        let (pl, base) = master();
        let impossible = SelectionCaps {
            aac_type: "aac-nonexistent".to_string(),
            ..caps()
        };
        let err = select_variant(&pl, &base, SelectionMode::Aac, &impossible).unwrap_err();
        assert!(matches!(err, PickError::NoCodec));
    }

    #[test]
    fn hires_threshold_sits_above_48khz() {
        assert!(is_hires_quality("24B-96.0kHz"));
        assert!(is_hires_quality("24B-88.2kHz"));
        assert!(!is_hires_quality("24B-48.0kHz"));
        assert!(!is_hires_quality("16B-44.1kHz"));
        assert!(!is_hires_quality("256 Kbps"));
    }
}
