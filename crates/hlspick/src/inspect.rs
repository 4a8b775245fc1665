use m3u8_rs::MasterPlaylist;

/// One debug table row per variant.
#[derive(Debug, Clone)]
pub struct VariantRow {
    pub codecs: String,
    pub audio: String,
    pub bandwidth: u64,
}

pub fn variant_rows(master: &MasterPlaylist) -> Vec<VariantRow> {
    let mut variants: Vec<_> = master.variants.iter().collect();
    variants.sort_by(|a, b| {
        b.average_bandwidth
            .unwrap_or(0)
            .cmp(&a.average_bandwidth.unwrap_or(0))
    });
    variants
        .iter()
        .map(|v| VariantRow {
            codecs: v.codecs.clone().unwrap_or_default(),
            audio: v.audio.clone().unwrap_or_default(),
            bandwidth: v.bandwidth,
        })
        .collect()
}

/// Best available quality per format family, for the debug summary.
#[derive(Debug, Clone, Default)]
pub struct FormatSummary {
    pub aac: Option<String>,
    pub lossless: Option<String>,
    pub hires: Option<String>,
    pub atmos: Option<String>,
    pub dolby_audio: Option<String>,
}

/// Tabulate every format family present in a master playlist with its
/// best bitrate or bit-depth/sample-rate.
pub fn inspect_formats(master: &MasterPlaylist) -> FormatSummary {
    let mut summary = FormatSummary::default();
    let mut best_aac = 0i64;
    let mut best_atmos = 0i64;

    for variant in &master.variants {
        let codecs = variant.codecs.as_deref().unwrap_or("");
        let audio = variant.audio.as_deref().unwrap_or("");
        let split: Vec<&str> = audio.split('-').collect();
        match codecs {
            "mp4a.40.2" => {
                if split.len() >= 3
                    && let Ok(bitrate) = split[2].parse::<i64>()
                    && bitrate > best_aac
                {
                    best_aac = bitrate;
                    summary.aac = Some(format!("AAC | 2 Channel | {bitrate} Kbps"));
                }
            }
            "ec-3" if audio.to_lowercase().contains("atmos") => {
                let Some(&token) = split.last() else { continue };
                // Upstream quirk: 4-digit descriptors starting with '2'
                // drop the leading marker digit. Preserved as-is; flagged
                // for review.
                let token = if token.len() == 4 && token.starts_with('2') {
                    &token[1..]
                } else {
                    token
                };
                if let Ok(bitrate) = token.parse::<i64>()
                    && bitrate > best_atmos
                {
                    best_atmos = bitrate;
                    summary.atmos = Some(format!("E-AC-3 | 16 Channel | {bitrate} Kbps"));
                }
            }
            "alac" => {
                if split.len() >= 3
                    && let (Ok(sample_rate), Some(&bit_depth)) =
                        (split[split.len() - 2].parse::<i64>(), split.last())
                {
                    let label = format!(
                        "ALAC | 2 Channel | {bit_depth}-bit/{} kHz",
                        sample_rate / 1000
                    );
                    if sample_rate > 48_000 {
                        summary.hires = Some(label);
                    } else {
                        summary.lossless = Some(label);
                    }
                }
            }
            "ac-3" => {
                if let Some(&token) = split.last()
                    && let Ok(bitrate) = token.parse::<i64>()
                {
                    summary.dolby_audio = Some(format!("AC-3 | 16 Channel | {bitrate} Kbps"));
                }
            }
            _ => {}
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::Playlist;

    const MASTER: &str = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2823000,AVERAGE-BANDWIDTH=2768000,CODECS="ec-3",AUDIO="audio-atmos-2768"
atmos.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=4500000,AVERAGE-BANDWIDTH=4320000,CODECS="alac",AUDIO="audio-alac-stereo-96000-24"
alac96.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1700000,AVERAGE-BANDWIDTH=1650000,CODECS="alac",AUDIO="audio-alac-stereo-44100-16"
alac44.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=289000,AVERAGE-BANDWIDTH=265000,CODECS="mp4a.40.2",AUDIO="audio-stereo-256"
aac.m3u8
"#;

    fn master() -> MasterPlaylist {
        match m3u8_rs::parse_playlist_res(MASTER.as_bytes()) {
            Ok(Playlist::MasterPlaylist(pl)) => pl,
            other => panic!("not a master playlist: {other:?}"),
        }
    }

    #[test]
    fn summary_covers_all_families() {
        let summary = inspect_formats(&master());
        assert_eq!(summary.aac.as_deref(), Some("AAC | 2 Channel | 256 Kbps"));
        assert_eq!(
            summary.hires.as_deref(),
            Some("ALAC | 2 Channel | 24-bit/96 kHz")
        );
        assert_eq!(
            summary.lossless.as_deref(),
            Some("ALAC | 2 Channel | 16-bit/44 kHz")
        );
        // The 4-digit "2768" descriptor sheds its leading marker digit.
        assert_eq!(
            summary.atmos.as_deref(),
            Some("E-AC-3 | 16 Channel | 768 Kbps")
        );
        assert!(summary.dolby_audio.is_none());
    }

    #[test]
    fn rows_sort_by_average_bandwidth() {
        let rows = variant_rows(&master());
        assert_eq!(rows[0].audio, "audio-alac-stereo-96000-24");
        assert_eq!(rows.last().unwrap().audio, "audio-stereo-256");
    }
}
