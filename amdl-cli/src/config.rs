//! The `config.yaml` schema. Keys are kebab-case; unknown keys are
//! ignored so user configs can carry fields for other front-ends.

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub storefront: String,
    pub language: String,
    pub authorization_token: String,
    pub media_user_token: String,

    pub alac_save_folder: String,
    pub atmos_save_folder: String,
    pub aac_save_folder: String,
    pub artist_folder_format: String,
    pub album_folder_format: String,
    pub playlist_folder_format: String,
    pub song_file_format: String,
    pub limit_max: usize,

    pub cover_format: String,
    pub cover_size: String,
    pub save_cover_file: bool,
    pub embed_cover: bool,
    pub save_artist_cover: bool,
    pub save_animated_artwork: bool,
    pub emby_animated_artwork: bool,

    pub embed_lrc: bool,
    pub save_lrc_file: bool,
    pub lrc_type: String,
    pub lrc_format: String,

    pub apple_master_choice: String,
    pub explicit_choice: String,
    pub clean_choice: String,

    pub alac_max: i64,
    pub atmos_max: i64,
    pub aac_type: String,
    pub mv_audio_type: String,
    pub mv_max: i64,

    pub get_m3u8_mode: String,
    pub get_m3u8_from_device: bool,
    pub get_m3u8_port: String,
    pub decrypt_m3u8_port: String,

    pub use_song_info_for_playlist: bool,

    pub convert_after_download: bool,
    pub convert_format: String,
    pub convert_formats: Vec<String>,
    pub convert_keep_original: bool,
    pub convert_skip_if_source_match: bool,
    pub convert_skip_lossy_to_lossless: bool,
    pub convert_warn_lossy_to_lossless: bool,
    pub convert_extra_args: String,
    pub ffmpeg_path: String,
    pub alac_repair_mode: String,

    pub metadata_tags_m4a: Option<Vec<String>>,
    pub metadata_tags_flac: Option<Vec<String>>,
    pub metadata_custom_tag_rules: Vec<CustomTagRule>,
    pub metadata_atmos_prefix: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CustomTagRule {
    pub key: String,
    pub value: String,
    pub containers: Vec<String>,
    pub source_formats: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storefront: "us".to_string(),
            language: String::new(),
            authorization_token: String::new(),
            media_user_token: String::new(),

            alac_save_folder: "AM-DL downloads".to_string(),
            atmos_save_folder: "AM-DL-Atmos downloads".to_string(),
            aac_save_folder: "AM-DL-AAC downloads".to_string(),
            artist_folder_format: "{UrlArtistName}".to_string(),
            album_folder_format: "{AlbumName}".to_string(),
            playlist_folder_format: "{PlaylistName}".to_string(),
            song_file_format: "{SongNumer}. {SongName}".to_string(),
            limit_max: 200,

            cover_format: "jpg".to_string(),
            cover_size: "5000x5000".to_string(),
            save_cover_file: false,
            embed_cover: true,
            save_artist_cover: false,
            save_animated_artwork: false,
            emby_animated_artwork: false,

            embed_lrc: true,
            save_lrc_file: false,
            lrc_type: "lyrics".to_string(),
            lrc_format: "lrc".to_string(),

            apple_master_choice: "[M]".to_string(),
            explicit_choice: "[E]".to_string(),
            clean_choice: "[C]".to_string(),

            alac_max: 192_000,
            atmos_max: 2768,
            aac_type: "aac-lc".to_string(),
            mv_audio_type: "atmos".to_string(),
            mv_max: 2160,

            get_m3u8_mode: "hires".to_string(),
            get_m3u8_from_device: true,
            get_m3u8_port: "127.0.0.1:20020".to_string(),
            decrypt_m3u8_port: "127.0.0.1:10020".to_string(),

            use_song_info_for_playlist: false,

            convert_after_download: false,
            convert_format: String::new(),
            convert_formats: Vec::new(),
            convert_keep_original: false,
            convert_skip_if_source_match: true,
            convert_skip_lossy_to_lossless: false,
            convert_warn_lossy_to_lossless: true,
            convert_extra_args: String::new(),
            ffmpeg_path: String::new(),
            alac_repair_mode: "all".to_string(),

            metadata_tags_m4a: None,
            metadata_tags_flac: None,
            metadata_custom_tag_rules: Vec::new(),
            metadata_atmos_prefix: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            reason: format!("cannot read {path}: {e}"),
        })?;
        let mut config: Config = serde_yaml::from_str(&raw).map_err(|e| Error::Config {
            reason: format!("cannot parse {path}: {e}"),
        })?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        if self.storefront.len() != 2 {
            self.storefront = "us".to_string();
        }
        if self.alac_repair_mode.trim().is_empty() {
            self.alac_repair_mode = "all".to_string();
        }
    }

    /// Default set of source formats converted when `convert-formats` is
    /// left empty.
    pub fn convert_formats_or_default(&self) -> Vec<String> {
        if self.convert_formats.is_empty() {
            vec![
                "lossless".to_string(),
                "hires".to_string(),
                "aac".to_string(),
            ]
        } else {
            self.convert_formats.clone()
        }
    }

    pub fn metadata_atmos_prefix_enabled(&self) -> bool {
        self.metadata_atmos_prefix.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.storefront, "us");
        assert_eq!(config.alac_max, 192_000);
        assert_eq!(config.alac_repair_mode, "all");
        assert!(config.metadata_atmos_prefix_enabled());
        assert_eq!(
            config.convert_formats_or_default(),
            vec!["lossless", "hires", "aac"]
        );
    }

    #[test]
    fn yaml_round_trip_with_kebab_keys() {
        let yaml = r#"
storefront: gb
alac-max: 96000
get-m3u8-mode: all
media-user-token: "abc"
metadata-custom-tag-rules:
  - key: COMMENT
    value: ripped
    containers: [m4a]
    source-formats: [lossless, hires]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storefront, "gb");
        assert_eq!(config.alac_max, 96_000);
        assert_eq!(config.get_m3u8_mode, "all");
        assert_eq!(config.metadata_custom_tag_rules.len(), 1);
        assert_eq!(config.metadata_custom_tag_rules[0].key, "COMMENT");
    }

    #[test]
    fn bad_storefront_falls_back_to_us() {
        let mut config = Config {
            storefront: "gbr".to_string(),
            ..Config::default()
        };
        config.normalize();
        assert_eq!(config.storefront, "us");
    }
}
