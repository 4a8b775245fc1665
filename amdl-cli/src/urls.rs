//! Catalog URL classification.

use regex::Regex;
use url::Url;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Album,
    Song,
    Playlist,
    Station,
    MusicVideo,
    Artist,
}

#[derive(Debug, Clone)]
pub struct ClassifiedUrl {
    pub kind: UrlKind,
    pub storefront: String,
    pub id: String,
    /// `?i=<song_id>` on album URLs, used by single-song mode.
    pub track_hint: Option<String>,
}

fn capture(pattern: &str, input: &str) -> Option<(String, String)> {
    let re = Regex::new(pattern).expect("static regex");
    let caps = re.captures(input)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Match a catalog URL to its kind and extract `(storefront, id)`.
///
/// The path segment decides the kind; the storefront is the two-letter
/// country code; ids are numeric catalog ids, `pl.…` playlist ids, or
/// `ra.…` station ids. Unmatched input is [`Error::InvalidUrl`].
pub fn classify(input: &str) -> Result<ClassifiedUrl, Error> {
    let track_hint = Url::parse(input).ok().and_then(|u| {
        u.query_pairs()
            .find(|(k, _)| k == "i")
            .map(|(_, v)| v.into_owned())
    });

    let patterns: [(UrlKind, &str); 6] = [
        (
            UrlKind::MusicVideo,
            r"^(?:https://(?:beta\.music|music)\.apple\.com/(\w{2})(?:/music-video|/music-video/.+))/(?:id)?(\d[^\D]+)(?:$|\?)",
        ),
        (
            UrlKind::Song,
            r"^(?:https://(?:beta\.music|music|classical\.music)\.apple\.com/(\w{2})(?:/song|/song/.+))/(?:id)?(\d[^\D]+)(?:$|\?)",
        ),
        (
            UrlKind::Playlist,
            r"^(?:https://(?:beta\.music|music|classical\.music)\.apple\.com/(\w{2})(?:/playlist|/playlist/.+))/(?:id)?(pl\.[\w-]+)(?:$|\?)",
        ),
        (
            UrlKind::Station,
            r"^(?:https://(?:beta\.music|music)\.apple\.com/(\w{2})(?:/station|/station/.+))/(?:id)?(ra\.[\w-]+)(?:$|\?)",
        ),
        (
            UrlKind::Artist,
            r"^(?:https://(?:beta\.music|music|classical\.music)\.apple\.com/(\w{2})(?:/artist|/artist/.+))/(?:id)?(\d[^\D]+)(?:$|\?)",
        ),
        (
            UrlKind::Album,
            r"^(?:https://(?:beta\.music|music|classical\.music)\.apple\.com/(\w{2})(?:/album|/album/.+))/(?:id)?(\d[^\D]+)(?:$|\?)",
        ),
    ];

    for (kind, pattern) in patterns {
        let segment = match kind {
            UrlKind::MusicVideo => "/music-video/",
            UrlKind::Song => "/song/",
            UrlKind::Playlist => "/playlist/",
            UrlKind::Station => "/station/",
            UrlKind::Artist => "/artist/",
            UrlKind::Album => "/album/",
        };
        if !input.contains(segment) {
            continue;
        }
        if let Some((storefront, id)) = capture(pattern, input) {
            return Ok(ClassifiedUrl {
                kind,
                storefront,
                id,
                track_hint: track_hint.clone(),
            });
        }
    }

    Err(Error::InvalidUrl {
        input: input.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn album_with_track_hint() {
        let got =
            classify("https://music.apple.com/us/album/some-album/1712800685?i=1712800686")
                .unwrap();
        assert_eq!(got.kind, UrlKind::Album);
        assert_eq!(got.storefront, "us");
        assert_eq!(got.id, "1712800685");
        assert_eq!(got.track_hint.as_deref(), Some("1712800686"));
    }

    #[test]
    fn playlist_and_station_ids() {
        let got = classify(
            "https://music.apple.com/gb/playlist/todays-hits/pl.f4d106fed2bd41149aaacabb233eb5eb",
        )
        .unwrap();
        assert_eq!(got.kind, UrlKind::Playlist);
        assert_eq!(got.id, "pl.f4d106fed2bd41149aaacabb233eb5eb");

        let got = classify("https://music.apple.com/us/station/pure-pop/ra.686227166").unwrap();
        assert_eq!(got.kind, UrlKind::Station);
        assert_eq!(got.id, "ra.686227166");
    }

    #[test]
    fn music_video_beats_other_kinds() {
        let got =
            classify("https://music.apple.com/us/music-video/bad-blood/1713845538").unwrap();
        assert_eq!(got.kind, UrlKind::MusicVideo);
        assert_eq!(got.id, "1713845538");
    }

    #[test]
    fn classical_storefront_albums_match() {
        let got = classify("https://classical.music.apple.com/de/album/1713845538").unwrap();
        assert_eq!(got.kind, UrlKind::Album);
        assert_eq!(got.storefront, "de");
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            classify("https://example.com/album/123"),
            Err(Error::InvalidUrl { .. })
        ));
        assert!(matches!(
            classify("not a url"),
            Err(Error::InvalidUrl { .. })
        ));
    }
}
