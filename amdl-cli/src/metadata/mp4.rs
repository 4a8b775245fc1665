//! MP4 tag assembly and writing.
//!
//! The tag object is built from the active m4a tag set, then written into
//! the container in place (preserving the cover embedded by the
//! packager). Playlist and station items are tagged either with playlist
//! positioning or with the resolved album's real numbering, depending on
//! configuration.

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};

use crate::config::Config;
use crate::context::RunContext;
use crate::error::Error;
use crate::layout::{detect_metadata_release_type, detect_release_type};
use crate::metadata::names::{
    artists_from_field, composers_from_field, format_artist_list, format_composer_list,
    normalized_names, primary_artist, strip_featured_from_title, with_atmos_prefix,
};
use crate::metadata::policy::MetadataPolicy;
use crate::model::Track;

/// Track artists: relationship data wins; the flat `artistName` field is
/// split on separators otherwise.
pub fn artist_names(track: &Track) -> Vec<String> {
    let names: Vec<String> = track
        .resp
        .relationships
        .artists
        .data
        .iter()
        .map(|a| a.attributes.name.clone())
        .collect();
    let names = normalized_names(names);
    if !names.is_empty() {
        return names;
    }
    artists_from_field(&track.resp.attributes.artist_name)
}

pub fn album_artist_names(track: &Track) -> Vec<String> {
    if let Some(album) = &track.album {
        let names: Vec<String> = album
            .relationships
            .artists
            .data
            .iter()
            .map(|a| a.attributes.name.clone())
            .collect();
        let names = normalized_names(names);
        if !names.is_empty() {
            return names;
        }
        if !album.attributes.artist_name.is_empty() {
            return artists_from_field(&album.attributes.artist_name);
        }
    }
    if let Some(album_rel) = track.resp.relationships.albums.data.first()
        && !album_rel.attributes.artist_name.is_empty()
    {
        return artists_from_field(&album_rel.attributes.artist_name);
    }
    artists_from_field(&track.resp.attributes.artist_name)
}

/// The cleaned title plus the full track-artist list with featured names
/// folded in (deduplicated, first-seen order).
pub fn title_and_artists(track: &Track) -> (String, Vec<String>) {
    let (clean_title, featured) = strip_featured_from_title(&track.resp.attributes.name);
    let mut names = artist_names(track);
    if !featured.is_empty() {
        names.extend(featured);
        names = normalized_names(names);
    }
    (clean_title, names)
}

pub fn album_id_for(track: &Track) -> String {
    if track.pre_type == "albums" && !track.pre_id.is_empty() {
        return track.pre_id.clone();
    }
    track
        .resp
        .relationships
        .albums
        .data
        .first()
        .map(|a| a.id.clone())
        .unwrap_or_default()
}

pub fn album_name_for(track: &Track) -> String {
    if let Some(album) = &track.album
        && !album.id.is_empty()
    {
        return album.attributes.name.clone();
    }
    if !track.resp.attributes.album_name.is_empty() {
        return track.resp.attributes.album_name.clone();
    }
    track
        .resp
        .relationships
        .albums
        .data
        .first()
        .map(|a| a.attributes.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown Album".to_string())
}

pub fn album_artist_for(track: &Track) -> String {
    if let Some(album) = &track.album
        && !album.id.is_empty()
    {
        return album.attributes.artist_name.clone();
    }
    if let Some(album_rel) = track.resp.relationships.albums.data.first()
        && !album_rel.attributes.artist_name.is_empty()
    {
        return album_rel.attributes.artist_name.clone();
    }
    if !track.resp.attributes.artist_name.is_empty() {
        return track.resp.attributes.artist_name.clone();
    }
    "Unknown Artist".to_string()
}

/// Folder-style release type for history lines.
pub fn release_type_for(track: &Track) -> &'static str {
    if let Some(album) = &track.album
        && !album.id.is_empty()
    {
        return detect_release_type(
            &album.attributes.name,
            album.attributes.track_count,
            album.attributes.is_single,
        );
    }
    if let Some(album_rel) = track.resp.relationships.albums.data.first() {
        return detect_release_type(
            &album_rel.attributes.name,
            album_rel.attributes.track_count,
            album_rel.attributes.is_single,
        );
    }
    "Albums"
}

/// Metadata-style release type (single/ep/album/compilation/mixtape).
pub fn metadata_release_type_for(track: &Track) -> &'static str {
    if let Some(album) = &track.album
        && !album.id.is_empty()
    {
        return detect_metadata_release_type(
            &album.attributes.name,
            album.attributes.track_count,
            album.attributes.is_single,
            album.attributes.is_compilation,
        );
    }
    if let Some(album_rel) = track.resp.relationships.albums.data.first() {
        return detect_metadata_release_type(
            &album_rel.attributes.name,
            album_rel.attributes.track_count,
            album_rel.attributes.is_single,
            album_rel.attributes.is_compilation,
        );
    }
    detect_metadata_release_type(&track.resp.attributes.album_name, 0, false, false)
}

/// The Atmos prefix applies when the policy enables it and either the
/// active source format or the track's resolved codec is Atmos.
pub fn should_use_atmos_prefix(policy: &MetadataPolicy, track: &Track) -> bool {
    if !policy.atmos_prefix_enabled {
        return false;
    }
    policy.source_format == "atmos" || track.codec.eq_ignore_ascii_case("ATMOS")
}

/// Build the MP4 tag object per the active m4a tag set.
pub fn build_tag(config: &Config, policy: &MetadataPolicy, track: &Track, lrc: &str) -> Result<Tag, Error> {
    let (mut title, title_artists) = title_and_artists(track);
    if title.is_empty() {
        title = track.resp.attributes.name.clone();
    }
    let use_prefix = should_use_atmos_prefix(policy, track);
    let tag_title = with_atmos_prefix(&title, use_prefix);
    let album_name = with_atmos_prefix(&track.resp.attributes.album_name, use_prefix);

    let mut composer_list = format_composer_list(&track.resp.attributes.composer_name);
    if composer_list.is_empty() {
        composer_list = track.resp.attributes.composer_name.trim().to_string();
    }
    let mut track_artist_list = format_artist_list(&title_artists);
    if track_artist_list.is_empty() {
        track_artist_list = format_artist_list(&artist_names(track));
        if track_artist_list.is_empty() {
            track_artist_list = track.resp.attributes.artist_name.clone();
        }
    }
    let mut album_artist_name = primary_artist(&album_artist_names(track));
    if album_artist_name.is_empty() {
        album_artist_name = track.resp.attributes.artist_name.clone();
    }
    let track_number = track.effective_track_number() as u32;

    let mut tag = Tag::new(lofty::tag::TagType::Mp4Ilst);

    if policy.m4a("title") {
        tag.set_title(tag_title.clone());
    }
    if policy.m4a("title_sort") {
        tag.insert_text(ItemKey::TrackTitleSortOrder, tag_title.clone());
    }
    if policy.m4a("artist") {
        tag.set_artist(track_artist_list.clone());
    }
    if policy.m4a("artist_sort") {
        tag.insert_text(ItemKey::TrackArtistSortOrder, track_artist_list.clone());
    }
    if policy.m4a("composer") && !composer_list.is_empty() {
        tag.insert_text(ItemKey::Composer, composer_list.clone());
    }
    if policy.m4a("composer_sort") && !composer_list.is_empty() {
        tag.insert_text(ItemKey::ComposerSortOrder, composer_list.clone());
    }
    if policy.m4a("genre")
        && let Some(genre) = track.resp.attributes.genre_names.first()
    {
        tag.set_genre(genre.clone());
    }
    if policy.m4a("lyrics") && !lrc.is_empty() {
        tag.insert_text(ItemKey::Lyrics, lrc.to_string());
    }
    if policy.m4a("track_number") {
        tag.set_track(track_number);
    }
    if policy.m4a("disc_number") {
        tag.set_disk(track.resp.attributes.disc_number);
    }
    if policy.m4a("album") {
        tag.set_album(album_name.clone());
    }
    if policy.m4a("album_sort") {
        tag.insert_text(ItemKey::AlbumTitleSortOrder, album_name.clone());
    }
    if policy.m4a("performer") && !track_artist_list.is_empty() {
        tag.insert_text(
            ItemKey::Unknown("PERFORMER".to_string()),
            track_artist_list.clone(),
        );
    }
    if policy.m4a("release_type") {
        let release_type = metadata_release_type_for(track);
        if !release_type.is_empty() {
            tag.insert_text(
                ItemKey::Unknown("RELEASETYPE".to_string()),
                release_type.to_string(),
            );
        }
    }
    if policy.m4a("isrc") && !track.resp.attributes.isrc.is_empty() {
        tag.insert_text(ItemKey::Isrc, track.resp.attributes.isrc.clone());
    }

    if policy.m4a("itunes_album_id") && track.pre_type == "albums" {
        let album_id: u32 = track
            .pre_id
            .parse()
            .map_err(|_| Error::tag_write(format!("album id {} is not a u32", track.pre_id)))?;
        tag.insert_text(
            ItemKey::Unknown("ITUNESALBUMID".to_string()),
            album_id.to_string(),
        );
    }
    if policy.m4a("itunes_artist_id")
        && let Some(artist) = track.resp.relationships.artists.data.first()
    {
        let artist_id: u32 = artist
            .id
            .parse()
            .map_err(|_| Error::tag_write(format!("artist id {} is not a u32", artist.id)))?;
        tag.insert_text(
            ItemKey::Unknown("ITUNESARTISTID".to_string()),
            artist_id.to_string(),
        );
    }

    let from_collection = track.pre_type == "playlists" || track.pre_type == "stations";
    if from_collection && !config.use_song_info_for_playlist {
        // Playlist positioning: one synthetic disc, playlist as album.
        if policy.m4a("disc_number") {
            tag.set_disk(1);
        }
        if policy.m4a("disc_total") {
            tag.set_disk_total(1);
        }
        if policy.m4a("track_number") {
            tag.set_track(track_number);
        }
        if policy.m4a("track_total") {
            tag.set_track_total(track.task_total as u32);
        }
        if policy.m4a("album") {
            tag.set_album(track.playlist_name.clone());
        }
        if policy.m4a("album_sort") {
            tag.insert_text(ItemKey::AlbumTitleSortOrder, track.playlist_name.clone());
        }
        if policy.m4a("album_artist") {
            tag.insert_text(ItemKey::AlbumArtist, album_artist_name.clone());
        }
        if policy.m4a("album_artist_sort") {
            tag.insert_text(ItemKey::AlbumArtistSortOrder, album_artist_name.clone());
        }
    } else {
        let album = track.album.as_ref();
        if policy.m4a("disc_total") {
            tag.set_disk_total(track.disc_total);
        }
        if policy.m4a("track_total")
            && let Some(album) = album
        {
            tag.set_track_total(album.attributes.track_count);
        }
        if policy.m4a("album_artist") {
            tag.insert_text(ItemKey::AlbumArtist, album_artist_name.clone());
        }
        if policy.m4a("album_artist_sort") {
            tag.insert_text(ItemKey::AlbumArtistSortOrder, album_artist_name.clone());
        }
        if let Some(album) = album {
            if policy.m4a("upc") && !album.attributes.upc.is_empty() {
                tag.insert_text(ItemKey::Barcode, album.attributes.upc.clone());
            }
            if policy.m4a("label") && !album.attributes.record_label.is_empty() {
                tag.insert_text(ItemKey::Label, album.attributes.record_label.clone());
            }
            if policy.m4a("release_date") {
                tag.insert_text(ItemKey::RecordingDate, album.attributes.release_date.clone());
            }
            if policy.m4a("copyright") {
                tag.insert_text(ItemKey::CopyrightMessage, album.attributes.copyright.clone());
            }
            if policy.m4a("publisher") {
                tag.insert_text(ItemKey::Publisher, album.attributes.record_label.clone());
            }
        }
    }

    if policy.m4a("advisory") {
        let advisory = match track.resp.attributes.content_rating.as_str() {
            "explicit" => "1",
            "clean" => "2",
            _ => "0",
        };
        tag.insert_text(ItemKey::ParentalAdvisory, advisory.to_string());
    }

    // Custom tags go last and win collisions.
    for (key, value) in &policy.custom_m4a {
        tag.insert_text(ItemKey::Unknown(key.clone()), value.clone());
    }

    Ok(tag)
}

/// Write the MP4 tags into the finished container. The existing tag atom
/// (including the packager-embedded cover) is read first so pictures
/// survive the rewrite.
pub fn write_mp4_tags(ctx: &RunContext, track: &Track, lrc: &str) -> Result<(), Error> {
    let built = build_tag(&ctx.config, &ctx.metadata, track, lrc)?;
    let path = &track.save_path;

    let mut tagged_file = Probe::open(path)
        .map_err(|e| Error::tag_write(format!("open {}: {e}", path.display())))?
        .read()
        .map_err(|e| Error::tag_write(format!("read {}: {e}", path.display())))?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .expect("tag inserted above");

    for item in built.items() {
        tag.insert(item.clone());
    }
    // Accessor-backed fields are carried by items as well, but numbers
    // need explicit copying.
    if let Some(n) = built.track() {
        tag.set_track(n);
    }
    if let Some(n) = built.track_total() {
        tag.set_track_total(n);
    }
    if let Some(n) = built.disk() {
        tag.set_disk(n);
    }
    if let Some(n) = built.disk_total() {
        tag.set_disk_total(n);
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| Error::tag_write(format!("save {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampapi::AlbumData;

    fn base_track() -> Track {
        let mut track = Track {
            storefront: "us".to_string(),
            id: "100".to_string(),
            kind: "songs".to_string(),
            pre_type: "albums".to_string(),
            pre_id: "555".to_string(),
            task_num: 2,
            task_total: 10,
            codec: "ALAC".to_string(),
            ..Default::default()
        };
        track.resp.attributes.name = "Song X (feat. Guest)".to_string();
        track.resp.attributes.album_name = "Record".to_string();
        track.resp.attributes.artist_name = "Main Artist".to_string();
        track.resp.attributes.track_number = 2;
        track.resp.attributes.disc_number = 1;
        track.resp.attributes.genre_names = vec!["Pop".to_string()];
        track.resp.attributes.content_rating = "explicit".to_string();
        track.resp.attributes.isrc = "USX1".to_string();
        track
    }

    fn atmos_policy(config: &Config) -> MetadataPolicy {
        MetadataPolicy::resolve(config, None, None, Some("atmos"), true, false)
    }

    #[test]
    fn atmos_prefix_applies_once_in_tags() {
        let config = Config::default();
        let policy = atmos_policy(&config);
        let mut track = base_track();
        track.codec = "ATMOS".to_string();
        track.resp.attributes.name = "Song X".to_string();

        let tag = build_tag(&config, &policy, &track, "").unwrap();
        assert_eq!(tag.title().as_deref(), Some("\u{1F133} Song X"));

        // Running the writer twice leaves the title unchanged.
        let tag = build_tag(&config, &policy, &track, "").unwrap();
        assert_eq!(tag.title().as_deref(), Some("\u{1F133} Song X"));
    }

    #[test]
    fn featured_artists_fold_into_artist_list() {
        let config = Config::default();
        let policy = MetadataPolicy::resolve(&config, None, None, None, false, false);
        let track = base_track();
        let tag = build_tag(&config, &policy, &track, "").unwrap();
        assert_eq!(tag.title().as_deref(), Some("Song X"));
        assert_eq!(tag.artist().as_deref(), Some("Main Artist, Guest"));
    }

    #[test]
    fn playlist_mode_clamps_disc_and_uses_playlist_name() {
        let config = Config::default();
        let policy = MetadataPolicy::resolve(&config, None, None, None, false, false);
        let mut track = base_track();
        track.pre_type = "playlists".to_string();
        track.playlist_name = "My Mix".to_string();
        let tag = build_tag(&config, &policy, &track, "").unwrap();
        assert_eq!(tag.album().as_deref(), Some("My Mix"));
        assert_eq!(tag.disk(), Some(1));
        assert_eq!(tag.disk_total(), Some(1));
        assert_eq!(tag.track_total(), Some(10));
    }

    #[test]
    fn song_info_mode_uses_album_numbers() {
        let config = Config {
            use_song_info_for_playlist: true,
            ..Config::default()
        };
        let policy = MetadataPolicy::resolve(&config, None, None, None, false, false);
        let mut track = base_track();
        track.pre_type = "playlists".to_string();
        track.disc_total = 2;
        let mut album = AlbumData::default();
        album.id = "555".to_string();
        album.attributes.name = "Record".to_string();
        album.attributes.track_count = 12;
        album.attributes.upc = "0001".to_string();
        track.album = Some(album);

        let tag = build_tag(&config, &policy, &track, "").unwrap();
        assert_eq!(tag.album().as_deref(), Some("Record"));
        assert_eq!(tag.disk_total(), Some(2));
        assert_eq!(tag.track_total(), Some(12));
        assert_eq!(
            tag.get_string(&ItemKey::Barcode),
            Some("0001")
        );
    }

    #[test]
    fn bad_itunes_id_is_a_tag_write_failure() {
        let config = Config::default();
        let policy = MetadataPolicy::resolve(&config, None, None, None, false, false);
        let mut track = base_track();
        track.pre_id = "not-numeric".to_string();
        let err = match build_tag(&config, &policy, &track, "") {
            Err(err) => err,
            Ok(_) => panic!("expected build_tag to fail"),
        };
        assert!(matches!(err, Error::TagWriteFailed { .. }));
    }

    #[test]
    fn advisory_maps_content_rating() {
        let config = Config::default();
        let policy = MetadataPolicy::resolve(&config, None, None, None, false, false);
        let mut track = base_track();
        track.resp.attributes.content_rating = "clean".to_string();
        let tag = build_tag(&config, &policy, &track, "").unwrap();
        assert_eq!(tag.get_string(&ItemKey::ParentalAdvisory), Some("2"));
    }

    #[test]
    fn custom_tags_override_collisions() {
        let config = Config {
            metadata_custom_tag_rules: vec![crate::config::CustomTagRule {
                key: "RELEASETYPE".to_string(),
                value: "forced".to_string(),
                containers: vec!["m4a".to_string()],
                source_formats: vec!["lossless".to_string()],
            }],
            ..Config::default()
        };
        let policy = MetadataPolicy::resolve(&config, None, None, None, false, false);
        let track = base_track();
        let tag = build_tag(&config, &policy, &track, "").unwrap();
        assert_eq!(
            tag.get_string(&ItemKey::Unknown("RELEASETYPE".to_string())),
            Some("forced")
        );
    }
}
