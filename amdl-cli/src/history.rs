//! History lines: one `HISTORY:<minified-json>` line on stdout per
//! terminal outcome. Suppressed in lyrics-only and covers-only modes.

use serde_json::{Map, Value, json};

use crate::context::RunContext;
use crate::metadata::mp4::{album_artist_for, album_id_for, album_name_for, release_type_for};
use crate::model::Track;

fn should_emit(ctx: &RunContext) -> bool {
    !ctx.flags.lyrics_only && !ctx.flags.covers_only
}

fn base_entry(track: &Track, kind: &str) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("_history_entry".to_string(), json!(kind));
    entry.insert("artist".to_string(), json!(album_artist_for(track)));
    entry.insert("album".to_string(), json!(album_name_for(track)));
    entry.insert("release_type".to_string(), json!(release_type_for(track)));
    entry.insert("album_id".to_string(), json!(album_id_for(track)));
    entry.insert(
        "track_num".to_string(),
        json!(track.effective_track_number()),
    );
    entry.insert("track_name".to_string(), json!(track.resp.attributes.name));
    entry.insert("storefront".to_string(), json!(track.storefront));
    entry
}

fn print_entry(entry: Map<String, Value>) {
    match serde_json::to_string(&Value::Object(entry)) {
        Ok(payload) => println!("HISTORY:{payload}"),
        Err(e) => eprintln!("Failed to emit history: {e}"),
    }
}

pub fn emit_download(ctx: &RunContext, track: &Track) {
    if !should_emit(ctx) {
        return;
    }
    print_entry(base_entry(track, "download"));
}

pub fn emit_unavailable(ctx: &RunContext, track: &Track, reason: &str) {
    if !should_emit(ctx) {
        return;
    }
    let mut entry = base_entry(track, "unavailable");
    entry.insert("reason".to_string(), json!(reason.trim()));
    entry.insert(
        "requested_format".to_string(),
        json!(ctx.metadata.source_format),
    );
    print_entry(entry);
}

pub struct RepairEvent<'a> {
    pub file_path: &'a str,
    pub repair_mode: &'a str,
    pub reason: &'a str,
    pub bit_depth_before: u32,
    pub bit_depth_after: u32,
}

pub fn emit_repair(ctx: &RunContext, track: &Track, event: &RepairEvent<'_>) {
    if !should_emit(ctx) {
        return;
    }
    let mut entry = base_entry(track, "repair");
    entry.insert("reason".to_string(), json!(event.reason.trim()));
    entry.insert("repair_mode".to_string(), json!(event.repair_mode.trim()));
    entry.insert(
        "requested_format".to_string(),
        json!(ctx.metadata.source_format),
    );
    entry.insert("file_path".to_string(), json!(event.file_path.trim()));
    if event.bit_depth_before > 0 {
        entry.insert("bit_depth_before".to_string(), json!(event.bit_depth_before));
    }
    if event.bit_depth_after > 0 {
        entry.insert("bit_depth_after".to_string(), json!(event.bit_depth_after));
    }
    if event.bit_depth_before > 0 && event.bit_depth_after > 0 {
        entry.insert(
            "bit_depth_reduced".to_string(),
            json!(event.bit_depth_after < event.bit_depth_before),
        );
    }
    print_entry(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_entry_falls_back_to_task_num() {
        let mut track = Track {
            storefront: "us".to_string(),
            task_num: 7,
            ..Default::default()
        };
        track.resp.attributes.name = "Tune".to_string();
        let entry = base_entry(&track, "download");
        assert_eq!(entry["track_num"], json!(7));
        assert_eq!(entry["_history_entry"], json!("download"));
        assert_eq!(entry["storefront"], json!("us"));

        track.resp.attributes.track_number = 3;
        let entry = base_entry(&track, "download");
        assert_eq!(entry["track_num"], json!(3));
    }

    #[test]
    fn entries_serialize_minified() {
        let mut track = Track::default();
        track.resp.attributes.name = "X".to_string();
        let entry = base_entry(&track, "unavailable");
        let payload = serde_json::to_string(&Value::Object(entry)).unwrap();
        assert!(!payload.contains('\n'));
        assert!(payload.contains("\"_history_entry\":\"unavailable\""));
    }
}
