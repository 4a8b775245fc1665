//! Post-download repair and conversion through the external transcoder.
//!
//! With conversion off, ALAC files may still be repaired in place per the
//! configured repair mode. With conversion on, tracks whose source format
//! is selected are re-encoded to the target; the ALAC→FLAC path inherits
//! tags read from the source container, honoring the active FLAC tag set
//! and the Atmos prefix, and is normalized afterwards with the FLAC tag
//! editor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::context::RunContext;
use crate::error::Error;
use crate::history::{self, RepairEvent};
use crate::metadata::mp4::{metadata_release_type_for, should_use_atmos_prefix, write_mp4_tags};
use crate::metadata::names::with_atmos_prefix;
use crate::model::Track;
use crate::tools;

pub fn normalize_alac_repair_mode(mode: &str) -> &'static str {
    match mode.trim().to_lowercase().as_str() {
        "off" => "off",
        "corrupt-only" => "corrupt-only",
        _ => "all",
    }
}

/// Rough lossy-source heuristic by extension and resolved codec.
fn is_lossy_source(ext: &str, codec: &str) -> bool {
    let ext = ext.to_lowercase();
    if ext == ".m4a" && (codec.contains("AAC") || codec.contains("ATMOS")) {
        return true;
    }
    matches!(ext.as_str(), ".mp3" | ".opus" | ".ogg")
}

/// Source-format key for the convert-formats gate.
pub fn format_key_for_track(track: &Track) -> &'static str {
    match track.codec.to_uppercase().as_str() {
        "ATMOS" => "atmos",
        "AAC" => "aac",
        "ALAC" if hlspick::is_hires_quality(&track.quality) => "hires",
        _ => "lossless",
    }
}

fn should_convert_track(config: &Config, track: &Track) -> bool {
    let key = format_key_for_track(track);
    config
        .convert_formats_or_default()
        .iter()
        .any(|entry| entry.eq_ignore_ascii_case(key))
}

fn sample_format_bit_depth(sample_fmt: &str) -> u32 {
    let re = Regex::new(r"^[su](\d+)").expect("static regex");
    re.captures(sample_fmt.trim())
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Probe the audio bit depth via the probe tool; 0 when unknown.
async fn probe_audio_bit_depth(ffprobe: Option<&Path>, in_path: &Path) -> u32 {
    let Some(ffprobe) = ffprobe else {
        return 0;
    };
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "stream=bits_per_raw_sample,bits_per_sample,sample_fmt",
            "-of",
            "default=nw=1",
        ])
        .arg(in_path)
        .output()
        .await;
    let Ok(output) = output else {
        return 0;
    };
    if !output.status.success() {
        return 0;
    }
    let mut values = HashMap::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                values.insert(key, value.to_string());
            }
        }
    }
    for key in ["bits_per_raw_sample", "bits_per_sample"] {
        if let Some(raw) = values.get(key)
            && let Ok(depth) = raw.parse::<u32>()
            && depth > 0
        {
            return depth;
        }
    }
    values
        .get("sample_fmt")
        .map(|fmt| sample_format_bit_depth(fmt))
        .unwrap_or(0)
}

fn warn_bit_depth_reduction(label: &str, before: u32, after: u32) {
    if before > 0 && after > 0 && after < before {
        println!("⚠ {label} reduced bit depth during repair: {before}-bit -> {after}-bit");
    }
}

/// Strict decode probe: `-err_detect explode` into a null muxer.
async fn validate_alac_file(ffmpeg: &Path, in_path: &Path) -> (bool, String) {
    let output = Command::new(ffmpeg)
        .args(["-v", "error", "-xerror", "-err_detect", "explode", "-i"])
        .arg(in_path)
        .args(["-f", "null", "-"])
        .output()
        .await;
    match output {
        Ok(output) if output.status.success() => (true, String::new()),
        Ok(output) => {
            let msg = String::from_utf8_lossy(&output.stderr);
            let first = msg.lines().next().unwrap_or("").trim().to_string();
            (false, first)
        }
        Err(e) => (false, e.to_string()),
    }
}

/// Decide whether to repair: `(should_repair, reason, validation_msg)`.
async fn decide_alac_repair(ffmpeg: &Path, src: &Path, mode: &str) -> (bool, String, String) {
    match normalize_alac_repair_mode(mode) {
        "off" => (false, String::new(), String::new()),
        "all" => (true, "forced".to_string(), String::new()),
        _ => {
            let (ok, msg) = validate_alac_file(ffmpeg, src).await;
            if ok {
                (false, String::new(), String::new())
            } else {
                (true, "corrupt_detected".to_string(), msg)
            }
        }
    }
}

/// On macOS prefer the `alac_at` decoder when the transcoder lists it;
/// warn once and use the native decoder otherwise.
async fn select_alac_decoder(ctx: &mut RunContext, ffmpeg: &Path) -> &'static str {
    if ctx.tools.alac_at_available.is_none() {
        let available = if cfg!(target_os = "macos") {
            match Command::new(ffmpeg)
                .args(["-hide_banner", "-decoders"])
                .output()
                .await
            {
                Ok(output) => String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .any(|line| line.contains(" alac_at") || line.contains("\talac_at")),
                Err(_) => false,
            }
        } else {
            false
        };
        ctx.tools.alac_at_available = Some(available);
    }
    if ctx.tools.alac_at_available == Some(true) {
        return "alac_at";
    }
    if !ctx.tools.warned_alac_at_fallback {
        if cfg!(target_os = "macos") {
            println!("ALAC decode: ffmpeg does not list alac_at; falling back to native ALAC decoder.");
        } else {
            println!("ALAC decode: alac_at is macOS-only; falling back to ffmpeg's native ALAC decoder.");
        }
        ctx.tools.warned_alac_at_fallback = true;
    }
    "alac"
}

/// Re-encode ALAC→ALAC in place, preserving streams, chapters, and the
/// metadata map; the output lands in a scratch file that replaces the
/// source only on success.
async fn repair_alac_in_place(ffmpeg: &Path, decoder: &str, in_path: &Path) -> Result<(), Error> {
    let dir = in_path.parent().unwrap_or(Path::new("."));
    let ext = in_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("m4a");
    let scratch = tempfile::Builder::new()
        .prefix(".alac-repair-")
        .suffix(&format!(".{ext}"))
        .tempfile_in(dir)
        .map_err(|e| Error::transcode(format!("scratch file: {e}")))?;
    let scratch_path = scratch.path().to_path_buf();
    // Close the handle; ffmpeg rewrites the path with -y.
    scratch.keep().map_err(|e| Error::transcode(e.to_string()))?;

    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-y");
    if !decoder.is_empty() {
        cmd.args(["-c:a", decoder]);
    }
    cmd.arg("-i")
        .arg(in_path)
        .args(["-map", "0", "-c", "copy", "-c:a", "alac", "-map_metadata", "0", "-map_chapters", "0"])
        .arg(&scratch_path);
    let status = cmd.status().await.map_err(|e| Error::transcode(e.to_string()))?;
    if !status.success() {
        let _ = std::fs::remove_file(&scratch_path);
        return Err(Error::transcode(format!("repair exited with {status}")));
    }
    replace_file(&scratch_path, in_path)?;
    Ok(())
}

fn replace_file(tmp: &Path, dest: &Path) -> Result<(), Error> {
    if std::fs::rename(tmp, dest).is_ok() {
        return Ok(());
    }
    std::fs::remove_file(dest)?;
    std::fs::rename(tmp, dest)?;
    Ok(())
}

async fn run_alac_repair(
    ffmpeg: &Path,
    decoder: &str,
    src: &Path,
    label: &str,
    reason: &str,
    validation_msg: &str,
) -> Result<(), Error> {
    let label = if label.is_empty() { "ALAC" } else { label };
    if reason == "corrupt_detected" {
        if validation_msg.is_empty() {
            println!("{label} validation failed; repairing.");
        } else {
            println!("{label} validation failed; repairing ({validation_msg})");
        }
    } else {
        println!("Repairing {label}...");
    }
    match repair_alac_in_place(ffmpeg, decoder, src).await {
        Ok(()) => {
            println!("{label} repair complete.");
            Ok(())
        }
        Err(e) => {
            println!("{label} repair failed: {e}");
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// FLAC tag inheritance
// ---------------------------------------------------------------------------

/// Read the container's format-level tags via the probe tool.
async fn read_format_tags(ffprobe: &Path, in_path: &Path) -> Result<HashMap<String, String>, Error> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format_tags", "-of", "default=nw=1"])
        .arg(in_path)
        .output()
        .await
        .map_err(|e| Error::transcode(e.to_string()))?;
    if !output.status.success() {
        return Err(Error::transcode("ffprobe format_tags failed".to_string()));
    }
    let mut tags = HashMap::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let line = line.trim().trim_start_matches("TAG:");
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                tags.insert(key, value.to_string());
            }
        }
    }
    Ok(tags)
}

fn pick_first<'a>(tags: &'a HashMap<String, String>, keys: &[&str]) -> &'a str {
    for key in keys {
        if let Some(value) = tags.get(*key)
            && !value.is_empty()
        {
            return value;
        }
    }
    ""
}

fn split_fraction(value: &str) -> (String, String) {
    let raw = value.trim();
    match raw.split_once('/') {
        Some((left, right)) => (left.trim().to_string(), right.trim().to_string()),
        None => (raw.to_string(), String::new()),
    }
}

fn assign(metadata: &mut std::collections::BTreeMap<String, String>, key: &str, value: &str) {
    let value = value.trim();
    if !key.is_empty() && !value.is_empty() {
        metadata.insert(key.to_string(), value.to_string());
    }
}

/// Map probed source tags onto the curated FLAC tag set, honoring the
/// active FLAC tag policy.
fn build_flac_metadata_from_tags(
    ctx: &RunContext,
    tags: &HashMap<String, String>,
) -> std::collections::BTreeMap<String, String> {
    use crate::metadata::names::format_composer_list;

    let policy = &ctx.metadata;
    let mut metadata = std::collections::BTreeMap::new();

    if policy.flac("title") {
        assign(&mut metadata, "TITLE", pick_first(tags, &["title"]));
    }
    if policy.flac("title_sort") {
        assign(&mut metadata, "TITLESORT", pick_first(tags, &["titlesort", "sort_name"]));
    }
    if policy.flac("artist") {
        assign(&mut metadata, "ARTIST", pick_first(tags, &["artist"]));
    }
    if policy.flac("artist_sort") {
        assign(&mut metadata, "ARTISTSORT", pick_first(tags, &["artistsort", "sort_artist"]));
    }
    if policy.flac("album") {
        assign(&mut metadata, "ALBUM", pick_first(tags, &["album"]));
    }
    if policy.flac("album_sort") {
        assign(&mut metadata, "ALBUMSORT", pick_first(tags, &["albumsort", "sort_album"]));
    }
    if policy.flac("album_artist") {
        assign(
            &mut metadata,
            "ALBUMARTIST",
            pick_first(tags, &["albumartist", "album_artist"]),
        );
    }
    if policy.flac("album_artist_sort") {
        assign(
            &mut metadata,
            "ALBUMARTISTSORT",
            pick_first(tags, &["albumartistsort", "sort_album_artist", "sort_albumartist"]),
        );
    }
    if policy.flac("composer") {
        assign(
            &mut metadata,
            "COMPOSER",
            &format_composer_list(pick_first(tags, &["composer"])),
        );
    }
    if policy.flac("composer_sort") {
        assign(
            &mut metadata,
            "COMPOSERSORT",
            &format_composer_list(pick_first(tags, &["composersort", "sort_composer"])),
        );
    }
    if policy.flac("genre") {
        assign(&mut metadata, "GENRE", pick_first(tags, &["genre"]));
    }

    let (track_number, mut track_total) =
        split_fraction(pick_first(tags, &["tracknumber", "track", "tracknum"]));
    if policy.flac("track_number") {
        assign(&mut metadata, "TRACKNUMBER", &track_number);
    }
    if policy.flac("track_total") {
        if track_total.is_empty() {
            track_total = pick_first(tags, &["tracktotal", "totaltracks", "track_total"]).to_string();
        }
        assign(&mut metadata, "TRACKTOTAL", &track_total);
    }

    let (disc_number, mut disc_total) =
        split_fraction(pick_first(tags, &["discnumber", "disc", "disk"]));
    if policy.flac("disc_number") {
        assign(&mut metadata, "DISCNUMBER", &disc_number);
    }
    if policy.flac("disc_total") {
        if disc_total.is_empty() {
            disc_total = pick_first(tags, &["disctotal", "totaldiscs", "disc_total"]).to_string();
        }
        assign(&mut metadata, "DISCTOTAL", &disc_total);
    }

    if policy.flac("release_date") {
        assign(
            &mut metadata,
            "DATE",
            pick_first(tags, &["date", "release_date", "releasedate"]),
        );
    }
    if policy.flac("original_date") {
        assign(
            &mut metadata,
            "ORIGINALDATE",
            pick_first(tags, &["originaldate", "original_date", "origdate", "tdor"]),
        );
    }
    if policy.flac("release_type") {
        assign(
            &mut metadata,
            "RELEASETYPE",
            pick_first(tags, &["releasetype", "release_type"]),
        );
    }
    if policy.flac("isrc") {
        assign(&mut metadata, "ISRC", pick_first(tags, &["isrc"]));
    }
    if policy.flac("upc") {
        assign(&mut metadata, "UPC", pick_first(tags, &["upc"]));
    }
    if policy.flac("label") {
        assign(&mut metadata, "LABEL", pick_first(tags, &["label"]));
    }
    if policy.flac("publisher") {
        assign(&mut metadata, "PUBLISHER", pick_first(tags, &["publisher", "label"]));
    }
    if policy.flac("copyright") {
        assign(&mut metadata, "COPYRIGHT", pick_first(tags, &["copyright"]));
    }
    if policy.flac("performer") {
        assign(&mut metadata, "PERFORMER", pick_first(tags, &["performer"]));
    }
    if policy.flac("lyrics") {
        assign(&mut metadata, "LYRICS", pick_first(tags, &["lyrics"]));
    }
    if policy.flac("album_version") {
        assign(
            &mut metadata,
            "ALBUMVERSION",
            pick_first(tags, &["albumversion", "edition", "version"]),
        );
    }
    if policy.flac("loudness") {
        for (out, key) in [
            ("REPLAYGAIN_TRACK_GAIN", "replaygain_track_gain"),
            ("REPLAYGAIN_TRACK_PEAK", "replaygain_track_peak"),
            ("REPLAYGAIN_ALBUM_GAIN", "replaygain_album_gain"),
            ("REPLAYGAIN_ALBUM_PEAK", "replaygain_album_peak"),
            ("R128_TRACK_GAIN", "r128_track_gain"),
            ("R128_ALBUM_GAIN", "r128_album_gain"),
        ] {
            assign(&mut metadata, out, pick_first(tags, &[key]));
        }
    }

    for (key, value) in &ctx.metadata.custom_flac {
        assign(&mut metadata, key, value);
    }

    metadata
}

fn apply_atmos_prefix_to_flac(
    metadata: &mut std::collections::BTreeMap<String, String>,
    use_prefix: bool,
) {
    if !use_prefix {
        return;
    }
    for key in ["TITLE", "TITLESORT", "ALBUM", "ALBUMSORT"] {
        if let Some(value) = metadata.get(key) {
            let prefixed = with_atmos_prefix(value, true);
            metadata.insert(key.to_string(), prefixed);
        }
    }
}

async fn build_selected_flac_metadata(
    ctx: &mut RunContext,
    ffprobe: Option<&Path>,
    in_path: &Path,
    track: &Track,
) -> std::collections::BTreeMap<String, String> {
    let mut tags = HashMap::new();
    match ffprobe {
        None => warn_ffprobe_missing(ctx),
        Some(ffprobe) => match read_format_tags(ffprobe, in_path).await {
            Ok(found) => tags = found,
            Err(_) => warn_ffprobe_missing(ctx),
        },
    }
    let mut metadata = build_flac_metadata_from_tags(ctx, &tags);
    if ctx.metadata.flac("release_type") && !metadata.contains_key("RELEASETYPE") {
        assign(&mut metadata, "RELEASETYPE", metadata_release_type_for(track));
    }
    apply_atmos_prefix_to_flac(&mut metadata, should_use_atmos_prefix(&ctx.metadata, track));
    metadata
}

fn warn_ffprobe_missing(ctx: &mut RunContext) {
    if !ctx.tools.warned_ffprobe_missing {
        println!("ffprobe unavailable; skipping FLAC metadata extraction from source tags.");
        ctx.tools.warned_ffprobe_missing = true;
    }
}

// ---------------------------------------------------------------------------
// metaflac post-processing
// ---------------------------------------------------------------------------

fn metaflac_path(ctx: &mut RunContext) -> Option<PathBuf> {
    if ctx.tools.metaflac_path.is_none() {
        ctx.tools.metaflac_path = Some(tools::resolve_metaflac());
    }
    ctx.tools.metaflac_path.clone().flatten()
}

async fn flac_get_tag(metaflac: &Path, file: &Path, key: &str) -> String {
    let output = Command::new(metaflac)
        .arg(format!("--show-tag={key}"))
        .arg(file)
        .output()
        .await;
    let Ok(output) = output else {
        return String::new();
    };
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        if let Some((_, value)) = line.trim().split_once('=') {
            return value.trim().to_string();
        }
    }
    String::new()
}

async fn run_metaflac(metaflac: &Path, args: &[String], file: &Path) {
    let _ = Command::new(metaflac).args(args).arg(file).status().await;
}

/// Split `a/b` track/disc fractions into separate numeric tags and strip
/// transcoder fingerprint tags.
pub async fn postprocess_flac_tags(ctx: &mut RunContext, file: &Path) {
    let Some(metaflac) = metaflac_path(ctx) else {
        if !ctx.tools.warned_metaflac_missing {
            println!("metaflac unavailable; skipping FLAC tag normalization.");
            ctx.tools.warned_metaflac_missing = true;
        }
        return;
    };

    let track_number = flac_get_tag(&metaflac, file, "TRACKNUMBER").await;
    if let Some((num, total)) = track_number.split_once('/') {
        let (num, total) = (num.trim(), total.trim());
        if !num.is_empty() && !total.is_empty() {
            let args = vec![
                "--remove-tag=TRACKNUMBER".to_string(),
                "--remove-tag=TRACKTOTAL".to_string(),
                "--remove-tag=TOTALTRACKS".to_string(),
                format!("--set-tag=TRACKNUMBER={num}"),
                format!("--set-tag=TOTALTRACKS={total}"),
                format!("--set-tag=TRACKTOTAL={total}"),
            ];
            run_metaflac(&metaflac, &args, file).await;
        }
    }

    let disc_number = flac_get_tag(&metaflac, file, "DISCNUMBER").await;
    if let Some((num, total)) = disc_number.split_once('/') {
        let (num, total) = (num.trim(), total.trim());
        if !num.is_empty() && !total.is_empty() {
            let args = vec![
                "--remove-tag=DISCNUMBER".to_string(),
                "--remove-tag=DISCTOTAL".to_string(),
                "--remove-tag=TOTALDISCS".to_string(),
                format!("--set-tag=DISCNUMBER={num}"),
                format!("--set-tag=TOTALDISCS={total}"),
                format!("--set-tag=DISCTOTAL={total}"),
            ];
            run_metaflac(&metaflac, &args, file).await;
        }
    }

    let fingerprints: Vec<String> = [
        "major_brand",
        "MAJOR_BRAND",
        "minor_version",
        "MINOR_VERSION",
        "compatible_brands",
        "COMPATIBLE_BRANDS",
        "creation_time",
        "CREATION_TIME",
        "ENCODER",
        "encoder",
        "ENCODED_BY",
        "encoded_by",
    ]
    .iter()
    .map(|tag| format!("--remove-tag={tag}"))
    .collect();
    run_metaflac(&metaflac, &fingerprints, file).await;
}

// ---------------------------------------------------------------------------
// ffmpeg argument builders
// ---------------------------------------------------------------------------

fn build_ffmpeg_args(
    in_path: &Path,
    out_path: &Path,
    target: &str,
    extra_args: &str,
    decoder: &str,
) -> Result<Vec<String>, Error> {
    let mut args: Vec<String> = vec!["-y".to_string()];
    if !decoder.is_empty() {
        args.extend(["-c:a".to_string(), decoder.to_string()]);
    }
    args.extend([
        "-i".to_string(),
        in_path.to_string_lossy().into_owned(),
        "-vn".to_string(),
    ]);
    match target {
        "flac" => args.extend(["-c:a".to_string(), "flac".to_string()]),
        "mp3" => args.extend([
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-qscale:a".to_string(),
            "2".to_string(),
        ]),
        "opus" => args.extend([
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-vbr".to_string(),
            "on".to_string(),
        ]),
        "wav" => args.extend(["-c:a".to_string(), "pcm_s16le".to_string()]),
        "copy" => args.extend(["-c".to_string(), "copy".to_string()]),
        other => {
            return Err(Error::transcode(format!("unsupported convert-format: {other}")));
        }
    }
    if !extra_args.is_empty() {
        args.extend(extra_args.split_whitespace().map(str::to_string));
    }
    args.push(out_path.to_string_lossy().into_owned());
    Ok(args)
}

fn build_alac_to_flac_args(
    in_path: &Path,
    out_path: &Path,
    decoder: &str,
    extra_args: &str,
    metadata: &std::collections::BTreeMap<String, String>,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".to_string()];
    if !decoder.is_empty() {
        args.extend(["-c:a".to_string(), decoder.to_string()]);
    }
    args.extend([
        "-i".to_string(),
        in_path.to_string_lossy().into_owned(),
        "-map".to_string(),
        "0:a:0".to_string(),
        "-vn".to_string(),
        "-sn".to_string(),
        "-dn".to_string(),
        "-c:a".to_string(),
        "flac".to_string(),
        "-compression_level".to_string(),
        "8".to_string(),
        "-map_chapters".to_string(),
        "0".to_string(),
        "-map_metadata".to_string(),
        "0".to_string(),
    ]);
    for (key, value) in metadata {
        let value = value.trim();
        if !value.is_empty() {
            args.extend(["-metadata".to_string(), format!("{key}={value}")]);
        }
    }
    if !extra_args.is_empty() {
        args.extend(extra_args.split_whitespace().map(str::to_string));
    }
    args.push(out_path.to_string_lossy().into_owned());
    args
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Repair-only flow when conversion is disabled; emits a repair history
/// line and restores the MP4 tags afterwards (the transcoder rewrites the
/// container).
async fn repair_without_convert(ctx: &mut RunContext, track: &mut Track, lrc: &str) {
    let src = track.save_path.clone();
    let repair_mode = normalize_alac_repair_mode(&ctx.config.alac_repair_mode).to_string();
    let Ok(ffmpeg) = tools::resolve_ffmpeg(&ctx.config) else {
        println!(
            "ffmpeg not found at '{}'; skipping ALAC repair.",
            ctx.config.ffmpeg_path
        );
        return;
    };
    let ffprobe = tools::resolve_ffprobe(&ffmpeg);
    let (should_repair, reason, validation_msg) =
        decide_alac_repair(&ffmpeg, &src, &repair_mode).await;
    if !should_repair {
        return;
    }
    let source_depth = probe_audio_bit_depth(ffprobe.as_deref(), &src).await;
    let decoder = select_alac_decoder(ctx, &ffmpeg).await;
    if run_alac_repair(&ffmpeg, decoder, &src, "ALAC", &reason, &validation_msg)
        .await
        .is_err()
    {
        return;
    }
    let repaired_depth = probe_audio_bit_depth(ffprobe.as_deref(), &src).await;
    warn_bit_depth_reduction("ALAC repair", source_depth, repaired_depth);
    history::emit_repair(
        ctx,
        track,
        &RepairEvent {
            file_path: &src.to_string_lossy(),
            repair_mode: &repair_mode,
            reason: &reason,
            bit_depth_before: source_depth,
            bit_depth_after: repaired_depth,
        },
    );
    if let Err(e) = write_mp4_tags(ctx, track, lrc) {
        println!("⚠ Failed to restore MP4 tags after ALAC repair: {e}");
    }
}

/// Conversion/repair hook run after tagging. Failures leave the source
/// untouched and are reported, not retried.
pub async fn convert_if_needed(ctx: &mut RunContext, track: &mut Track, lrc: &str) {
    if track.save_path.as_os_str().is_empty() {
        return;
    }
    let is_alac = track.codec.eq_ignore_ascii_case("ALAC");

    if !ctx.config.convert_after_download {
        if is_alac {
            repair_without_convert(ctx, track, lrc).await;
        }
        return;
    }

    if ctx.config.convert_format.is_empty() {
        return;
    }
    if !should_convert_track(&ctx.config, track) {
        println!(
            "Conversion skipped (format {} not selected)",
            format_key_for_track(track)
        );
        return;
    }
    let target = ctx.config.convert_format.to_lowercase();
    if target == "copy" {
        println!("Convert (copy) requested; skipping because it produces no new format.");
        return;
    }

    let src = track.save_path.clone();
    let ext = src
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    if ctx.config.convert_skip_if_source_match && ext == format!(".{target}") {
        println!("Conversion skipped (already {target})");
        return;
    }
    let out_path = src.with_extension(&target);

    if (target == "flac" || target == "wav") && is_lossy_source(&ext, &track.codec) {
        if ctx.config.convert_skip_lossy_to_lossless {
            println!("Skipping conversion: source appears lossy and target is lossless; configured to skip.");
            return;
        }
        if ctx.config.convert_warn_lossy_to_lossless {
            println!("Warning: Converting lossy source to lossless container will not improve quality.");
        }
    }

    let Ok(ffmpeg) = tools::resolve_ffmpeg(&ctx.config) else {
        println!(
            "ffmpeg not found at '{}'; skipping conversion.",
            ctx.config.ffmpeg_path
        );
        return;
    };
    let ffprobe = tools::resolve_ffprobe(&ffmpeg);
    let repair_mode = normalize_alac_repair_mode(&ctx.config.alac_repair_mode).to_string();

    let mut decoder = "";
    let mut needs_repair = false;
    let mut repair_reason = String::new();
    let mut repair_message = String::new();
    let mut source_depth = 0;
    if is_alac {
        let (repair, reason, message) = decide_alac_repair(&ffmpeg, &src, &repair_mode).await;
        needs_repair = repair;
        repair_reason = reason;
        repair_message = message;
        if needs_repair {
            source_depth = probe_audio_bit_depth(ffprobe.as_deref(), &src).await;
            decoder = select_alac_decoder(ctx, &ffmpeg).await;
        }
    }

    let args = if target == "flac" && is_alac {
        let metadata = build_selected_flac_metadata(ctx, ffprobe.as_deref(), &src, track).await;
        build_alac_to_flac_args(&src, &out_path, decoder, &ctx.config.convert_extra_args, &metadata)
    } else {
        match build_ffmpeg_args(&src, &out_path, &target, &ctx.config.convert_extra_args, decoder) {
            Ok(args) => args,
            Err(e) => {
                println!("Conversion config error: {e}");
                return;
            }
        }
    };

    println!("Converting -> {target} ...");
    let started = std::time::Instant::now();
    let status = Command::new(&ffmpeg).args(&args).status().await;
    match status {
        Ok(code) if code.success() => {}
        Ok(code) => {
            println!("Conversion failed: ffmpeg exited with {code}");
            return;
        }
        Err(e) => {
            println!("Conversion failed: {e}");
            return;
        }
    }
    println!(
        "Conversion completed in {:.3}s: {}",
        started.elapsed().as_secs_f64(),
        out_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    );
    debug!(target = %target, path = %out_path.display(), "conversion finished");

    if target == "flac" && is_alac {
        postprocess_flac_tags(ctx, &out_path).await;
    }

    let output_depth = if needs_repair && target == "flac" && is_alac {
        probe_audio_bit_depth(ffprobe.as_deref(), &out_path).await
    } else {
        0
    };

    if ctx.config.convert_keep_original
        && is_alac
        && needs_repair
        && run_alac_repair(&ffmpeg, decoder, &src, "original ALAC", &repair_reason, &repair_message)
            .await
            .is_ok()
    {
        let repaired_depth = probe_audio_bit_depth(ffprobe.as_deref(), &src).await;
        warn_bit_depth_reduction("ALAC repair", source_depth, repaired_depth);
        history::emit_repair(
            ctx,
            track,
            &RepairEvent {
                file_path: &src.to_string_lossy(),
                repair_mode: &repair_mode,
                reason: &repair_reason,
                bit_depth_before: source_depth,
                bit_depth_after: repaired_depth,
            },
        );
        if let Err(e) = write_mp4_tags(ctx, track, lrc) {
            println!("⚠ Failed to restore MP4 tags after original ALAC repair: {e}");
        }
    }

    if !ctx.config.convert_keep_original {
        if is_alac && needs_repair {
            if target == "flac" {
                warn_bit_depth_reduction("ALAC->FLAC repair path", source_depth, output_depth);
            }
            history::emit_repair(
                ctx,
                track,
                &RepairEvent {
                    file_path: &out_path.to_string_lossy(),
                    repair_mode: &repair_mode,
                    reason: &repair_reason,
                    bit_depth_before: if target == "flac" { source_depth } else { 0 },
                    bit_depth_after: if target == "flac" { output_depth } else { 0 },
                },
            );
        }
        match std::fs::remove_file(&src) {
            Ok(()) => {
                track.save_path = out_path.clone();
                track.save_name = out_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!("Original removed.");
            }
            Err(e) => println!("Failed to remove original after conversion: {e}"),
        }
    } else {
        track.save_path = out_path.clone();
        track.save_name = out_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_mode_normalization() {
        assert_eq!(normalize_alac_repair_mode("off"), "off");
        assert_eq!(normalize_alac_repair_mode(" Corrupt-Only "), "corrupt-only");
        assert_eq!(normalize_alac_repair_mode(""), "all");
        assert_eq!(normalize_alac_repair_mode("bogus"), "all");
    }

    #[test]
    fn sample_format_parses_bit_depth() {
        assert_eq!(sample_format_bit_depth("s16"), 16);
        assert_eq!(sample_format_bit_depth("s32p"), 32);
        assert_eq!(sample_format_bit_depth("u8"), 8);
        assert_eq!(sample_format_bit_depth("fltp"), 0);
    }

    #[test]
    fn format_key_tracks_codec_and_quality() {
        let mut track = Track::default();
        track.codec = "ATMOS".to_string();
        assert_eq!(format_key_for_track(&track), "atmos");
        track.codec = "AAC".to_string();
        assert_eq!(format_key_for_track(&track), "aac");
        track.codec = "ALAC".to_string();
        track.quality = "24B-96.0kHz".to_string();
        assert_eq!(format_key_for_track(&track), "hires");
        track.quality = "16B-44.1kHz".to_string();
        assert_eq!(format_key_for_track(&track), "lossless");
    }

    #[test]
    fn lossy_detection() {
        assert!(is_lossy_source(".m4a", "AAC"));
        assert!(is_lossy_source(".mp3", "whatever"));
        assert!(!is_lossy_source(".m4a", "ALAC"));
        assert!(!is_lossy_source(".flac", "ALAC"));
    }

    #[test]
    fn ffmpeg_args_cover_targets() {
        let args = build_ffmpeg_args(
            Path::new("in.m4a"),
            Path::new("out.mp3"),
            "mp3",
            "",
            "",
        )
        .unwrap();
        assert!(args.windows(2).any(|w| w == ["-qscale:a", "2"]));

        let err = build_ffmpeg_args(Path::new("a"), Path::new("b"), "aiff", "", "").unwrap_err();
        assert!(matches!(err, Error::TranscodeFailed { .. }));
    }

    #[test]
    fn alac_to_flac_args_embed_metadata_sorted() {
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("TITLE".to_string(), "X".to_string());
        metadata.insert("ALBUM".to_string(), "Y".to_string());
        let args = build_alac_to_flac_args(
            Path::new("in.m4a"),
            Path::new("out.flac"),
            "alac",
            "",
            &metadata,
        );
        let album_pos = args.iter().position(|a| a == "ALBUM=Y").unwrap();
        let title_pos = args.iter().position(|a| a == "TITLE=X").unwrap();
        assert!(album_pos < title_pos, "metadata flags sorted by key");
        assert!(args.windows(2).any(|w| w == ["-compression_level", "8"]));
    }

    #[test]
    fn fraction_split() {
        assert_eq!(split_fraction("3/12"), ("3".to_string(), "12".to_string()));
        assert_eq!(split_fraction(" 4 "), ("4".to_string(), String::new()));
    }
}
