//! HLS variant selection.
//!
//! Audio tracks come with a master playlist enumerating mutually
//! exclusive variants (ALAC at several sample rates, AAC flavors, E-AC-3
//! Atmos, AC-3). This crate picks one variant consistent with the
//! requested mode and configured caps, labels its quality, scans media
//! playlists for the prefetch-key sentinel, and resolves music-video
//! video/audio renditions.

mod error;
mod fetch;
mod inspect;
mod mv;
mod variant;

pub use error::PickError;
pub use fetch::{fetch_master, fetch_playlist_text};
pub use inspect::{FormatSummary, VariantRow, inspect_formats, variant_rows};
pub use mv::{pick_mv_audio, pick_mv_video};
pub use variant::{
    PREFETCH_KEY_URI, SelectedVariant, SelectionCaps, SelectionMode, has_atmos_variant,
    is_hires_quality, media_playlist_has_prefetch_key, select_variant,
};
