use clap::Parser;

/// Apple Music library downloader.
///
/// Positional arguments are catalog URLs (albums, playlists, songs,
/// stations, music videos, or artists to expand).
#[derive(Debug, Parser)]
#[command(name = "amdl", version, about)]
pub struct Args {
    /// Search for 'album', 'song', or 'artist'; provide the query as
    /// positional arguments
    #[arg(long, value_name = "KIND")]
    pub search: Option<String>,

    /// Output JSON preview metadata for the first URL and exit
    #[arg(long)]
    pub preview: bool,

    /// Enable Dolby Atmos download mode
    #[arg(long)]
    pub atmos: bool,

    /// Enable AAC download mode
    #[arg(long)]
    pub aac: bool,

    /// Enable selective download
    #[arg(long)]
    pub select: bool,

    /// Select tracks by list/range (e.g. 1,2,5-7); implies --select
    #[arg(long, value_name = "LIST")]
    pub select_tracks: Option<String>,

    /// Enable single song download mode
    #[arg(long)]
    pub song: bool,

    /// Download lyrics only (no audio)
    #[arg(long, conflicts_with = "covers_only")]
    pub lyrics_only: bool,

    /// Download covers only (no audio)
    #[arg(long)]
    pub covers_only: bool,

    /// Disable playlist pre-download deduplication
    #[arg(long)]
    pub no_playlist_dedupe: bool,

    /// Download all artist albums without prompting
    #[arg(long = "all-album")]
    pub all_album: bool,

    /// Show audio quality information instead of downloading
    #[arg(long)]
    pub debug: bool,

    /// Max ALAC sample rate in Hz (overrides config)
    #[arg(long, value_name = "HZ")]
    pub alac_max: Option<i64>,

    /// Max Atmos descriptor bitrate (overrides config)
    #[arg(long, value_name = "KBPS")]
    pub atmos_max: Option<i64>,

    /// AAC flavor: aac, aac-binaural, aac-downmix (overrides config)
    #[arg(long, value_name = "TYPE")]
    pub aac_type: Option<String>,

    /// MV audio type: atmos, ac3, aac (overrides config)
    #[arg(long, value_name = "TYPE")]
    pub mv_audio_type: Option<String>,

    /// Max MV video height (overrides config)
    #[arg(long, value_name = "HEIGHT")]
    pub mv_max: Option<i64>,

    /// Catalog URLs (or the search query with --search)
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,
}
