use std::collections::{BTreeSet, HashMap};

use ampapi::AmpClient;
use hlspick::{SelectionCaps, SelectionMode};
use reqwest::Client;

use crate::config::Config;
use crate::error::Error;
use crate::metadata::policy::MetadataPolicy;
use crate::model::Counter;

/// Download-mode flags resolved from the CLI.
#[derive(Debug, Clone, Default)]
pub struct ModeFlags {
    pub atmos: bool,
    pub aac: bool,
    pub select: bool,
    pub song: bool,
    pub debug: bool,
    pub lyrics_only: bool,
    pub covers_only: bool,
    pub no_playlist_dedupe: bool,
    pub all_album: bool,
    pub select_tracks: Option<String>,
}

/// Run-scoped context threaded through every pipeline. All mutation
/// happens on the single driver task; on-disk paths are the
/// synchronization point for idempotence.
pub struct RunContext {
    pub config: Config,
    pub flags: ModeFlags,
    pub api: AmpClient,
    pub http: Client,
    pub counter: Counter,
    /// Per-queue-item success set, keyed by queue id, holding completed
    /// 1-based task numbers for skip-on-rerun.
    pub ok_by_queue_id: HashMap<String, BTreeSet<usize>>,
    /// Set on connection-refused failures; suppresses the outer retry loop.
    pub abort_retries: bool,
    pub metadata: MetadataPolicy,
    pub tools: ToolState,
}

/// Once-per-run tool discovery and warning state.
#[derive(Debug, Default)]
pub struct ToolState {
    pub alac_at_available: Option<bool>,
    pub warned_alac_at_fallback: bool,
    pub warned_ffprobe_missing: bool,
    pub metaflac_path: Option<Option<std::path::PathBuf>>,
    pub warned_metaflac_missing: bool,
}

impl RunContext {
    pub fn new(config: Config, flags: ModeFlags, api: AmpClient, http: Client) -> Self {
        let metadata = MetadataPolicy::from_env(&config, flags.atmos, flags.aac);
        Self {
            config,
            flags,
            api,
            http,
            counter: Counter::default(),
            ok_by_queue_id: HashMap::new(),
            abort_retries: false,
            metadata,
            tools: ToolState::default(),
        }
    }

    pub fn media_user_token(&self) -> &str {
        &self.config.media_user_token
    }

    /// A media-user-token shorter than this is treated as unset.
    pub fn has_media_user_token(&self) -> bool {
        self.config.media_user_token.len() > 50
    }

    pub fn codec_label(&self) -> &'static str {
        if self.flags.atmos {
            "ATMOS"
        } else if self.flags.aac {
            "AAC"
        } else {
            "ALAC"
        }
    }

    pub fn selection_mode(&self) -> SelectionMode {
        if self.flags.atmos {
            SelectionMode::Atmos
        } else if self.flags.aac {
            SelectionMode::Aac
        } else {
            SelectionMode::Alac
        }
    }

    pub fn selection_caps(&self) -> SelectionCaps {
        SelectionCaps {
            alac_max: self.config.alac_max,
            atmos_max: self.config.atmos_max,
            aac_type: self.config.aac_type.clone(),
        }
    }

    /// AAC-LC goes through the webplayback single-file path instead of the
    /// HLS variant resolver.
    pub fn is_aac_lc(&self) -> bool {
        self.flags.aac && self.config.aac_type == "aac-lc"
    }

    pub fn mark_abort_retries(&mut self, err: &Error) {
        if err.is_connection_refused() {
            self.abort_retries = true;
        }
    }

    pub fn record_ok(&mut self, queue_id: &str, task_num: usize) {
        self.ok_by_queue_id
            .entry(queue_id.to_string())
            .or_default()
            .insert(task_num);
    }

    pub fn already_ok(&self, queue_id: &str, task_num: usize) -> bool {
        self.ok_by_queue_id
            .get(queue_id)
            .is_some_and(|set| set.contains(&task_num))
    }
}
