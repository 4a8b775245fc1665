//! External tool discovery: ffmpeg/ffprobe, metaflac, the MP4Box
//! packager, and the MV decrypt helper.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Error;

/// Search PATH for an executable, honoring `PATHEXT` on Windows.
pub fn lookup(name: &str) -> Result<PathBuf, Error> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(Error::ToolMissing {
            name: name.to_string(),
        });
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let direct = dir.join(name);
        if direct.is_file() {
            return Ok(direct);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Ok(exe);
            }
        }
    }
    Err(Error::ToolMissing {
        name: name.to_string(),
    })
}

pub fn is_on_path(name: &str) -> bool {
    lookup(name).is_ok()
}

/// Resolve the transcoder, honoring the configured override path.
pub fn resolve_ffmpeg(config: &Config) -> Result<PathBuf, Error> {
    let configured = config.ffmpeg_path.trim();
    if configured.is_empty() {
        lookup("ffmpeg")
    } else {
        lookup(configured)
    }
}

/// Resolve the probe tool next to a non-default ffmpeg first, then on
/// PATH. Missing probe is not fatal; callers degrade with a warning.
pub fn resolve_ffprobe(ffmpeg_path: &Path) -> Option<PathBuf> {
    if let Some(dir) = ffmpeg_path.parent()
        && !dir.as_os_str().is_empty()
    {
        let sibling = dir.join("ffprobe");
        if sibling.is_file() {
            return Some(sibling);
        }
    }
    lookup("ffprobe").ok()
}

pub fn resolve_metaflac() -> Option<PathBuf> {
    lookup("metaflac").ok()
}
