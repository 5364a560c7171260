//! XDG-compliant path helpers.
//!
//! Respects `XDG_DATA_HOME`, falling back to `~/.local/share`.

use std::path::PathBuf;

/// Returns the XDG data base directory for shelleyfs's own state.
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
        .map(|base| base.join("shelleyfs"))
}
