use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory where session state and transcripts are persisted.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// How many prior messages (most recent first) are passed to the
    /// generation backend as history.
    #[serde(default = "d_history_window")]
    pub history_window: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            history_window: d_history_window(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_history_window() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_window_default() {
        let cfg: SessionsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.history_window, 10);
    }
}
