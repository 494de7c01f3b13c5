//! Configuration for the batch dispatcher.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do when two jobs in one batch map to the same output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Append `-1`, `-2`, ... to the stem of later duplicates.
    #[default]
    Suffix,
    /// Let the last written item win.
    Overwrite,
}

/// Configuration for [`BatchDispatcher`](super::BatchDispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Output directory chosen at startup, if any.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub collision_policy: CollisionPolicy,

    /// Remove completed jobs shortly after a batch finishes.
    #[serde(default = "default_auto_clear")]
    pub auto_clear_completed: bool,

    #[serde(default = "default_clear_delay_ms")]
    pub clear_completed_delay_ms: u64,
}

fn default_auto_clear() -> bool {
    true
}

fn default_clear_delay_ms() -> u64 {
    1500
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            collision_policy: CollisionPolicy::default(),
            auto_clear_completed: default_auto_clear(),
            clear_completed_delay_ms: default_clear_delay_ms(),
        }
    }
}

impl BatchConfig {
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn with_auto_clear(mut self, enabled: bool) -> Self {
        self.auto_clear_completed = enabled;
        self
    }

    pub fn with_clear_delay_ms(mut self, delay_ms: u64) -> Self {
        self.clear_completed_delay_ms = delay_ms;
        self
    }
}
