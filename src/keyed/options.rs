use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};


/// What a keyed cache does with a list whose key sequence equals the previous one.
///
/// Two sequences are equal when they have the same length and the same key at every position.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, FromStr, Serialize, Deserialize,
)]
#[display(style = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Apply the list and emit the (identical) ordered output again.
    Emit,
    /// Push the new item values into the views, but do not emit.
    #[default]
    ValuesOnly,
    /// Ignore the list entirely.
    Skip,
}

/// Configuration of a keyed cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyedOptions {
    pub dedup: DedupPolicy,

    /// Send `Complete` to view subscribers when their entry is disposed.
    /// Otherwise they are detached silently.
    pub complete_views_on_evict: bool,
}

impl KeyedOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn dedup(self, dedup: DedupPolicy) -> Self {
        Self { dedup, ..self }
    }
    pub fn complete_views_on_evict(self, complete_views_on_evict: bool) -> Self {
        Self {
            complete_views_on_evict,
            ..self
        }
    }
}
