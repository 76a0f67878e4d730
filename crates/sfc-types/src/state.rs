use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an in-memory object relative to its backing store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectState {
    /// Created locally, not yet sent to the backing store.
    #[default]
    Pending,
    /// Confirmed to exist in the backing store.
    Existing,
    /// Marked for deletion; the drop happens when the parent is committed.
    ToBeDropped,
    /// Removed. Terminal.
    Dropped,
    /// Was `ToBeDropped` and re-added before the commit.
    Recreate,
}

impl ObjectState {
    /// `Existing` or `Recreate`: the backing store has (or will keep) a counterpart.
    pub fn is_live_in_store(self) -> bool {
        matches!(self, ObjectState::Existing | ObjectState::Recreate)
    }

    pub fn is_dropped(self) -> bool {
        self == ObjectState::Dropped
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectState::Pending => "Pending",
            ObjectState::Existing => "Existing",
            ObjectState::ToBeDropped => "ToBeDropped",
            ObjectState::Dropped => "Dropped",
            ObjectState::Recreate => "Recreate",
        };
        f.write_str(s)
    }
}
