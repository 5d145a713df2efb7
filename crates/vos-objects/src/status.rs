use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{VomError, VomResult};

/// Whether a slot is known to be held outside this process's heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    /// Exported and currently held by someone else; keeps the object alive.
    Reachable,
    /// Exported once, still comparable by identity, but not held.
    Recognizable,
    /// Never exported, or the export was retired.
    #[default]
    None,
}

impl ExportStatus {
    /// Stored form; `None` is stored as an absent key.
    pub(crate) fn code(self) -> Option<&'static str> {
        match self {
            Self::Reachable => Some("r"),
            Self::Recognizable => Some("s"),
            Self::None => None,
        }
    }

    pub(crate) fn from_code(key: &str, code: Option<&str>) -> VomResult<Self> {
        match code {
            Some("r") => Ok(Self::Reachable),
            Some("s") => Ok(Self::Recognizable),
            None => Ok(Self::None),
            Some(other) => Err(VomError::Corrupt {
                key: key.to_string(),
                reason: format!("unknown export status {other:?}"),
            }),
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reachable => "reachable",
            Self::Recognizable => "recognizable",
            Self::None => "none",
        })
    }
}
