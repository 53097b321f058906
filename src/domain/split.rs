use serde::{Deserialize, Serialize};

/// Which part of the corpus a batch is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    #[serde(rename = "val")]
    Validation,
}

impl Split {
    pub fn is_train(self) -> bool {
        matches!(self, Split::Train)
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train      => f.pad("train"),
            Split::Validation => f.pad("val"),
        }
    }
}
