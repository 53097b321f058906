// ============================================================
// Layer 3 — Training Objective
// ============================================================
// The objective decides which sample shapes a corpus may contain
// and which batch layout the assembler produces:
//
//   Pretrain     continuous windows or instruction records
//   Instruction  continuous windows or instruction records
//   Preference   preference pairs only, collated into four tensors
//
// Raw token streams carry no structure, so they are only valid
// for pretraining; that rule lives with the format registry.

use serde::{Deserialize, Serialize};

use crate::domain::sample::SampleKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    #[default]
    Pretrain,
    Instruction,
    Preference,
}

impl Objective {
    /// Whether samples of `kind` can be fed to this objective.
    pub fn accepts(self, kind: SampleKind) -> bool {
        match self {
            Objective::Preference => kind == SampleKind::PreferencePair,
            Objective::Pretrain | Objective::Instruction => kind != SampleKind::PreferencePair,
        }
    }

    pub fn is_preference(self) -> bool {
        matches!(self, Objective::Preference)
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Objective::Pretrain    => "pretrain",
            Objective::Instruction => "instruction",
            Objective::Preference  => "preference",
        };
        f.write_str(name)
    }
}
