use serde::{Deserialize, Serialize};

use finbench_valuation_core::ValueRecord;

/// Lookup tables a relational fact row points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Family,
    Series,
    Attribute,
    SourceFile,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 4] = [
        ReferenceKind::Family,
        ReferenceKind::Series,
        ReferenceKind::Attribute,
        ReferenceKind::SourceFile,
    ];

    /// Name this record refers to in the given table, if any.
    pub fn name_in(self, record: &ValueRecord) -> Option<&str> {
        match self {
            ReferenceKind::Family => Some(&record.family),
            ReferenceKind::Series => Some(&record.series),
            ReferenceKind::Attribute => Some(&record.attribute),
            ReferenceKind::SourceFile => record.source_file.as_deref().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    pub name: String,
    pub description: String,
    pub internal_code: String,
}

impl ReferenceEntity {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        internal_code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            internal_code: internal_code.into(),
        }
    }

    /// Placeholder entity created on first sight of a name during a write.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            internal_code: name.to_lowercase(),
            name,
        }
    }
}

/// A fact joined to the reference rows it points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueWithReferences {
    pub record: ValueRecord,
    pub family: ReferenceEntity,
    pub series: ReferenceEntity,
    pub attribute: ReferenceEntity,
    pub source_file: Option<ReferenceEntity>,
}
