use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// The kinds of records served by the api.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// A dataset.
    Dataset,

    /// A tabular dataset, one that can be queried with sql.
    Table,

    /// A map layer.
    Layer,

    /// A chart or map widget.
    Widget,

    /// Dataset metadata for one application and language.
    Metadata,

    /// A named set of tags on a dataset.
    Vocabulary,
}

impl Kind {
    /// Returns the lower-case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Dataset => "dataset",
            Kind::Table => "table",
            Kind::Layer => "layer",
            Kind::Widget => "widget",
            Kind::Metadata => "metadata",
            Kind::Vocabulary => "vocabulary",
        }
    }

    /// Returns true if a record of kind `other` should be kept when searching for this kind.
    ///
    /// Tables are datasets, so searching for datasets keeps tables too.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::Kind;
    ///
    /// assert!(Kind::Dataset.accepts(Kind::Table));
    /// assert!(!Kind::Table.accepts(Kind::Dataset));
    /// ```
    pub fn accepts(&self, other: Kind) -> bool {
        *self == other || (*self == Kind::Dataset && other == Kind::Table)
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Kind> {
        match s.to_ascii_lowercase().as_str() {
            "dataset" | "datasets" => Ok(Kind::Dataset),
            "table" | "tables" => Ok(Kind::Table),
            "layer" | "layers" => Ok(Kind::Layer),
            "widget" | "widgets" => Ok(Kind::Widget),
            "metadata" => Ok(Kind::Metadata),
            "vocabulary" | "vocabularies" => Ok(Kind::Vocabulary),
            _ => Err(Error::UnknownKind(s.to_string())),
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
