//! Retailer identity
//!
//! The tag is the join key for in-run deduplication, the sink's upsert key,
//! run results and the coordinator's registry.

use crate::ScrapeError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One value per supported retailer, in registry order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Mercadona,
    Carrefour,
    Dia,
    Alcampo,
    Lidl,
    Eroski,
}

impl SourceTag {
    /// Every known tag in declaration order
    pub const ALL: [SourceTag; 6] = [
        Self::Mercadona,
        Self::Carrefour,
        Self::Dia,
        Self::Alcampo,
        Self::Lidl,
        Self::Eroski,
    ];

    /// Returns the lowercase identifier used in storage and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mercadona => "mercadona",
            Self::Carrefour => "carrefour",
            Self::Dia => "dia",
            Self::Alcampo => "alcampo",
            Self::Lidl => "lidl",
            Self::Eroski => "eroski",
        }
    }

    /// Returns the human-readable retailer name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Mercadona => "Mercadona",
            Self::Carrefour => "Carrefour",
            Self::Dia => "Dia",
            Self::Alcampo => "Alcampo",
            Self::Lidl => "Lidl",
            Self::Eroski => "Eroski",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == s)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.trim().to_ascii_lowercase())
            .ok_or_else(|| ScrapeError::UnknownSource(s.to_string()))
    }
}
