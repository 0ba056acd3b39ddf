//! Named aggregate functions evaluable over one field of a table.

use serde::{Deserialize, Serialize};

/// Aggregate accepted in a FieldStats `statistic` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Population standard deviation.
    StdDev,
    /// Population variance.
    Variance,
}

impl Statistic {
    pub const ALL: [Statistic; 7] = [
        Self::Count,
        Self::Sum,
        Self::Avg,
        Self::Min,
        Self::Max,
        Self::StdDev,
        Self::Variance,
    ];

    /// Stable name stored in `field_stats.statistic`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "Count",
            Self::Sum => "Sum",
            Self::Avg => "Avg",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::StdDev => "StdDev",
            Self::Variance => "Variance",
        }
    }

    /// Parses a stored statistic name. Names are case-sensitive.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|statistic| statistic.as_str() == value)
    }

    /// Whether this aggregate only makes sense over numeric fields.
    pub fn numeric_only(self) -> bool {
        matches!(self, Self::Sum | Self::Avg | Self::StdDev | Self::Variance)
    }
}
