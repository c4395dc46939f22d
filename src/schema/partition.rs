use std::fmt;
use serde::{Deserialize, Serialize};

/// Time-unit partitioning of a base table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitioningType {
    Hour,
    Day,
    Month,
    Year,
}

impl PartitioningType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitioningType::Hour => "HOUR",
            PartitioningType::Day => "DAY",
            PartitioningType::Month => "MONTH",
            PartitioningType::Year => "YEAR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "HOUR" => Some(PartitioningType::Hour),
            "DAY" => Some(PartitioningType::Day),
            "MONTH" => Some(PartitioningType::Month),
            "YEAR" => Some(PartitioningType::Year),
            _ => None,
        }
    }
}

impl fmt::Display for PartitioningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(PartitioningType::parse("day"), Some(PartitioningType::Day));
        assert_eq!(PartitioningType::parse("HOUR"), Some(PartitioningType::Hour));
        assert_eq!(PartitioningType::parse("weekly"), None);
    }

    #[test]
    fn test_yaml_uppercase() {
        let p: PartitioningType = serde_yaml::from_str("DAY").unwrap();
        assert_eq!(p, PartitioningType::Day);
        assert_eq!(serde_yaml::to_string(&p).unwrap().trim(), "DAY");
    }
}
