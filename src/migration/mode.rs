use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::BqdmError;

/// How existing rows reach a changed table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    /// Overwrite the table in place with a projecting query.
    #[default]
    SelectInsert,
    SelectInsertBackup,
    /// Stage rows in a temporary table, recreate the target, copy back.
    Replace,
    ReplaceBackup,
    /// Recreate the target empty.
    DropCreate,
    DropCreateBackup,
}

/// The step sequence a mode runs, independent of its backup flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SelectInsert,
    Replace,
    DropCreate,
}

impl MigrationMode {
    pub const ALL: [MigrationMode; 6] = [
        MigrationMode::SelectInsert,
        MigrationMode::SelectInsertBackup,
        MigrationMode::Replace,
        MigrationMode::ReplaceBackup,
        MigrationMode::DropCreate,
        MigrationMode::DropCreateBackup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationMode::SelectInsert => "select_insert",
            MigrationMode::SelectInsertBackup => "select_insert_backup",
            MigrationMode::Replace => "replace",
            MigrationMode::ReplaceBackup => "replace_backup",
            MigrationMode::DropCreate => "drop_create",
            MigrationMode::DropCreateBackup => "drop_create_backup",
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            MigrationMode::SelectInsert | MigrationMode::SelectInsertBackup => Strategy::SelectInsert,
            MigrationMode::Replace | MigrationMode::ReplaceBackup => Strategy::Replace,
            MigrationMode::DropCreate | MigrationMode::DropCreateBackup => Strategy::DropCreate,
        }
    }

    pub fn with_backup(&self) -> bool {
        matches!(
            self,
            MigrationMode::SelectInsertBackup
                | MigrationMode::ReplaceBackup
                | MigrationMode::DropCreateBackup
        )
    }
}

impl FromStr for MigrationMode {
    type Err = BqdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = MigrationMode::ALL.iter().map(|m| m.as_str()).collect();
                BqdmError::Config(format!(
                    "Unknown migration mode '{}'. Expected one of: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

impl fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_modes() {
        for mode in MigrationMode::ALL {
            assert_eq!(mode.as_str().parse::<MigrationMode>().unwrap(), mode);
        }
        assert_eq!("REPLACE".parse::<MigrationMode>().unwrap(), MigrationMode::Replace);
    }

    #[test]
    fn test_unknown_mode() {
        let err = "select_insert_empty".parse::<MigrationMode>().unwrap_err();
        assert!(err.to_string().contains("drop_create_backup"));
    }

    #[test]
    fn test_backup_flag_and_strategy() {
        assert!(!MigrationMode::SelectInsert.with_backup());
        assert!(MigrationMode::DropCreateBackup.with_backup());
        assert_eq!(MigrationMode::ReplaceBackup.strategy(), Strategy::Replace);
        assert_eq!(MigrationMode::default(), MigrationMode::SelectInsert);
    }
}
