//! Migration data model shared by the runner and its entry points.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// File name including the `.sql` extension (e.g. `001_init.sql`).
    /// Used both as the bookkeeping key and as the sort key.
    pub name: String,
    /// Raw SQL text of the file.
    pub sql: String,
}

impl Migration {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// How a migration body is cut into statements before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Split on every `;`. Breaks statements with `;` inside literals or bodies.
    Naive,
    /// Split on `;` outside quotes, dollar-quoted blocks and comments.
    #[default]
    Quoted,
    /// Send the whole file as one statement.
    Whole,
}

/// Terminal outcome of a migration within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Skipped,
    Completed,
    CompletedButNotRecorded,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Skipped => "skipped",
            MigrationStatus::Completed => "completed",
            MigrationStatus::CompletedButNotRecorded => "completed_but_not_recorded",
            MigrationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one migration, as reported by the HTTP endpoint and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub name: String,
    pub status: MigrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationResult {
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: MigrationStatus::Skipped,
            error: None,
        }
    }

    pub fn completed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: MigrationStatus::Completed,
            error: None,
        }
    }

    pub fn not_recorded(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: MigrationStatus::CompletedButNotRecorded,
            error: Some(error.into()),
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: MigrationStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Results of a single runner invocation, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<MigrationResult>,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of migrations that ended in `status`.
    pub fn count(&self, status: MigrationStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &MigrationResult> {
        self.results
            .iter()
            .filter(|r| r.status == MigrationStatus::Failed)
    }

    /// A run succeeds when no migration failed.
    pub fn is_success(&self) -> bool {
        self.count(MigrationStatus::Failed) == 0
    }

    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Readiness of the database as seen through the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseStatus {
    Ready,
    NeedsSetup,
    Error(String),
}

impl DatabaseStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DatabaseStatus::Ready => "ready",
            DatabaseStatus::NeedsSetup => "needs-setup",
            DatabaseStatus::Error(_) => "error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            DatabaseStatus::Ready => "Database is ready".to_string(),
            DatabaseStatus::NeedsSetup => "Database needs initialization".to_string(),
            DatabaseStatus::Error(e) => format!("Database error: {}", e),
        }
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization_omits_missing_error() {
        let json = serde_json::to_value(MigrationResult::completed("001_init.sql")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "001_init.sql", "status": "completed"})
        );
    }

    #[test]
    fn test_result_serialization_with_error() {
        let json =
            serde_json::to_value(MigrationResult::not_recorded("002_b.sql", "permission denied"))
                .unwrap();
        assert_eq!(json["status"], "completed_but_not_recorded");
        assert_eq!(json["error"], "permission denied");
    }

    #[test]
    fn test_report_counts() {
        let report = RunReport {
            results: vec![
                MigrationResult::skipped("001.sql"),
                MigrationResult::completed("002.sql"),
                MigrationResult::failed("003.sql", "syntax error"),
            ],
        };
        assert_eq!(report.count(MigrationStatus::Skipped), 1);
        assert_eq!(report.failed().count(), 1);
        assert!(!report.is_success());
        assert_eq!(report.names(), vec!["001.sql", "002.sql", "003.sql"]);
    }

    #[test]
    fn test_empty_report_is_success() {
        let report = RunReport::default();
        assert!(report.is_empty());
        assert!(report.is_success());
    }

    #[test]
    fn test_split_mode_default_and_parse() {
        assert_eq!(SplitMode::default(), SplitMode::Quoted);
        let mode: SplitMode = serde_json::from_str("\"naive\"").unwrap();
        assert_eq!(mode, SplitMode::Naive);
    }

    #[test]
    fn test_database_status_labels() {
        assert_eq!(DatabaseStatus::Ready.label(), "ready");
        assert_eq!(DatabaseStatus::NeedsSetup.label(), "needs-setup");
        assert_eq!(
            DatabaseStatus::Error("timeout".into()).message(),
            "Database error: timeout"
        );
    }
}
