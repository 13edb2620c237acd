//! In-memory backend for exercising the runner without a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::backend::{BackendError, BackendResult, BoxFuture, MigrationBackend};

/// In-memory stand-in for the hosted database.
///
/// Tables come into existence when a `CREATE TABLE` statement naming them is
/// executed (or via [`MemoryBackend::with_table`]). Every executed statement
/// is logged. Failures can be scripted per statement substring.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, BTreeSet<String>>,
    executed: Vec<String>,
    statement_failures: Vec<(String, BackendError)>,
    lookup_failure: Option<BackendError>,
    record_failure: Option<BackendError>,
    exec_unavailable: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing bookkeeping table holding `names`.
    pub fn with_table(self, table: &str, names: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let rows = state.tables.entry(table.to_string()).or_default();
            rows.extend(names.iter().map(|n| n.to_string()));
        }
        self
    }

    /// Fail any statement containing `needle`.
    pub fn fail_statements_containing(self, needle: &str, error: BackendError) -> Self {
        self.state
            .lock()
            .unwrap()
            .statement_failures
            .push((needle.to_string(), error));
        self
    }

    /// Fail every bookkeeping lookup.
    pub fn fail_lookups(self, error: BackendError) -> Self {
        self.state.lock().unwrap().lookup_failure = Some(error);
        self
    }

    /// Fail every bookkeeping insert.
    pub fn fail_records(self, error: BackendError) -> Self {
        self.state.lock().unwrap().record_failure = Some(error);
        self
    }

    /// Behave as if the exec procedure were not installed.
    pub fn without_exec(self) -> Self {
        self.state.lock().unwrap().exec_unavailable = true;
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Names recorded in `table`, sorted.
    pub fn recorded(&self, table: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    fn missing_table(table: &str) -> BackendError {
        BackendError::from_code(
            Some("42P01".to_string()),
            format!("relation \"public.{}\" does not exist", table),
        )
    }
}

/// Table name created by a `CREATE TABLE [IF NOT EXISTS] name ...` statement.
fn created_table(sql: &str) -> Option<String> {
    let code = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut words = code.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("create") || !words.next()?.eq_ignore_ascii_case("table")
    {
        return None;
    }
    let mut name = words.next()?;
    if name.eq_ignore_ascii_case("if") {
        words.next()?;
        words.next()?;
        name = words.next()?;
    }
    let name = name.split('(').next()?;
    let name = name.rsplit('.').next()?;
    Some(name.trim_matches('"').to_string())
}

impl MigrationBackend for MemoryBackend {
    fn is_applied<'a>(&'a self, table: &'a str, name: &'a str) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if let Some(e) = &state.lookup_failure {
                return Err(e.clone());
            }
            match state.tables.get(table) {
                Some(rows) => Ok(rows.contains(name)),
                None => Err(Self::missing_table(table)),
            }
        })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.exec_unavailable {
                return Err(BackendError::from_code(
                    Some("PGRST202".to_string()),
                    "Could not find the function public.exec(sql) in the schema cache",
                ));
            }
            if let Some((_, e)) = state
                .statement_failures
                .iter()
                .find(|(needle, _)| sql.contains(needle.as_str()))
            {
                return Err(e.clone());
            }
            state.executed.push(sql.to_string());
            if let Some(table) = created_table(sql) {
                state.tables.entry(table).or_default();
            }
            Ok(())
        })
    }

    fn record_applied<'a>(
        &'a self,
        table: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(e) = &state.record_failure {
                return Err(e.clone());
            }
            let Some(rows) = state.tables.get_mut(table) else {
                return Err(Self::missing_table(table));
            };
            if !rows.insert(name.to_string()) {
                return Err(BackendError::from_code(
                    Some("23505".to_string()),
                    format!(
                        "duplicate key value violates unique constraint \"{}_pkey\"",
                        table
                    ),
                ));
            }
            Ok(())
        })
    }

    fn probe_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            if self.has_table(table) {
                Ok(())
            } else {
                Err(Self::missing_table(table))
            }
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_table() {
        assert_eq!(
            created_table("CREATE TABLE IF NOT EXISTS \"_migrations\" (name TEXT)"),
            Some("_migrations".to_string())
        );
        assert_eq!(
            created_table("create table public.notes(id int)"),
            Some("notes".to_string())
        );
        assert_eq!(
            created_table("-- bookkeeping\nCREATE TABLE IF NOT EXISTS _migrations (name text)"),
            Some("_migrations".to_string())
        );
        assert_eq!(created_table("SELECT 1"), None);
    }

    #[tokio::test]
    async fn test_duplicate_record_is_unique_violation() {
        let backend = MemoryBackend::new().with_table("_migrations", &["001.sql"]);
        let err = backend
            .record_applied("_migrations", "001.sql")
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }
}
