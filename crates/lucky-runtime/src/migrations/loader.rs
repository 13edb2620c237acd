use std::path::Path;

use lucky_core::error::{LuckyError, Result};
use lucky_core::migration::Migration;
use tracing::debug;

/// Load migrations from a directory.
///
/// Every `*.sql` file becomes one migration named after its file name
/// (extension included). They are sorted by name, so `001_init.sql` runs
/// before `002_add_table.sql`. A missing directory is an error.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    if !dir.is_dir() {
        return Err(LuckyError::MigrationsDirNotFound(dir.to_path_buf()));
    }

    let mut migrations = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            debug!("Skipping non UTF-8 file name: {:?}", path);
            continue;
        };

        if !name.ends_with(".sql") {
            continue;
        }

        let sql = std::fs::read_to_string(&path)?;
        migrations.push(Migration::new(name, sql));
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));

    debug!("Loaded {} migrations from {}", migrations.len(), dir.display());
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_empty_dir() {
        let dir = TempDir::new().unwrap();
        let migrations = load_migrations(dir.path()).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_from_nonexistent_dir() {
        let err = load_migrations(Path::new("/nonexistent/migrations")).unwrap_err();
        assert!(matches!(err, LuckyError::MigrationsDirNotFound(_)));
    }

    #[test]
    fn test_load_sorted_lexically() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("002_b.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("010_c.sql"), "SELECT 10;").unwrap();

        let migrations = load_migrations(dir.path()).unwrap();
        let names: Vec<_> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["001_a.sql", "002_b.sql", "010_c.sql"]);
        assert_eq!(migrations[0].sql, "SELECT 1;");
    }

    #[test]
    fn test_lexical_not_numeric_order() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("10_late.sql"), "").unwrap();
        fs::write(dir.path().join("9_early.sql"), "").unwrap();

        let migrations = load_migrations(dir.path()).unwrap();
        assert_eq!(migrations[0].name, "10_late.sql");
        assert_eq!(migrations[1].name, "9_early.sql");
    }

    #[test]
    fn test_load_ignores_non_sql_and_subdirs() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("001_init.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("readme.txt"), "Not a migration").unwrap();
        fs::write(dir.path().join("backup.sql.bak"), "Backup").unwrap();
        fs::create_dir(dir.path().join("archive.sql")).unwrap();

        let migrations = load_migrations(dir.path()).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].name, "001_init.sql");
    }
}
