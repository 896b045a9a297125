use crate::db::Database;
use tempfile::NamedTempFile;

mod preferences;

/// Open a fresh database backed by a temp file.
///
/// The temp file must outlive the Database or SQLite loses its backing store.
pub(crate) async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}
