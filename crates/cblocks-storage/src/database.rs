//! Shared redb database handles.
//!
//! redb takes an exclusive lock on its file, so stores that live in the same
//! file share one [`Database`] handle.

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use crate::Error;

/// Open or create a database file, creating parent directories as needed.
pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Arc<Database>, Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = if path.exists() {
        Database::open(path)?
    } else {
        Database::create(path)?
    };

    tracing::info!("Database opened at {}", path.display());
    Ok(Arc::new(db))
}

/// Open a uniquely named database under the OS temp directory.
pub fn temp_database(prefix: &str) -> Result<Arc<Database>, Error> {
    let path = std::env::temp_dir().join(format!("{}_{}.redb", prefix, uuid::Uuid::new_v4()));
    open_database(path)
}
