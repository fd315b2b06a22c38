use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

use crate::logi;
use crate::persistence::{JOBS_COLLECTION, SETS_COLLECTION};

const REQUIRED_DIRS: &[&str] = &[JOBS_COLLECTION, SETS_COLLECTION];

/// Creates the data directory layout used by the file store.
pub async fn ensure_directories(data_dir: &Path) -> Result<()> {
    for dir in REQUIRED_DIRS {
        let path = data_dir.join(dir);
        if !path.exists() {
            fs::create_dir_all(&path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            logi(format!("Created directory: {}", path.display()));
        }
    }
    Ok(())
}
