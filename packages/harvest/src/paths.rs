//! Layout of the harvest data directory.
//!
//! ```text
//! <data>/
//!   data.csv              summary table
//!   <year>/<agency>.json  one cache file per partition
//! ```

use std::path::{Path, PathBuf};

/// Data directory used when none is configured.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Summary table file name used when none is configured.
pub const DEFAULT_SUMMARY_FILE: &str = "data.csv";

/// Directory holding every partition file of `year`.
#[must_use]
pub fn year_dir(data_dir: &Path, year: i32) -> PathBuf {
    data_dir.join(year.to_string())
}

/// Ensures a directory exists, creating it and its parents if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
