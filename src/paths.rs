//! Default locations under the user's home directory.

use std::path::PathBuf;

/// Directory under the home directory holding the keyword table and database
pub const DATA_DIR: &str = ".word_estimator";

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR)
}

pub fn default_keywords_path() -> PathBuf {
    data_dir().join("keywords.csv")
}

pub fn default_database_path() -> PathBuf {
    data_dir().join("estimates.db")
}
