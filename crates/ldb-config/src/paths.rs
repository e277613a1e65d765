use std::path::PathBuf;

fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
}

/// `~/.config/ldb`.
pub fn default_config_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join("ldb"))
}

/// `~/.local/share/ldb/logs/ldb.log`.
pub fn default_log_file() -> Option<PathBuf> {
    home_dir().map(|home| {
        home.join(".local")
            .join("share")
            .join("ldb")
            .join("logs")
            .join("ldb.log")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_ends_with_config_ldb() {
        if let Some(dir) = default_config_dir() {
            assert!(dir.ends_with(".config/ldb"), "got {}", dir.display());
        }
    }

    #[test]
    fn log_file_lives_under_data_dir() {
        if let Some(file) = default_log_file() {
            assert!(file.ends_with(".local/share/ldb/logs/ldb.log"));
        }
    }
}
