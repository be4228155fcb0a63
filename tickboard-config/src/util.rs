use std::path::{Path, PathBuf};

/// Expand a leading `~` to `home`. Other paths are returned unchanged.
pub fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return path.to_path_buf();
    };

    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Trim, drop a leading dot and lowercase each extension; empty entries
/// are discarded.
pub fn normalize_extensions(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
