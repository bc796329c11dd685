use crate::errors::MonitorError;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// The single generation kept next to the live journal.
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".1");
    PathBuf::from(name)
}

/// Keeps the live journal and its one rotated generation within
/// `budget_bytes` combined. Each generation may hold half the budget; when
/// `incoming` more bytes would push the live file past that, the live file
/// replaces the previous generation. Returns the rotated path when a
/// rotation happened.
pub fn rotate_for_append(
    path: &Path,
    incoming: u64,
    budget_bytes: u64,
) -> Result<Option<PathBuf>, MonitorError> {
    let half = budget_bytes / 2;
    if incoming > half {
        return Err(MonitorError::Io(format!(
            "journal line of {incoming} bytes exceeds half of the {budget_bytes} byte budget"
        )));
    }

    let current = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => return Err(MonitorError::Io(e.to_string())),
    };
    if current == 0 || current + incoming <= half {
        return Ok(None);
    }

    let rotated = rotated_path(path);
    fs::rename(path, &rotated).map_err(|e| MonitorError::Io(e.to_string()))?;
    Ok(Some(rotated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_path_appends_generation_suffix() {
        assert_eq!(
            rotated_path(Path::new("/var/log/monitor.jsonl")),
            PathBuf::from("/var/log/monitor.jsonl.1")
        );
    }

    #[test]
    fn missing_or_small_journal_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        assert_eq!(rotate_for_append(&path, 10, 100).expect("missing"), None);

        fs::write(&path, vec![b'x'; 30]).expect("write");
        assert_eq!(rotate_for_append(&path, 20, 100).expect("fits"), None);
        assert!(path.exists());
    }

    #[test]
    fn full_journal_replaces_previous_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        fs::write(rotated_path(&path), vec![b'o'; 50]).expect("old generation");
        fs::write(&path, vec![b'n'; 45]).expect("live");

        let rotated = rotate_for_append(&path, 10, 100).expect("rotate");
        assert_eq!(rotated, Some(rotated_path(&path)));
        assert!(!path.exists());
        assert_eq!(fs::read(rotated_path(&path)).expect("read"), vec![b'n'; 45]);
    }

    #[test]
    fn line_larger_than_a_generation_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let err = rotate_for_append(&path, 51, 100).expect_err("too large");
        assert!(matches!(err, MonitorError::Io(_)));
    }
}
