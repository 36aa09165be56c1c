//! Artifact file persistence: atomic writes, JSON/YAML load and save.
//!
//! Every file a stage produces goes through [`atomic_write`]: the payload is
//! written to a `.tmp` sibling and renamed into place, so a later stage never
//! observes a half-written artifact.

use crate::error::StageError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;

/// Atomically write raw bytes, creating parent directories as needed.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Atomically write pretty-printed JSON.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StageError> {
    let json = serde_json::to_vec_pretty(data)?;
    atomic_write(path, &json)?;
    Ok(())
}

/// Atomically write YAML (validation reports).
pub fn atomic_write_yaml<T: Serialize>(path: &Path, data: &T) -> Result<(), StageError> {
    let yaml = serde_yaml::to_string(data)?;
    atomic_write(path, yaml.as_bytes())?;
    Ok(())
}

/// Load and deserialize a JSON artifact that must exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StageError> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct RunMarker {
        stage: String,
        rows: usize,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marker.json");
        let marker = RunMarker {
            stage: "ingestion".into(),
            rows: 100,
        };

        atomic_write_json(&path, &marker).unwrap();
        let loaded: RunMarker = read_json(&path).unwrap();
        assert_eq!(loaded, marker);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir
            .path()
            .join("data_ingestion")
            .join("ingested")
            .join("train.csv");

        atomic_write(&path, b"a,b\n1,2\n").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_read_json_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_json::<RunMarker>(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StageError::Io(_)));
    }

    #[test]
    fn test_yaml_report_is_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.yaml");
        let marker = RunMarker {
            stage: "validation".into(),
            rows: 3,
        };
        atomic_write_yaml(&path, &marker).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("stage: validation"));
    }
}
