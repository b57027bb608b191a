use crate::CalibrationTransform;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("calibration file not found: {0}")]
    NotFound(PathBuf),
    #[error("malformed calibration file: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// Reads and writes the persisted calibration transform.
///
/// On-disk format: 16 floating-point tokens in row-major order separated by
/// `;`, bottom-right element always 1. This format is shared with earlier
/// deployments and must not change.
#[derive(Clone, Debug)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CalibrationTransform, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        let values = text
            .trim()
            .split(';')
            .map(|tok| {
                tok.trim()
                    .parse::<f32>()
                    .map_err(|_| StoreError::Malformed(format!("bad float token {tok:?}")))
            })
            .collect::<Result<Vec<f32>, StoreError>>()?;
        if values.len() != 16 {
            return Err(StoreError::Malformed(format!(
                "expected 16 values, got {n}",
                n = values.len()
            )));
        }

        let mut rows = [[0.0f32; 4]; 4];
        for (i, v) in values.into_iter().enumerate() {
            rows[i / 4][i % 4] = v;
        }
        Ok(CalibrationTransform::from_rows(rows))
    }

    pub fn save(&self, transform: &CalibrationTransform) -> Result<(), StoreError> {
        let values: Vec<String> = transform
            .rows()
            .iter()
            .flatten()
            .map(|v| v.to_string())
            .collect();
        fs::write(&self.path, values.join(";")).map_err(|e| StoreError::Io(e.to_string()))?;
        info!(path = %self.path.display(), "calibration written to file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CalibrationStore {
        CalibrationStore::new(dir.path().join("calibration.txt"))
    }

    #[test]
    fn save_then_load_round_trips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir);
        let transform = CalibrationTransform::from_rows([
            [0.866, -0.5, 0.0, 0.125],
            [0.5, 0.866, 0.0, -3.5],
            [0.0, 0.0, 1.0, 42.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);

        store.save(&transform)?;
        assert_eq!(store.load()?, transform);
        Ok(())
    }

    #[test]
    fn missing_file_is_not_found() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        match store_in(&dir).load() {
            Err(StoreError::NotFound(_)) => Ok(()),
            other => anyhow::bail!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn wrong_token_count_is_malformed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir);
        fs::write(store.path(), "1;2;3;4")?;
        match store.load() {
            Err(StoreError::Malformed(_)) => Ok(()),
            other => anyhow::bail!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_token_is_malformed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir);
        let mut tokens = vec!["1".to_string(); 16];
        tokens[7] = "banana".to_string();
        fs::write(store.path(), tokens.join(";"))?;
        match store.load() {
            Err(StoreError::Malformed(_)) => Ok(()),
            other => anyhow::bail!("expected Malformed, got {other:?}"),
        }
    }
}
