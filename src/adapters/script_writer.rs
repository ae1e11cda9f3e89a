//! Percent-format script artifact.
//!
//! Each appended unit becomes a `# %%` cell, the cell convention understood
//! by Jupytext, VS Code and Spyder.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::ArtifactWriter;

/// Appends code cells to a script file.
pub struct ScriptArtifactWriter {
    path: PathBuf,
    cells: Mutex<usize>,
}

impl ScriptArtifactWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cells: Mutex::new(0),
        }
    }

    /// Truncate the script, creating parent directories as needed.
    pub async fn create(path: impl Into<PathBuf>) -> DomainResult<Self> {
        let writer = Self::new(path);
        if let Some(parent) = writer.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| artifact_error(parent, &e))?;
        }
        tokio::fs::write(&writer.path, b"")
            .await
            .map_err(|e| artifact_error(&writer.path, &e))?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn artifact_error(path: &Path, err: &std::io::Error) -> DomainError {
    DomainError::ArtifactFailed(format!("{}: {err}", path.display()))
}

#[async_trait]
impl ArtifactWriter for ScriptArtifactWriter {
    async fn append(&self, code: &str) -> DomainResult<()> {
        // Held across the write so cells never interleave.
        let mut cells = self.cells.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| artifact_error(&self.path, &e))?;

        let separator = if *cells == 0 { "" } else { "\n" };
        let cell = format!("{separator}# %%\n{}\n", code.trim_end());
        file.write_all(cell.as_bytes())
            .await
            .map_err(|e| artifact_error(&self.path, &e))?;
        file.flush().await.map_err(|e| artifact_error(&self.path, &e))?;

        *cells += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_cells_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("analysis.py");
        let writer = ScriptArtifactWriter::create(&path).await.unwrap();

        writer.append("import scanpy as sc\n").await.unwrap();
        writer.append("sc.tl.leiden(adata)").await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            content,
            "# %%\nimport scanpy as sc\n\n# %%\nsc.tl.leiden(adata)\n"
        );
    }

    #[tokio::test]
    async fn test_unwritable_path_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let writer = ScriptArtifactWriter::new(dir.path());
        let err = writer.append("x = 1").await.unwrap_err();
        assert!(matches!(err, DomainError::ArtifactFailed(_)));
    }
}
