use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Mirrors task output to one file per task under a configured folder, so
/// logs survive the session. Optional; disabled by configuration.
#[derive(Debug, Clone)]
pub struct OutputLog {
    folder: PathBuf,
}

impl OutputLog {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// Appends raw output lines for `task_id`. The lines already carry their
    /// own newlines, as received from the backend.
    pub fn append(&self, task_id: &str, lines: &[String]) -> Result<()> {
        fs::create_dir_all(&self.folder)
            .with_context(|| format!("create output folder {}", self.folder.display()))?;
        let path = self.folder.join(format!("{task_id}.log"));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open output log {}", path.display()))?;
        for line in lines {
            file.write_all(line.as_bytes())
                .with_context(|| format!("append to {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_accumulate_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let log = OutputLog::new(dir.path().join("output"));

        log.append("t1", &["hello\n".into()]).unwrap();
        log.append("t1", &["world\n".into()]).unwrap();
        log.append("t2", &["other\n".into()]).unwrap();

        let t1 = fs::read_to_string(dir.path().join("output/t1.log")).unwrap();
        assert_eq!(t1, "hello\nworld\n");
        let t2 = fs::read_to_string(dir.path().join("output/t2.log")).unwrap();
        assert_eq!(t2, "other\n");
    }
}
