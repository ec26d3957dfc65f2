//! Output path generation for successive files of one session.

use std::path::{Path, PathBuf};

/// Produces the path for the next output file.
///
/// Called once before capture starts and once per rotation. Every call must
/// return a path not yet used in this session; the session does not check.
pub trait PathGenerator: Send {
    fn next_path(&mut self) -> PathBuf;
}

impl<F> PathGenerator for F
where
    F: FnMut() -> PathBuf + Send,
{
    fn next_path(&mut self) -> PathBuf {
        self()
    }
}

/// `<base>_1.<ext>`, `<base>_2.<ext>`, ...
#[derive(Debug, Clone)]
pub struct SequentialPaths {
    base: PathBuf,
    extension: String,
    index: u32,
}

impl SequentialPaths {
    pub fn new(base: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            base: base.into(),
            extension: extension.to_string(),
            index: 0,
        }
    }

    /// Number of paths handed out so far.
    pub fn issued(&self) -> u32 {
        self.index
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl PathGenerator for SequentialPaths {
    fn next_path(&mut self) -> PathBuf {
        self.index += 1;
        let mut name = self
            .base
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!("_{}.{}", self.index, self.extension));
        self.base.with_file_name(name)
    }
}
