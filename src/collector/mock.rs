//! In-memory filesystem for exercising the collectors without a real `/proc`.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem keyed by absolute path.
///
/// Tests populate it with `/proc` fixtures and hand it to the collectors in
/// place of [`super::traits::RealFs`].
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    directories: HashSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, creating parent directories implicitly.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }

        self.files.insert(path, content.into());
    }

    /// Adds an empty directory (and its parents).
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.directories.insert(path.clone());

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Adds `/proc/<pid>/stat` plus a single-thread task directory, the
    /// minimum for a process to survive enumeration and the task walk.
    pub fn add_process(&mut self, pid: u32, stat: &str) {
        self.add_file(format!("/proc/{pid}/stat"), stat);
        self.add_task(pid, pid as i32, stat);
    }

    /// Adds `/proc/<pid>/task/<tid>/stat`.
    pub fn add_task(&mut self, pid: u32, tid: i32, stat: &str) {
        self.add_file(format!("/proc/{pid}/task/{tid}/stat"), stat);
    }

    /// Adds the detail files read only for filtered processes.
    pub fn add_process_detail(&mut self, pid: u32, status: &str, io: &str) {
        self.add_file(format!("/proc/{pid}/status"), status);
        self.add_file(format!("/proc/{pid}/io"), io);
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("file not found: {path:?}"))
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {path:?}"),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_file_creates_parents() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/1/stat", "1 (init) S");

        let entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            fs.read_to_string(Path::new("/proc/1/stat")).unwrap(),
            "1 (init) S"
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let fs = MockFs::new();
        let err = fs.read_to_string(Path::new("/proc/42/stat")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn add_process_registers_task_dir() {
        let mut fs = MockFs::new();
        fs.add_process(100, "100 (x) S 0 0 0 0 0 0 0 0 0 0 0 0 0 0");

        let tasks = fs.read_dir(Path::new("/proc/100/task")).unwrap();
        assert_eq!(tasks.len(), 1);
    }
}
