use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::constants::PROBE_CONTENT;
#[cfg(unix)]
use crate::constants::PROBE_FILE_MODE;

/// A short-lived file used to prove a directory is writable.
///
/// The file is deleted when the guard is dropped, so an early return or a
/// failed write never leaves it behind.
#[derive(Debug)]
pub(crate) struct ProbeFile {
    path: PathBuf,
    removed: bool,
}

impl ProbeFile {
    /// Create `dir/name` and write the probe content.
    pub(crate) fn create(dir: &Path, name: &str) -> io::Result<ProbeFile> {
        let path = dir.join(name);
        let mut file = open_probe(&path)?;
        let guard = ProbeFile {
            path,
            removed: false,
        };
        file.write_all(PROBE_CONTENT)?;
        file.flush()?;
        Ok(guard)
    }

    /// Delete the probe, reporting failure instead of swallowing it.
    pub(crate) fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        fs::remove_file(&self.path)
    }
}

impl Drop for ProbeFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn open_probe(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PROBE_FILE_MODE);
    }
    options.open(path)
}
