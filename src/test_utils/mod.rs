//! Test utilities for redtriage
//!
//! Shared helpers for the unit test modules.

#![cfg(test)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// An in-memory log sink that can be cloned into a `LogFacade` and
/// inspected afterwards.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Complete lines written so far, without their newlines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes `redtriage.<ext>` with the given YAML into `dir`.
pub fn write_config_file(dir: &Path, ext: &str, yaml: &str) -> PathBuf {
    let path = dir.join(format!("redtriage.{}", ext));
    fs::write(&path, yaml).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_buffer_clones_share_storage() {
        let buffer = SharedBuffer::default();
        let mut writer = buffer.clone();
        writer.write_all(b"one\ntwo\n").unwrap();
        assert_eq!(buffer.lines(), vec!["one", "two"]);
    }
}
