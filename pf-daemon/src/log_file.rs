//! Size-capped log file
//!
//! Appends until the next write would push the file past `max_bytes`, then
//! renames it to `<name>.1` (replacing any older backup) and starts over.
//! Used behind a `Mutex` as the writer of the JSON log layer.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub struct RotatingFile {
    path: PathBuf,
    backup: PathBuf,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = Self::append(path)?;
        let written = file.metadata()?.len();

        let mut backup = path.as_os_str().to_owned();
        backup.push(".1");

        Ok(Self {
            path: path.to_path_buf(),
            backup: PathBuf::from(backup),
            max_bytes,
            file,
            written,
        })
    }

    fn append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backup.exists() {
            fs::remove_file(&self.backup)?;
        }
        fs::rename(&self.path, &self.backup)?;
        self.file = Self::append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A single record larger than the cap still gets written whole
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
