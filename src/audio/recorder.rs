//! Raw PCM capture-to-file sink

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends received PCM chunks to a file, headerless
pub struct PcmRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    bytes_written: u64,
}

impl PcmRecorder {
    /// Create (or truncate) the recording file
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        tracing::info!("Recording received audio to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            bytes_written: 0,
        })
    }

    pub fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk)?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the recording
    pub fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        tracing::info!(
            "Recording closed: {} bytes in {}",
            self.bytes_written,
            self.path.display()
        );
        Ok(self.bytes_written)
    }
}
