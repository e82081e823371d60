//! Raw input handling for class images.
//!
//! - [`io`] - big-endian primitive conversion and bounds-checked reads
//! - [`parser`] - the cursor used by every decoder in the crate
//! - [`MappedFile`] - memory-mapped class files on disk

pub mod io;
pub mod parser;

use memmap2::Mmap;
use std::{fs, path::Path};

use crate::Result;

/// A class file mapped read-only into memory.
///
/// Decoders borrow the mapped bytes through [`MappedFile::data`]; nothing is copied.
#[derive(Debug)]
pub struct MappedFile {
    // Zero-length files cannot be mapped on every platform.
    data: Option<Mmap>,
}

impl MappedFile {
    /// Open and map `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<Path>) -> Result<MappedFile> {
        let file = fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(MappedFile { data: None });
        }

        // The map is read-only; class files are not expected to change while decoded.
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(MappedFile { data: Some(mmap) })
    }

    /// The mapped bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn map_missing_file() {
        let result = MappedFile::open("/nonexistent/path/Missing.class");
        assert!(matches!(result, Err(crate::Error::FileError(_))));
    }

    #[test]
    fn map_file_contents() {
        let path = std::env::temp_dir().join(format!("classweave-map-{}.bin", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[0xCA, 0xFE, 0xBA, 0xBE]).unwrap();
        drop(file);

        let mapped = MappedFile::open(&path).unwrap();
        assert_eq!(mapped.data(), &[0xCA, 0xFE, 0xBA, 0xBE]);
        drop(mapped);

        fs::write(&path, []).unwrap();
        assert!(MappedFile::open(&path).unwrap().data().is_empty());
        fs::remove_file(&path).unwrap();
    }
}
