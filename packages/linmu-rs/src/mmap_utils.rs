use crate::error::{LinmuError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

/// Map a data file read-only. A file that does not exist is `MissingData`.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => LinmuError::MissingData(format!("{} does not exist", path.display())),
        _ => LinmuError::IoError(e),
    })?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}
