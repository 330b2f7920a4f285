use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Highest numbered suffix tried before giving up on a filename.
const MAX_CONFLICT_SUFFIX: u32 = 1000;

/// Writes downloaded images into the image directory.
pub struct ImageStorage {
    image_directory: PathBuf,
}

impl ImageStorage {
    pub fn new<P: AsRef<Path>>(image_directory: P) -> Self {
        Self {
            image_directory: image_directory.as_ref().to_path_buf(),
        }
    }

    pub fn image_directory(&self) -> &Path {
        &self.image_directory
    }

    /// Stores `content` as `filename`. An existing file is never
    /// overwritten; `name_2.png`, `name_3.png`... are tried instead.
    pub fn store(&self, content: &[u8], filename: &str) -> Result<PathBuf, StorageError> {
        self.ensure_directory(&self.image_directory)?;

        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            None => (filename, None),
        };

        for counter in 1..=MAX_CONFLICT_SUFFIX {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = self.image_directory.join(&try_filename);

            // create_new fails if the file exists, so check and create are one step
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(content) {
                        let _ = std::fs::remove_file(&try_path);
                        return Err(StorageError::WriteFile {
                            path: try_path,
                            source: e,
                        });
                    }
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(self.image_directory.join(filename)))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
