//! Flat directory of decoded images addressed by correlation key.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{error::ReframeError, identity::MessageKey};

/// Maps [`MessageKey`]s to decoded still images on disk.
///
/// Entries are written by the frame relinker and only read afterwards.
#[derive(Debug, Clone)]
pub struct ImageStore {
    directory: PathBuf,
}

impl ImageStore {
    /// Use (and create if needed) `directory` as the store.
    pub fn create<P: AsRef<Path>>(directory: P) -> Result<Self, ReframeError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where the image for `key` lives (whether or not it exists).
    pub fn path_for(&self, key: &MessageKey) -> PathBuf {
        self.directory.join(key.file_name())
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Move a decoded image into the store under `key`.
    ///
    /// Falls back to copy-and-delete when a rename is not possible, e.g.
    /// across filesystems.
    pub fn insert(&self, key: &MessageKey, image: &Path) -> Result<PathBuf, ReframeError> {
        let target = self.path_for(key);
        if fs::rename(image, &target).is_err() {
            fs::copy(image, &target)?;
            fs::remove_file(image)?;
        }
        Ok(target)
    }

    /// Delete the entry for `key`, if any.
    pub fn remove(&self, key: &MessageKey) -> Result<(), ReframeError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Read the encoded image bytes for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::ImageNotFound`] if no entry exists.
    pub fn read(&self, key: &MessageKey) -> Result<Vec<u8>, ReframeError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == ErrorKind::NotFound => Err(ReframeError::ImageNotFound {
                key: key.file_name(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Number of stored images.
    pub fn len(&self) -> Result<usize, ReframeError> {
        let mut count = 0;
        for entry in fs::read_dir(&self.directory)? {
            if entry?.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool, ReframeError> {
        Ok(self.len()? == 0)
    }
}
