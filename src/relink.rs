//! Pairing decoded images with the messages they came from.

use std::path::PathBuf;

use crate::{error::ReframeError, identity::MessageKey, store::ImageStore};

/// Move the `i`-th decoded image into the store under the `i`-th key.
///
/// `keys` is in arrival order, `images` in decode order. The operation is
/// all-or-nothing for the channel: a length mismatch moves nothing, and a
/// failed move undoes the moves made before it.
///
/// Returns the number of images linked.
///
/// # Errors
///
/// Returns [`ReframeError::FrameCountMismatch`] if the lists differ in
/// length, or the I/O error of the failed move.
pub fn relink(
    topic: &str,
    keys: &[MessageKey],
    images: &[PathBuf],
    store: &ImageStore,
) -> Result<usize, ReframeError> {
    if keys.len() != images.len() {
        return Err(ReframeError::FrameCountMismatch {
            topic: topic.to_string(),
            expected: keys.len(),
            actual: images.len(),
        });
    }

    let mut linked: Vec<&MessageKey> = Vec::with_capacity(keys.len());
    for (key, image) in keys.iter().zip(images) {
        if let Err(error) = store.insert(key, image) {
            for key in linked {
                if let Err(undo_error) = store.remove(key) {
                    log::warn!("Failed to unlink {key} after aborted relink: {undo_error}");
                }
            }
            return Err(error);
        }
        linked.push(key);
    }

    log::debug!("Linked {} images for {topic}", linked.len());
    Ok(linked.len())
}
