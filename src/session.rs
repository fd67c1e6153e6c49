//! Exclusive access to a document.
//!
//! Only one parse, merge or serialize call may drive a document at a time.
//! The lock is not reentrant: a nested call on the same session fails with
//! [`MetadataError::Busy`] instead of deadlocking.

use crate::document::MetadataDocument;
use crate::error::{MetadataError, Result};
use crate::tree::TreeNode;
use crate::tree_codec::TreeFormat;
use std::io::Write;
use std::sync::{Mutex, TryLockError};

#[derive(Debug)]
pub struct MetadataSession {
    document: Mutex<MetadataDocument>,
}

impl MetadataSession {
    pub fn new(document: MetadataDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    /// Runs `f` with the document locked. The lock is released when `f`
    /// returns, on success and on error alike.
    pub fn with_document<T>(&self, f: impl FnOnce(&mut MetadataDocument) -> Result<T>) -> Result<T> {
        let mut guard = match self.document.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(MetadataError::Busy),
            // Edits commit atomically, so a panic mid-call leaves the last
            // committed sequence in place.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn to_tree(&self, format: TreeFormat) -> Result<TreeNode> {
        self.with_document(|document| crate::to_tree(document, format))
    }

    pub fn merge_tree(&self, root: &TreeNode, format: TreeFormat) -> Result<()> {
        self.with_document(|document| crate::merge_tree(document, root, format))
    }

    pub fn serialize<W: Write>(&self, destination: W) -> Result<W> {
        self.with_document(|document| crate::serialize_metadata(document, destination))
    }

    pub fn into_document(self) -> MetadataDocument {
        self.document
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
