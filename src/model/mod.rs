//! The directory/file data model ("exhibit"): a ranked collection of
//! directory listings, each with its own filterable, orderable file set.

pub mod directory;
pub mod file;

pub use directory::{DListing, DirectoryModel};
pub use file::{DisplayCategory, FileBox, FileEntry, FileType, Ordering, Selection};

/// Notification sink a renderer implements to learn what changed in a
/// [`DirectoryModel`] without the model needing to know anything about
/// widgets. Decouples decoding/model mutation (fully unit-testable) from
/// any concrete display.
pub trait DirectoryModelSink {
    /// A frame finished decoding; the model has just been rearranged.
    fn model_changed(&mut self, model: &DirectoryModel);
}

/// A sink that does nothing, for tests and for passthrough-only mode.
#[derive(Default)]
pub struct NullSink;

impl DirectoryModelSink for NullSink {
    fn model_changed(&mut self, _model: &DirectoryModel) {}
}
