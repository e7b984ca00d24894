//! Personal picture library
//!
//! Caregivers import their own photos (the child's school, a relative, a
//! favourite toy) with a label, a category and a default duration. Imported
//! files are copied under the library directory and listed in a JSON index;
//! board items refer to them by local path.

pub mod store;

pub use store::{CATEGORIES, LibraryImage, PictureLibrary, category_name};
