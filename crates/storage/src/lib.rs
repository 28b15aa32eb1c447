//! Local file primitives for quire repositories.
//!
//! Every path handed to a [`LocalStore`] is relative to the store's root and
//! is validated with [`validate_path`] before it touches the filesystem, so a
//! store can never read or write outside the directory it was opened on.
//! Writes go through a temporary file in the destination directory and are
//! renamed into place.

pub mod error;
mod file;
mod local;
mod path;

pub use crate::file::FileInfo;
pub use crate::local::LocalStore;
pub use crate::path::validate as validate_path;
