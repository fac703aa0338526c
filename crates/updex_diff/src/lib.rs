#![deny(missing_docs)]

//! The blob store ("diff folder") that update clients download files from.
//!
//! # Layout
//!
//! Objects are named after the path of the file in the release and its MD5
//! digest, and sharded by the last two characters of the digest:
//! ```text
//! <deploy>/diff/
//!   <last 2 hex chars>/
//!     <relative path>_<digest>
//! ```
//!
//! For example `data/map0.mul` with digest `9001…7f72` is stored at:
//! ```text
//! <deploy>/diff/72/data/map0.mul_900150983cd24fb0d6963f7d28e17f72
//! ```
//!
//! Identical content under two different paths is stored twice; the object
//! name must stay traceable to the file it came from.
//!
//! # Components
//!
//! - [`DiffStore::materialize`]: copies the files of a release into the store,
//!   skipping objects that already exist.
//! - [`collect`]: removes objects that no history references anymore.
//! - [`discover_histories`]: loads every target manifest of a deploy
//!   directory.

mod discover;
mod error;
mod gc;
mod store;

pub use discover::discover_histories;
pub use error::{DiffStoreError, GcError};
pub use gc::{collect, CollectOptions, CollectStats};
pub use store::{DiffStore, MaterializeOutcome, MaterializeReporter, MaterializeStats};

/// The name of the store directory inside a deploy directory.
pub const DIFF_DIR: &str = "diff";

/// Directory inside the store that holds partially copied files.
const TEMP_DIR_NAME: &str = ".tmp";
