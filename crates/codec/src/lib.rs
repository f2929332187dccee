//! Tar and gzip-tar archive codec for rusty-archival.
//!
//! This crate only moves bytes in and out of containers; it knows nothing
//! about BagIt. It provides:
//!
//! - [`pack`] / [`compress`] - write a tar (optionally gzip) of files and directories
//! - [`unpack`] / [`decompress`] - stream entries back out to a directory
//! - [`unarchive`] - extract after sniffing the real container type
//! - [`detect_container_type`] - content-based container detection
//!
//! # Example
//!
//! ```ignore
//! use rusty_archival_codec::{archive_path_for, compress, unarchive};
//!
//! let output = archive_path_for(&dir, Compression::Gzip);
//! compress(&output, &[dir.clone()])?;
//! unarchive(&output, &restore_root)?;
//! ```

mod container;
mod error;
mod pack;
mod unpack;

pub use container::{detect_container_type, sniff, ContainerType};
pub use error::ArchiveError;
pub use pack::{archive, archive_path_for, compress, pack, PackSummary};
pub use unpack::{
    decompress, is_archive_name, strip_archive_extension, unarchive, unpack, UnpackSummary,
};
