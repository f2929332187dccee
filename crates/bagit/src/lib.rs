//! BagIt envelopes for rusty-archival.
//!
//! A bag pairs a payload directory with checksum manifests so the payload can
//! be verified after transfer. Two layouts are supported:
//!
//! - `Standard`: payload under `<bag>/data/`, metadata at `<bag>/`
//! - `DotFile`: payload left in place, metadata under `<bag>/.bagit/`
//!
//! [`BagManager`] is the entry point used by the storage engine.

mod error;
mod layout;
mod manager;
mod manifest;
mod verify;
mod wrap;

pub use error::BagError;
pub use layout::{is_bag, is_metadata_file_name, is_partial_bag, BagStructure, BAGIT_TXT, BAG_INFO_TXT};
pub use manager::BagManager;
pub use manifest::{decode_path, encode_path, Manifest, ManifestEntry};
pub use verify::BagVerifier;
pub use wrap::{unwrap, wrap, WrapSummary};
