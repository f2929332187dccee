//! Shared constants used across rusty-archival crates.

/// One kibibyte.
pub const KIB: u64 = 1024;

/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;

/// One gibibyte.
pub const GIB: u64 = 1024 * MIB;

/// Buffer size used when streaming files through a digest (64KB).
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Default multipart part size in MiB.
pub const DEFAULT_PART_SIZE_MIB: u64 = 8;

/// Free space kept in reserve on top of every space preflight (1 GiB).
pub const SPACE_HEADROOM_BYTES: u64 = GIB;

/// Multiplier applied to the compressed object size when the
/// uncompressed-size tag is missing or unreadable.
pub const DEFAULT_UNCOMPRESSED_SIZE_MULTIPLIER: u64 = 2;

/// Object metadata key holding the uncompressed payload size in bytes.
pub const UNCOMPRESSED_SIZE_METADATA_KEY: &str = "uncompressedsize";

/// Object metadata key holding the part size (MiB) used at upload time.
pub const PART_SIZE_METADATA_KEY: &str = "partsize";

/// Maximum number of manifest entries checked per verification batch.
pub const VERIFY_BATCH_SIZE: usize = 100;

/// Maximum number of parts a multipart upload may contain.
pub const MAX_MULTIPART_PARTS: u64 = 10_000;

/// Objects larger than this are copied with a multipart server-side copy (5 GiB).
pub const MULTIPART_COPY_THRESHOLD: u64 = 5 * GIB;

/// Progress is reported every time this percentage of the total is crossed.
pub const PROGRESS_STEP_PERCENT: u64 = 5;

/// Directory name used by the dot-file bag layout.
pub const DOT_BAGIT_DIR: &str = ".bagit";

/// Payload directory name used by the standard bag layout.
pub const BAG_PAYLOAD_DIR: &str = "data";
