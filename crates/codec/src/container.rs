//! Content sniffing for archive containers.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::ArchiveError;

/// Size of a tar header block.
const TAR_BLOCK_SIZE: usize = 512;

/// Gzip member magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Offset of the `ustar` magic inside a tar header.
const USTAR_MAGIC_OFFSET: usize = 257;

/// Offset and width of the header checksum field.
const CHECKSUM_OFFSET: usize = 148;
const CHECKSUM_WIDTH: usize = 8;

/// Archive container type, determined from file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    /// Uncompressed tar stream.
    Tar,
    /// Gzip-compressed tar stream.
    GzipTar,
    /// Anything else.
    Unsupported,
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            ContainerType::Tar => "application/x-tar",
            ContainerType::GzipTar => "application/gzip",
            ContainerType::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Determine the container type of a file by reading its first block.
///
/// The file name is never consulted.
///
/// # Arguments
/// * `path` - Archive file to inspect
///
/// # Errors
/// Returns error if the file cannot be opened or read.
pub fn detect_container_type(path: &Path) -> Result<ContainerType, ArchiveError> {
    let file: File = File::open(path).map_err(|e| ArchiveError::io(path.display().to_string(), e))?;

    let mut header: Vec<u8> = Vec::with_capacity(TAR_BLOCK_SIZE);
    file.take(TAR_BLOCK_SIZE as u64)
        .read_to_end(&mut header)
        .map_err(|e| ArchiveError::io(path.display().to_string(), e))?;

    Ok(sniff(&header))
}

/// Classify a leading block of bytes.
pub fn sniff(header: &[u8]) -> ContainerType {
    if header.len() >= GZIP_MAGIC.len() && header[..GZIP_MAGIC.len()] == GZIP_MAGIC {
        return ContainerType::GzipTar;
    }

    if header.len() < TAR_BLOCK_SIZE {
        return ContainerType::Unsupported;
    }

    if &header[USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5] == b"ustar" {
        return ContainerType::Tar;
    }

    // Pre-POSIX (v7) headers carry no magic; accept them when the checksum adds up.
    if has_valid_checksum(&header[..TAR_BLOCK_SIZE]) {
        return ContainerType::Tar;
    }

    ContainerType::Unsupported
}

fn has_valid_checksum(block: &[u8]) -> bool {
    let field: &[u8] = &block[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_WIDTH];
    let digits: String = field
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect::<String>()
        .trim()
        .to_string();
    let Ok(recorded) = u32::from_str_radix(&digits, 8) else {
        return false;
    };

    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if (CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_WIDTH).contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(*b)
            }
        })
        .sum();

    // An all-zero block (end of archive) would sum to 256 with no name.
    recorded == computed && block[0] != 0
}
