//! Multipart part planning.
//!
//! Pure logic for multipart decisions. No I/O operations - just the part
//! layout shared by uploads, ranged downloads and composite checksums.

use rusty_archival_common::MAX_MULTIPART_PARTS;

/// Information about a single part of a large file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartInfo {
    /// One-based part number.
    pub number: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length of this part in bytes.
    pub length: u64,
}

/// Determine if a file needs a multipart transfer.
///
/// Files larger than `part_size` are split into parts.
/// If `part_size` is 0, multipart is disabled.
pub fn needs_multipart(size: u64, part_size: u64) -> bool {
    part_size > 0 && size > part_size
}

/// Part size that keeps a file within the backend's part-count limit.
///
/// # Arguments
/// * `size` - Total file size in bytes
/// * `part_size` - Requested part size in bytes
///
/// # Returns
/// `max(ceil(size / 10000), part_size)`.
pub fn optimal_part_size(size: u64, part_size: u64) -> u64 {
    size.div_ceil(MAX_MULTIPART_PARTS).max(part_size)
}

/// Generate part information for a file.
///
/// Splits a file of `size` bytes into parts of `part_size` bytes.
/// The last part may be smaller than `part_size`.
///
/// # Returns
/// Vector of PartInfo describing each part's offset and length.
/// Returns a single part for files no larger than `part_size`.
pub fn generate_parts(size: u64, part_size: u64) -> Vec<PartInfo> {
    if part_size == 0 || size == 0 {
        return vec![PartInfo {
            number: 1,
            offset: 0,
            length: size,
        }];
    }

    let mut parts: Vec<PartInfo> = Vec::new();
    let mut offset: u64 = 0;
    let mut number: u32 = 1;

    while offset < size {
        let length: u64 = std::cmp::min(part_size, size - offset);
        parts.push(PartInfo {
            number,
            offset,
            length,
        });
        offset += length;
        number += 1;
    }

    parts
}

/// Calculate the expected number of parts for a file.
pub fn expected_part_count(size: u64, part_size: u64) -> usize {
    if part_size == 0 || size == 0 {
        return 1;
    }
    size.div_ceil(part_size) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_archival_common::MIB;

    const PART: u64 = 8 * MIB;

    #[test]
    fn test_needs_multipart() {
        assert!(!needs_multipart(100, PART));
        assert!(!needs_multipart(PART, PART));
        assert!(needs_multipart(PART + 1, PART));
        assert!(!needs_multipart(1_000_000_000, 0));
    }

    #[test]
    fn test_generate_parts_small_file() {
        let parts: Vec<PartInfo> = generate_parts(1000, PART);
        assert_eq!(parts, vec![PartInfo { number: 1, offset: 0, length: 1000 }]);
    }

    #[test]
    fn test_generate_parts_with_remainder() {
        let parts: Vec<PartInfo> = generate_parts(250, 100);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], PartInfo { number: 1, offset: 0, length: 100 });
        assert_eq!(parts[1], PartInfo { number: 2, offset: 100, length: 100 });
        assert_eq!(parts[2], PartInfo { number: 3, offset: 200, length: 50 });
    }

    #[test]
    fn test_fifty_mib_in_eight_mib_parts() {
        let size: u64 = 50 * MIB;
        let parts: Vec<PartInfo> = generate_parts(size, PART);
        assert_eq!(parts.len(), 7);
        assert_eq!(parts[6].offset, 48 * MIB);
        assert_eq!(parts[6].length, 2 * MIB);
        assert_eq!(expected_part_count(size, PART), 7);
    }

    #[test]
    fn test_expected_part_count() {
        assert_eq!(expected_part_count(0, PART), 1);
        assert_eq!(expected_part_count(PART, PART), 1);
        assert_eq!(expected_part_count(PART + 1, PART), 2);
        assert_eq!(expected_part_count(PART * 2 + 1, PART), 3);
    }

    #[test]
    fn test_optimal_part_size() {
        assert_eq!(optimal_part_size(50 * MIB, PART), PART);
        // 100 GB would need 11,921 parts of 8 MiB.
        let huge: u64 = 100_000_000_000;
        let part: u64 = optimal_part_size(huge, PART);
        assert_eq!(part, 10_000_000);
        assert!(expected_part_count(huge, part) <= MAX_MULTIPART_PARTS as usize);
    }
}
