//! This module decodes the structures YAFFS2 writes to NAND, without mounting the volume.
//!
//! Every chunk YAFFS2 writes occupies one page, and its spare area carries a tag saying which
//! object the chunk belongs to and where in that object it goes. Chunk 0 of an object is its
//! object header, which holds the name, type, ownership and size of the file, directory, link or
//! device node:
//!
//! ```text
//!  page (chunk 0)                    spare
//! +-------------------------------+ +----+------------------------------+-----+
//! | type | parent | 0xFFFF | name | | BB | seq | obj id | chunk id | n  | ECC |
//! | mode | uid | gid | times ...  | +----+------------------------------+-----+
//! +-------------------------------+
//! ```
//!
//! Header tags reuse the chunk id and object id fields to carry a few extra bits of header
//! information (see [tags::TagKind]), so the decoder must look at the header-info flag before it
//! can decide what the fields mean.
//!
//! The page and spare sizes are not recorded anywhere on the flash, so [detect] guesses them from
//! the first two records, and [scan] then walks the whole image under that geometry.

pub mod detect;
pub mod header;
pub mod scan;
pub mod tags;

pub use detect::{detect_geometry, DetectionCandidates};
pub use header::{ObjectHeader, ObjectType};
pub use scan::{scan, Scan, ScanStats};
pub use tags::{SpareTag, TagKind};

/// Longest name an object header can hold, not counting the terminating nul
pub const MAX_NAME_LENGTH: usize = 255;

/// Longest symlink target an object header can hold, not counting the terminating nul
pub const MAX_ALIAS_LENGTH: usize = 159;

// Pseudo-objects with fixed ids
pub const OBJECTID_ROOT: u32 = 1;
pub const OBJECTID_LOSTNFOUND: u32 = 2;
pub const OBJECTID_UNLINKED: u32 = 3;
pub const OBJECTID_DELETED: u32 = 4;
pub const OBJECTID_SUMMARY: u32 = 0x10;

/// Ordinary object ids start past the hash buckets
const NOBJECT_BUCKETS: u32 = 256;
const OBJECT_SPACE: u32 = 0x40000;
pub const MAX_OBJECT_ID: u32 = OBJECT_SPACE - 1;

pub const LOWEST_SEQUENCE_NUMBER: u32 = 0x0000_1000;
pub const HIGHEST_SEQUENCE_NUMBER: u32 = 0xefff_ff00;

/// Written to blocks that went bad but could not be marked as such
pub const SEQUENCE_BAD_BLOCK: u32 = 0xffff_0000;

// Chunks are addressed through a tree of tnodes: 4 bits at level 0, 3 at each of 8 levels above.
const TNODES_LEVEL0_BITS: u32 = 4;
const TNODES_INTERNAL_BITS: u32 = TNODES_LEVEL0_BITS - 1;
const TNODES_MAX_LEVEL: u32 = 8;
const TNODES_MAX_BITS: u32 = TNODES_LEVEL0_BITS + TNODES_INTERNAL_BITS * TNODES_MAX_LEVEL;
pub const MAX_CHUNK_ID: u32 = (1 << TNODES_MAX_BITS) - 1;

/// Does `objectid` name a pseudo-object or fall within the ordinary object space?
pub fn object_id_valid(objectid: u32) -> bool {
    match objectid {
        OBJECTID_ROOT | OBJECTID_LOSTNFOUND | OBJECTID_UNLINKED | OBJECTID_DELETED
        | OBJECTID_SUMMARY => true,
        _ => (NOBJECT_BUCKETS..=MAX_OBJECT_ID).contains(&objectid),
    }
}

/// Is `seq` a sequence number YAFFS2 could have written to a good block?
pub fn sequence_number_valid(seq: u32) -> bool {
    seq != SEQUENCE_BAD_BLOCK && (LOWEST_SEQUENCE_NUMBER..HIGHEST_SEQUENCE_NUMBER).contains(&seq)
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_object_id_valid() {
        for id in [1, 2, 3, 4, 16, 256, 0x1234, 0x3ffff] {
            assert!(object_id_valid(id), "{id:#x}");
        }
        for id in [0, 5, 15, 17, 255, 0x40000, 0xffff_ffff] {
            assert!(!object_id_valid(id), "{id:#x}");
        }
    }

    #[test]
    fn test_limits() {
        assert_eq!(MAX_CHUNK_ID, 0x0fff_ffff);
        assert_eq!(MAX_OBJECT_ID, 0x3ffff);
        assert!(sequence_number_valid(LOWEST_SEQUENCE_NUMBER));
        assert!(!sequence_number_valid(LOWEST_SEQUENCE_NUMBER - 1));
        assert!(sequence_number_valid(HIGHEST_SEQUENCE_NUMBER - 1));
        assert!(!sequence_number_valid(HIGHEST_SEQUENCE_NUMBER));
        assert!(!sequence_number_valid(SEQUENCE_BAD_BLOCK));
    }

    proptest! {
        #[test]
        fn prop_ordinary_object_ids_valid(id in 256u32..=0x3ffff) {
            prop_assert!(object_id_valid(id));
        }

        #[test]
        fn prop_large_object_ids_invalid(id in 0x40000u32..) {
            prop_assert!(!object_id_valid(id));
        }

        #[test]
        fn prop_small_object_ids(id in 0u32..256) {
            prop_assert_eq!(object_id_valid(id), matches!(id, 1..=4 | 16));
        }
    }
}
