//! Decoding of the YAFFS2 tag stored in each page's spare area.

use deku::bitvec::{BitSlice, BitVec, Msb0};
use deku::ctx::Endian;
use deku::prelude::*;

use super::{object_id_valid, sequence_number_valid, ObjectType, MAX_CHUNK_ID};
use crate::error::{Error, InvalidTag, Result};

/// Size of the tag record, starting `spare_skip` bytes into the spare area
pub const TAG_SIZE: usize = 16;

// Field offsets within the tag record
pub const SEQ_NUMBER_OFFSET: usize = 0;
pub const OBJECT_ID_OFFSET: usize = 4;
pub const CHUNK_ID_OFFSET: usize = 8;

// Flags packed into the chunk id of a header tag
const EXTRA_HEADER_INFO_FLAG: u32 = 0x8000_0000;
const EXTRA_SHRINK_FLAG: u32 = 0x4000_0000;
const EXTRA_SHADOWS_FLAG: u32 = 0x2000_0000;
const NOT_ALL_EXTRA_FLAGS: u32 = 0x0fff_ffff;

// ...and the object type, packed into the top nibble of the object id
const EXTRA_OBJECT_TYPE_SHIFT: u32 = 28;
const NOT_EXTRA_OBJECT_TYPE_MASK: u32 = 0x0fff_ffff;

/// The tag as laid out on flash. ECC bytes that may follow it are not modelled.
#[derive(Debug, Eq, PartialEq, Copy, Clone, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: Endian")]
struct RawTag {
    seq_number: u32,
    obj_id: u32,
    chunk_id: u32,
    n_bytes: u32,
}

/// Header details that YAFFS2 folds into the tag of an object's chunk 0
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct ExtraHeaderInfo {
    pub parent_object_id: u32,
    pub is_shrink: bool,
    pub is_shadowing: bool,
    pub object_type: ObjectType,
}

/// What the chunk id and byte count fields of a tag turned out to mean
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TagKind {
    /// An ordinary tag: where the chunk sits within its object, and how much of it is used
    Plain { chunk_id: u32, byte_count: u32 },

    /// A header tag carrying extra header information instead of a chunk pointer; the chunk is
    /// implicitly chunk 0
    Extended(ExtraHeaderInfo),
}

/// A decoded, validated spare tag
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct SpareTag {
    pub sequence_number: u32,
    pub object_id: u32,
    pub kind: TagKind,
}

impl SpareTag {
    /// Decode the tag found `skip` bytes into a spare area.
    ///
    /// A spare area too short to hold the tag is a [Error::MalformedRecord]; a tag that reads
    /// fine but violates a YAFFS2 invariant is an [Error::InvalidTag].
    pub fn decode(spare: &[u8], skip: usize, endian: Endian) -> Result<Self> {
        let needed = skip + TAG_SIZE;
        let malformed = || Error::MalformedRecord {
            record: "spare tag",
            needed,
            available: spare.len(),
        };

        let bytes = spare.get(skip..needed).ok_or_else(malformed)?;
        let (_, raw) =
            RawTag::read(BitSlice::from_slice(bytes), endian).map_err(|_| malformed())?;

        Ok(Self::try_from(raw)?)
    }

    /// Write this tag `skip` bytes into a spare area, leaving the other bytes alone.
    pub fn encode(&self, spare: &mut [u8], skip: usize, endian: Endian) -> Result<()> {
        let needed = skip + TAG_SIZE;
        let available = spare.len();
        let out_bytes = spare
            .get_mut(skip..needed)
            .ok_or(Error::MalformedRecord {
                record: "spare tag",
                needed,
                available,
            })?;

        let mut bits = BitVec::<u8, Msb0>::new();
        RawTag::from(*self)
            .write(&mut bits, endian)
            .map_err(|_| Error::MalformedRecord {
                record: "spare tag",
                needed,
                available,
            })?;
        out_bytes.copy_from_slice(bits.as_raw_slice());
        Ok(())
    }

    /// The chunk this tag describes; always 0 for extended header tags
    pub fn chunk_id(&self) -> u32 {
        match self.kind {
            TagKind::Plain { chunk_id, .. } => chunk_id,
            TagKind::Extended(_) => 0,
        }
    }

    /// Bytes of the chunk in use; always 0 for extended header tags
    pub fn byte_count(&self) -> u32 {
        match self.kind {
            TagKind::Plain { byte_count, .. } => byte_count,
            TagKind::Extended(_) => 0,
        }
    }

    pub fn extra(&self) -> Option<&ExtraHeaderInfo> {
        match &self.kind {
            TagKind::Plain { .. } => None,
            TagKind::Extended(extra) => Some(extra),
        }
    }

    /// Does the paired page hold an object header?
    pub fn is_header(&self) -> bool {
        self.chunk_id() == 0
    }
}

impl TryFrom<RawTag> for SpareTag {
    type Error = InvalidTag;

    fn try_from(value: RawTag) -> Result<Self, Self::Error> {
        let RawTag {
            seq_number,
            obj_id,
            chunk_id,
            n_bytes,
        } = value;

        // Erased, bad or otherwise unused pages are weeded out here, before anything else is
        // interpreted
        if !sequence_number_valid(seq_number) {
            return Err(InvalidTag::SequenceNumber(seq_number));
        }

        let (object_id, kind) = if chunk_id & EXTRA_HEADER_INFO_FLAG != 0 {
            let extra = ExtraHeaderInfo {
                parent_object_id: chunk_id & NOT_ALL_EXTRA_FLAGS,
                is_shrink: chunk_id & EXTRA_SHRINK_FLAG != 0,
                is_shadowing: chunk_id & EXTRA_SHADOWS_FLAG != 0,
                object_type: (obj_id >> EXTRA_OBJECT_TYPE_SHIFT).into(),
            };
            (obj_id & NOT_EXTRA_OBJECT_TYPE_MASK, TagKind::Extended(extra))
        } else {
            let kind = TagKind::Plain {
                chunk_id,
                byte_count: n_bytes,
            };
            (obj_id, kind)
        };

        if !object_id_valid(object_id) {
            return Err(InvalidTag::ObjectId(object_id));
        }

        if let TagKind::Plain { chunk_id, .. } = kind {
            if chunk_id > MAX_CHUNK_ID {
                return Err(InvalidTag::ChunkId(chunk_id));
            }
        }

        Ok(Self {
            sequence_number: seq_number,
            object_id,
            kind,
        })
    }
}

impl From<SpareTag> for RawTag {
    fn from(value: SpareTag) -> Self {
        let SpareTag {
            sequence_number,
            object_id,
            kind,
        } = value;

        match kind {
            TagKind::Plain {
                chunk_id,
                byte_count,
            } => Self {
                seq_number: sequence_number,
                obj_id: object_id,
                chunk_id,
                n_bytes: byte_count,
            },
            TagKind::Extended(extra) => {
                let mut chunk_id =
                    EXTRA_HEADER_INFO_FLAG | (extra.parent_object_id & NOT_ALL_EXTRA_FLAGS);
                if extra.is_shrink {
                    chunk_id |= EXTRA_SHRINK_FLAG;
                }
                if extra.is_shadowing {
                    chunk_id |= EXTRA_SHADOWS_FLAG;
                }

                let obj_id = (object_id & NOT_EXTRA_OBJECT_TYPE_MASK)
                    | (u32::from(extra.object_type) << EXTRA_OBJECT_TYPE_SHIFT);

                Self {
                    seq_number: sequence_number,
                    obj_id,
                    chunk_id,
                    n_bytes: 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::yaffs2::{HIGHEST_SEQUENCE_NUMBER, LOWEST_SEQUENCE_NUMBER, SEQUENCE_BAD_BLOCK};
    use proptest::prelude::*;

    /// Lay out the four raw fields little-endian, after `skip` bytes of 0xFF
    fn raw_spare(skip: usize, fields: [u32; 4]) -> Vec<u8> {
        let mut spare = vec![0xFFu8; 64];
        for (i, field) in fields.iter().enumerate() {
            spare[skip + i * 4..][..4].copy_from_slice(&field.to_le_bytes());
        }
        spare
    }

    #[test]
    fn test_decode_plain() -> anyhow::Result<()> {
        let spare = raw_spare(2, [0x2000, 300, 7, 2048]);
        let tag = SpareTag::decode(&spare, 2, Endian::Little)?;

        assert_eq!(tag.sequence_number, 0x2000);
        assert_eq!(tag.object_id, 300);
        assert_eq!(tag.chunk_id(), 7);
        assert_eq!(tag.byte_count(), 2048);
        assert!(tag.extra().is_none());
        assert!(!tag.is_header());
        Ok(())
    }

    #[test]
    fn test_decode_extended() -> anyhow::Result<()> {
        // Directory (type 3) with object id 0x101, parent 1, shadowing set
        let obj_id = (3 << 28) | 0x101;
        let chunk_id = 0x8000_0000 | 0x2000_0000 | 1;
        let spare = raw_spare(0, [0x1001, obj_id, chunk_id, 0x1234]);
        let tag = SpareTag::decode(&spare, 0, Endian::Little)?;

        assert_eq!(tag.object_id, 0x101);
        assert_eq!(tag.chunk_id(), 0);
        assert_eq!(tag.byte_count(), 0);
        assert!(tag.is_header());
        assert_eq!(
            tag.extra(),
            Some(&ExtraHeaderInfo {
                parent_object_id: 1,
                is_shrink: false,
                is_shadowing: true,
                object_type: ObjectType::Directory,
            })
        );
        Ok(())
    }

    #[test]
    fn test_decode_big_endian() -> anyhow::Result<()> {
        let mut spare = vec![0xFFu8; 32];
        for (i, field) in [0x1000u32, 1, 0, 0].iter().enumerate() {
            spare[i * 4..][..4].copy_from_slice(&field.to_be_bytes());
        }
        let tag = SpareTag::decode(&spare, 0, Endian::Big)?;
        assert_eq!(tag.object_id, 1);
        assert!(tag.is_header());
        Ok(())
    }

    #[test]
    fn test_decode_invalid() {
        // Erased spare
        let spare = vec![0xFFu8; 64];
        assert!(matches!(
            SpareTag::decode(&spare, 0, Endian::Little),
            Err(Error::InvalidTag(InvalidTag::SequenceNumber(0xffff_ffff)))
        ));

        // The type nibble is masked off before validating the object id...
        let spare = raw_spare(0, [0x1000, (1 << 28) | 0x100, 0x8000_0001, 0]);
        assert!(SpareTag::decode(&spare, 0, Endian::Little).is_ok());

        // ...but only for extended tags
        let spare = raw_spare(0, [0x1000, (1 << 28) | 0x100, 1, 0]);
        assert!(matches!(
            SpareTag::decode(&spare, 0, Endian::Little),
            Err(Error::InvalidTag(InvalidTag::ObjectId(0x1000_0100)))
        ));

        let spare = raw_spare(0, [0x1000, 0x100, 0x1000_0000, 0]);
        assert!(matches!(
            SpareTag::decode(&spare, 0, Endian::Little),
            Err(Error::InvalidTag(InvalidTag::ChunkId(0x1000_0000)))
        ));
    }

    #[test]
    fn test_decode_malformed() {
        let spare = vec![0u8; 17];
        assert!(matches!(
            SpareTag::decode(&spare, 2, Endian::Little),
            Err(Error::MalformedRecord {
                needed: 18,
                available: 17,
                ..
            })
        ));
    }

    #[test]
    fn test_encode_leaves_surroundings() -> anyhow::Result<()> {
        let tag = SpareTag {
            sequence_number: 0x1000,
            object_id: 0x100,
            kind: TagKind::Plain {
                chunk_id: 1,
                byte_count: 10,
            },
        };
        let mut spare = vec![0xAAu8; 32];
        tag.encode(&mut spare, 2, Endian::Little)?;
        assert_eq!(spare[..2], [0xAA, 0xAA]);
        assert_eq!(spare[18..], [0xAA; 14]);
        assert_eq!(spare[2..6], 0x1000u32.to_le_bytes());

        assert!(tag.encode(&mut spare[..17], 2, Endian::Little).is_err());
        Ok(())
    }

    fn valid_object_id() -> impl Strategy<Value = u32> {
        prop_oneof![
            prop::sample::select(vec![1u32, 2, 3, 4, 16]),
            256u32..=0x3ffff,
        ]
    }

    fn object_type() -> impl Strategy<Value = ObjectType> {
        (0u32..=5).prop_map(ObjectType::from)
    }

    proptest! {
        #[test]
        fn prop_sequence_number_in_range_accepted(
            seq in LOWEST_SEQUENCE_NUMBER..HIGHEST_SEQUENCE_NUMBER,
            obj_id in valid_object_id(),
            chunk_id in 0u32..=0x0fff_ffff,
        ) {
            prop_assume!(seq != SEQUENCE_BAD_BLOCK);
            let spare = raw_spare(0, [seq, obj_id, chunk_id, 0]);
            let tag = SpareTag::decode(&spare, 0, Endian::Little);
            prop_assert!(tag.is_ok());
        }

        #[test]
        fn prop_sequence_number_out_of_range_rejected(
            seq in prop_oneof![
                0u32..LOWEST_SEQUENCE_NUMBER,
                HIGHEST_SEQUENCE_NUMBER..,
                Just(SEQUENCE_BAD_BLOCK),
            ],
            obj_id in any::<u32>(),
            chunk_id in any::<u32>(),
            n_bytes in any::<u32>(),
            skip in 0usize..=2,
        ) {
            let spare = raw_spare(skip, [seq, obj_id, chunk_id, n_bytes]);
            let result = SpareTag::decode(&spare, skip, Endian::Little);
            prop_assert!(matches!(
                result,
                Err(Error::InvalidTag(InvalidTag::SequenceNumber(s))) if s == seq
            ));
        }

        #[test]
        fn prop_extended_tag_survives_encoding(
            seq in LOWEST_SEQUENCE_NUMBER..HIGHEST_SEQUENCE_NUMBER,
            object_id in valid_object_id(),
            parent_object_id in 0u32..=0x0fff_ffff,
            is_shrink in any::<bool>(),
            is_shadowing in any::<bool>(),
            object_type in object_type(),
        ) {
            prop_assume!(seq != SEQUENCE_BAD_BLOCK);
            let extra = ExtraHeaderInfo { parent_object_id, is_shrink, is_shadowing, object_type };
            let tag = SpareTag { sequence_number: seq, object_id, kind: TagKind::Extended(extra) };

            let mut spare = vec![0xFFu8; 64];
            tag.encode(&mut spare, 0, Endian::Little).unwrap();
            let decoded = SpareTag::decode(&spare, 0, Endian::Little).unwrap();

            prop_assert_eq!(decoded.chunk_id(), 0);
            prop_assert_eq!(decoded.byte_count(), 0);
            prop_assert_eq!(decoded.object_id, object_id);
            prop_assert_eq!(decoded.extra(), Some(&extra));
        }

        #[test]
        fn prop_plain_tag_survives_encoding(
            seq in LOWEST_SEQUENCE_NUMBER..HIGHEST_SEQUENCE_NUMBER,
            object_id in valid_object_id(),
            chunk_id in 0u32..=0x0fff_ffff,
            byte_count in any::<u32>(),
        ) {
            prop_assume!(seq != SEQUENCE_BAD_BLOCK);
            let tag = SpareTag {
                sequence_number: seq,
                object_id,
                kind: TagKind::Plain { chunk_id, byte_count },
            };

            let mut spare = vec![0xFFu8; 64];
            tag.encode(&mut spare, 2, Endian::Little).unwrap();
            let decoded = SpareTag::decode(&spare, 2, Endian::Little).unwrap();

            prop_assert!(decoded.extra().is_none());
            prop_assert_eq!(decoded, tag);
        }
    }
}
