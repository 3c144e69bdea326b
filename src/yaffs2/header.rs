//! Decoding of YAFFS2 object headers, the chunk-0 page of every object.

use std::fmt;

use deku::bitvec::{BitSlice, BitVec, Msb0};
use deku::ctx::Endian;
use deku::prelude::*;

use super::{MAX_ALIAS_LENGTH, MAX_NAME_LENGTH};
use crate::error::{Error, Result};

/// Bytes occupied by an object header at the start of its page
pub const HEADER_SIZE: usize = 512;

/// Value of the retired name checksum field in every header YAFFS2 writes
pub const HEADER_SENTINEL: u16 = 0xFFFF;

/// The header as laid out on flash, including the alignment padding after `name`
#[derive(Debug, Eq, PartialEq, Clone, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: Endian")]
struct RawObjectHeader {
    obj_type: u32,
    parent_obj_id: u32,
    sum_no_longer_used: u16,
    name: [u8; 256],
    padding: u16,

    yst_mode: u32,
    yst_uid: u32,
    yst_gid: u32,
    yst_atime: u32,
    yst_mtime: u32,
    yst_ctime: u32,

    file_size_low: u32,
    equiv_id: i32,
    alias: [u8; 160],
    yst_rdev: u32,

    win_ctime: [u32; 2],
    win_atime: [u32; 2],
    win_mtime: [u32; 2],

    inband_shadowed_obj_id: u32,
    inband_is_shrink: u32,
    file_size_high: u32,
    reserved: u32,
    shadows_obj: i32,
    is_shrink: u32,
}

/// These represent the kinds of object YAFFS2 stores
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub enum ObjectType {
    #[default]
    Unknown,
    File,
    Symlink,
    Directory,
    Hardlink,
    Special,
}

impl From<u32> for ObjectType {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::File,
            2 => Self::Symlink,
            3 => Self::Directory,
            4 => Self::Hardlink,
            5 => Self::Special,
            _ => Self::Unknown,
        }
    }
}

impl From<ObjectType> for u32 {
    fn from(value: ObjectType) -> Self {
        match value {
            ObjectType::Unknown => 0,
            ObjectType::File => 1,
            ObjectType::Symlink => 2,
            ObjectType::Directory => 3,
            ObjectType::Hardlink => 4,
            ObjectType::Special => 5,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::File => "file",
            Self::Symlink => "symlink",
            Self::Directory => "directory",
            Self::Hardlink => "hardlink",
            Self::Special => "special",
        })
    }
}

/// This represents the fields of an object header, in a form more ergonomic than the raw layout
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ObjectHeader {
    pub object_type: ObjectType,
    pub parent_object_id: u32,

    /// Should always be [HEADER_SENTINEL]; anything else means the page was read misaligned.
    pub checksum: u16,

    pub name: String,

    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,

    /// Files only.
    pub file_size: u64,

    /// For hard links, the object this links to.
    pub equiv_id: i32,

    /// For symlinks, the link target.
    pub alias: String,

    /// For device nodes, the major/minor device number.
    pub rdev: u32,

    pub win_ctime: u64,
    pub win_atime: u64,
    pub win_mtime: u64,

    pub inband_shadowed_object_id: u32,
    pub inband_is_shrink: bool,

    /// If positive, the object this header replaces (as during a rename over an existing name).
    pub shadows_object: i32,

    /// Written when a file is truncated, so the garbage collector keeps it around.
    pub is_shrink: bool,
}

impl Default for ObjectHeader {
    fn default() -> Self {
        Self {
            object_type: Default::default(),
            parent_object_id: Default::default(),
            checksum: HEADER_SENTINEL,
            name: Default::default(),
            mode: Default::default(),
            uid: Default::default(),
            gid: Default::default(),
            atime: Default::default(),
            mtime: Default::default(),
            ctime: Default::default(),
            file_size: Default::default(),
            equiv_id: Default::default(),
            alias: Default::default(),
            rdev: Default::default(),
            win_ctime: Default::default(),
            win_atime: Default::default(),
            win_mtime: Default::default(),
            inband_shadowed_object_id: Default::default(),
            inband_is_shrink: Default::default(),
            shadows_object: Default::default(),
            is_shrink: Default::default(),
        }
    }
}

impl ObjectHeader {
    /// Decode a header from the start of a page, checking the sentinel.
    ///
    /// A sentinel mismatch comes back as [Error::ChecksumMismatch]. This is not a problem with
    /// this one header: it means the page boundaries are wrong, and nothing else read under the
    /// same geometry can be trusted either.
    pub fn decode(page: &[u8], endian: Endian) -> Result<Self> {
        let header = Self::decode_unchecked(page, endian)?;
        if header.checksum != HEADER_SENTINEL {
            return Err(Error::ChecksumMismatch {
                found: header.checksum,
            });
        }
        Ok(header)
    }

    /// Decode a header from the start of a page, whatever its sentinel says
    pub fn decode_unchecked(page: &[u8], endian: Endian) -> Result<Self> {
        let malformed = || Error::MalformedRecord {
            record: "object header",
            needed: HEADER_SIZE,
            available: page.len(),
        };

        let bytes = page.get(..HEADER_SIZE).ok_or_else(malformed)?;
        let (_, raw) =
            RawObjectHeader::read(BitSlice::from_slice(bytes), endian).map_err(|_| malformed())?;

        Ok(raw.into())
    }

    /// Write into the start of a page, leaving anything past [HEADER_SIZE] alone
    pub fn encode(&self, page: &mut [u8], endian: Endian) -> Result<()> {
        let available = page.len();
        let out_bytes = page
            .get_mut(..HEADER_SIZE)
            .ok_or(Error::MalformedRecord {
                record: "object header",
                needed: HEADER_SIZE,
                available,
            })?;

        let raw = RawObjectHeader::try_from(self)?;
        let mut bits = BitVec::<u8, Msb0>::new();
        raw.write(&mut bits, endian)
            .map_err(|_| Error::MalformedRecord {
                record: "object header",
                needed: HEADER_SIZE,
                available,
            })?;
        out_bytes.copy_from_slice(bits.as_raw_slice());
        Ok(())
    }
}

impl fmt::Display for ObjectHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: {}, Name: {}, UID: {}, GID: {}, Size: {}",
            self.object_type, self.name, self.uid, self.gid, self.file_size
        )
    }
}

/// Take the bytes up to the first nul of a fixed-width field
fn from_c_field(field: &[u8]) -> String {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

/// Copy a string into a fixed-width, nul-padded field, leaving room for the terminator
fn to_c_field<const N: usize>(value: &str, record: &'static str) -> Result<[u8; N]> {
    let bytes = value.as_bytes();
    if bytes.len() >= N {
        return Err(Error::MalformedRecord {
            record,
            needed: bytes.len() + 1,
            available: N,
        });
    }

    let mut field = [0u8; N];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

fn split_u64(value: u64) -> [u32; 2] {
    [value as u32, (value >> 32) as u32]
}

fn join_u64([low, high]: [u32; 2]) -> u64 {
    (u64::from(high) << 32) | u64::from(low)
}

impl From<RawObjectHeader> for ObjectHeader {
    fn from(value: RawObjectHeader) -> Self {
        let RawObjectHeader {
            obj_type,
            parent_obj_id,
            sum_no_longer_used,
            name,
            yst_mode,
            yst_uid,
            yst_gid,
            yst_atime,
            yst_mtime,
            yst_ctime,
            file_size_low,
            equiv_id,
            alias,
            yst_rdev,
            win_ctime,
            win_atime,
            win_mtime,
            inband_shadowed_obj_id,
            inband_is_shrink,
            file_size_high,
            shadows_obj,
            is_shrink,
            ..
        } = value;

        // Images from before large file support leave the high word erased
        let file_size = match file_size_high {
            u32::MAX => u64::from(file_size_low),
            _ => join_u64([file_size_low, file_size_high]),
        };

        Self {
            object_type: obj_type.into(),
            parent_object_id: parent_obj_id,
            checksum: sum_no_longer_used,
            name: from_c_field(&name),
            mode: yst_mode,
            uid: yst_uid,
            gid: yst_gid,
            atime: yst_atime,
            mtime: yst_mtime,
            ctime: yst_ctime,
            file_size,
            equiv_id,
            alias: from_c_field(&alias),
            rdev: yst_rdev,
            win_ctime: join_u64(win_ctime),
            win_atime: join_u64(win_atime),
            win_mtime: join_u64(win_mtime),
            inband_shadowed_object_id: inband_shadowed_obj_id,
            inband_is_shrink: inband_is_shrink != 0,
            shadows_object: shadows_obj,
            is_shrink: is_shrink != 0,
        }
    }
}

impl TryFrom<&ObjectHeader> for RawObjectHeader {
    type Error = Error;

    fn try_from(value: &ObjectHeader) -> Result<Self> {
        let [file_size_low, file_size_high] = split_u64(value.file_size);

        Ok(Self {
            obj_type: value.object_type.into(),
            parent_obj_id: value.parent_object_id,
            sum_no_longer_used: value.checksum,
            name: to_c_field::<{ MAX_NAME_LENGTH + 1 }>(&value.name, "object name")?,
            padding: 0xFFFF,

            yst_mode: value.mode,
            yst_uid: value.uid,
            yst_gid: value.gid,
            yst_atime: value.atime,
            yst_mtime: value.mtime,
            yst_ctime: value.ctime,

            file_size_low,
            equiv_id: value.equiv_id,
            alias: to_c_field::<{ MAX_ALIAS_LENGTH + 1 }>(&value.alias, "symlink alias")?,
            yst_rdev: value.rdev,

            win_ctime: split_u64(value.win_ctime),
            win_atime: split_u64(value.win_atime),
            win_mtime: split_u64(value.win_mtime),

            inband_shadowed_obj_id: value.inband_shadowed_object_id,
            inband_is_shrink: value.inband_is_shrink.into(),
            file_size_high,
            reserved: 0xFFFF_FFFF,
            shadows_obj: value.shadows_object,
            is_shrink: value.is_shrink.into(),
        })
    }
}
