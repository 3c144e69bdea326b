//! Abstractions for the physical layout of a raw NAND dump: pages, their spare (OOB) areas, and
//! the geometry that ties them together.
//!
//! A dump is a page-major sequence of `(page, spare)` pairs:
//!
//! ```text
//! +---------- page 0 ----------+- spare 0 -+---------- page 1 ----------+- spare 1 -+ ...
//! |        page_size bytes     | spare_size|        page_size bytes     | spare_size|
//! +----------------------------+-----------+----------------------------+-----------+
//!                               ^
//!                               +-- spare_skip bytes (bad block marker), then the tag
//! ```

use std::fmt;
use std::io::{self, Read};

use deku::ctx::Endian;

use crate::util::ReadExt;

mod sim;
pub use sim::SimImage;

/// Convenience methods for operating on `[u8]`s that represent page contents
pub trait PageUtil {
    /// Does this page contain the all-1s bit pattern?
    fn is_erased(&self) -> bool;
}

impl PageUtil for [u8] {
    fn is_erased(&self) -> bool {
        self.iter().all(|&x| x == 0xFF)
    }
}

/// The physical record layout of a dump
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Geometry {
    pub page_size: usize,
    pub spare_size: usize,

    /// Offset of the tag within the spare area
    pub spare_skip: usize,

    pub byte_order: Endian,
}

impl Geometry {
    /// Bytes occupied by one page plus its spare area
    pub fn pair_size(&self) -> usize {
        self.page_size + self.spare_size
    }
}

/// The layout assumed when auto-detection fails: 2048/64, no skip, little-endian.
impl Default for Geometry {
    fn default() -> Self {
        Self {
            page_size: 2048,
            spare_size: 64,
            spare_skip: 0,
            byte_order: Endian::Little,
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.byte_order {
            Endian::Little => "little-endian",
            Endian::Big => "big-endian",
        };
        write!(
            f,
            "page size {}, spare size {}, spare skip {}, {order}",
            self.page_size, self.spare_size, self.spare_skip
        )
    }
}

/// One page and its spare area, as read from a dump.
///
/// The buffers are reused from one read to the next; the contents only live until the next call
/// to [Pair::read_from].
#[derive(Debug, Clone, Default)]
pub struct Pair {
    pub page: Vec<u8>,
    pub spare: Vec<u8>,
}

impl Pair {
    /// Read the next pair under `geometry`.
    ///
    /// Returns `false` if the source ran out before a complete pair could be read.
    pub fn read_from<R: Read>(&mut self, source: &mut R, geometry: &Geometry) -> io::Result<bool> {
        Ok(source.read_full(&mut self.page, geometry.page_size)?
            && source.read_full(&mut self.spare, geometry.spare_size)?)
    }

    /// Both halves are erased, which marks the end of written data.
    pub fn is_erased(&self) -> bool {
        self.page.is_erased() && self.spare.is_erased()
    }
}

#[test]
fn test_is_erased() {
    let mut page = vec![0xFFu8; 2048];
    assert!(page.is_erased());

    for i in [0, 1, 1023, 2047] {
        page[i] = 0xFE;
        assert!(!page.is_erased());
        page[i] = 0x00;
        assert!(!page.is_erased());
        page[i] = 0xFF;
    }
    assert!(page.is_erased());
}

#[test]
fn test_pair_read() -> anyhow::Result<()> {
    let geometry = Geometry {
        page_size: 4,
        spare_size: 2,
        ..Default::default()
    };
    let data = [1u8, 2, 3, 4, 5, 6, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 9];
    let mut source = &data[..];

    let mut pair = Pair::default();
    assert!(pair.read_from(&mut source, &geometry)?);
    assert_eq!(pair.page, [1, 2, 3, 4]);
    assert_eq!(pair.spare, [5, 6]);
    assert!(!pair.is_erased());

    assert!(pair.read_from(&mut source, &geometry)?);
    assert!(pair.is_erased());

    // Only one byte left: short read
    assert!(!pair.read_from(&mut source, &geometry)?);
    Ok(())
}

#[test]
fn test_geometry_default() {
    let geometry = Geometry::default();
    assert_eq!(
        (geometry.page_size, geometry.spare_size, geometry.spare_skip),
        (2048, 64, 0)
    );
    assert_eq!(geometry.byte_order, Endian::Little);
    assert_eq!(geometry.pair_size(), 2112);
}
