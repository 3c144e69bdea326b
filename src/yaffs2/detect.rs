//! Geometry auto-detection.
//!
//! Nothing on the flash records the page or spare size, so they are found by trial: under the
//! right geometry, the first pair of the image is an object header (YAFFS2 writes the root
//! directory first) and the pair after it is another valid chunk.
//!
//! The first candidate that passes wins. Crafted images could satisfy more than one candidate;
//! they resolve to whichever comes first in the candidate lists.

use std::io::{Read, Seek, SeekFrom};

use deku::ctx::Endian;
use tracing::{debug, info, warn};

use super::tags::{SpareTag, TAG_SIZE};
use crate::error::{Error, Result};
use crate::nand::{Geometry, PageUtil, Pair};
use crate::util::ReadExt;

/// Page sizes YAFFS2 supports, smallest first
pub const PAGE_SIZES: &[usize] = &[1024, 2048, 4096, 8192, 16384];

/// Spare sizes seen alongside those page sizes
pub const SPARE_SIZES: &[usize] = &[32, 64, 128, 256, 512];

/// Offsets of the tag within the spare area. Some controllers keep the two-byte bad block marker
/// at the start of the spare area.
pub const SPARE_SKIPS: &[usize] = &[0, 2];

/// The search space of [detect_geometry]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DetectionCandidates {
    pub page_sizes: Vec<usize>,
    pub spare_sizes: Vec<usize>,
    pub spare_skips: Vec<usize>,
    pub byte_order: Endian,
}

impl Default for DetectionCandidates {
    fn default() -> Self {
        Self {
            page_sizes: PAGE_SIZES.to_vec(),
            spare_sizes: SPARE_SIZES.to_vec(),
            spare_skips: SPARE_SKIPS.to_vec(),
            byte_order: Endian::Little,
        }
    }
}

impl DetectionCandidates {
    /// Every geometry to try, in order: page size, then spare size, then skip
    pub fn geometries(&self) -> impl Iterator<Item = Geometry> + '_ {
        self.page_sizes.iter().flat_map(move |&page_size| {
            self.spare_sizes.iter().flat_map(move |&spare_size| {
                self.spare_skips.iter().map(move |&spare_skip| Geometry {
                    page_size,
                    spare_size,
                    spare_skip,
                    byte_order: self.byte_order,
                })
            })
        })
    }
}

/// Find the first candidate geometry under which `source` starts with a header chunk followed by
/// another valid chunk.
///
/// Returns [Error::GeometryNotDetected] if nothing fits. The source is left at an unspecified
/// position; callers must seek before reading from it again.
pub fn detect_geometry<R: Read + Seek>(
    source: &mut R,
    candidates: &DetectionCandidates,
) -> Result<Geometry> {
    let mut pairs = [Pair::default(), Pair::default()];

    for geometry in candidates.geometries() {
        if geometry.spare_skip + TAG_SIZE > geometry.spare_size {
            debug!(%geometry, "tag does not fit in spare area");
            continue;
        }

        if check_candidate(source, &geometry, &mut pairs)? {
            info!(%geometry, "detected geometry");
            return Ok(geometry);
        }
    }

    Err(Error::GeometryNotDetected)
}

/// Like [detect_geometry], but falls back on [Geometry::default] when nothing fits.
pub fn detect_geometry_or_default<R: Read + Seek>(
    source: &mut R,
    candidates: &DetectionCandidates,
) -> Result<Geometry> {
    match detect_geometry(source, candidates) {
        Err(Error::GeometryNotDetected) => {
            let geometry = Geometry::default();
            warn!(%geometry, "auto-detection failed, using default geometry");
            Ok(geometry)
        }
        result => result,
    }
}

/// Check the first two pairs of `source` under `geometry`
fn check_candidate<R: Read + Seek>(
    source: &mut R,
    geometry: &Geometry,
    pairs: &mut [Pair; 2],
) -> Result<bool> {
    source.seek(SeekFrom::Start(0))?;
    for pair in pairs.iter_mut() {
        if !pair.read_from(source, geometry)? {
            debug!(%geometry, "image shorter than two pairs");
            return Ok(false);
        }
    }

    let [first, second] = pairs;
    if first.is_erased() {
        debug!(%geometry, "first pair erased");
        return Ok(false);
    }

    // The first chunk must be an object header...
    match check_tag(&first.spare, geometry)? {
        Some(tag) if tag.is_header() => (),
        Some(tag) => {
            debug!(%geometry, chunk_id = tag.chunk_id(), "first pair is not a header");
            return Ok(false);
        }
        None => return Ok(false),
    }

    // ...followed by any valid chunk, or the end of the written area
    if second.is_erased() {
        return erased_to_end(source, geometry);
    }
    Ok(check_tag(&second.spare, geometry)?.is_some())
}

/// After a lone header, is the rest of the image erased and a whole number of pairs long?
///
/// An erased tail alone says little: under a spare size too small, the leftover (erased) part of
/// the real spare area plus the erased page after it also reads as an erased pair.
fn erased_to_end<R: Read + Seek>(source: &mut R, geometry: &Geometry) -> Result<bool> {
    const CHUNK_SIZE: usize = 65536;

    let position = source.stream_position()?;
    let len = source.seek(SeekFrom::End(0))?;
    if len % geometry.pair_size() as u64 != 0 {
        debug!(%geometry, len, "image is not a whole number of pairs");
        return Ok(false);
    }

    source.seek(SeekFrom::Start(position))?;
    let mut buf = Vec::with_capacity(CHUNK_SIZE);
    loop {
        source.read_to_vec(&mut buf, CHUNK_SIZE)?;
        if buf.is_empty() {
            return Ok(true);
        }
        if !buf.is_erased() {
            debug!(%geometry, "data after an erased pair");
            return Ok(false);
        }
    }
}

/// Decode a tag, turning invalid tags into `None`
fn check_tag(spare: &[u8], geometry: &Geometry) -> Result<Option<SpareTag>> {
    match SpareTag::decode(spare, geometry.spare_skip, geometry.byte_order) {
        Ok(tag) => Ok(Some(tag)),
        Err(Error::InvalidTag(reason)) => {
            debug!(%geometry, %reason, "invalid tag");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}
