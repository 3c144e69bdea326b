//! This module contains code to walk a dump under a known geometry, yielding the object headers
//! found along the way.

use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, error, info, warn};

use super::{ObjectHeader, SpareTag};
use crate::error::{Error, Result};
use crate::nand::{Geometry, Pair};

/// Running totals for a [Scan]
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct ScanStats {
    /// Pairs consumed, not counting the one that ended the scan
    pub pairs_read: u64,

    pub headers: u64,

    /// Pairs holding file data rather than a header
    pub data_chunks: u64,

    /// Pairs skipped because their tag was invalid
    pub invalid_tags: u64,
}

/// A single forward pass over a dump, yielding every object header in write order.
///
/// The scan ends at the first fully erased pair or at the end of the source. An object header
/// without the 0xFFFF sentinel ends it with [Error::ChecksumMismatch], since every pair after it
/// would be misread too. Pairs with invalid tags are skipped.
pub struct Scan<R> {
    source: R,
    geometry: Geometry,
    pair: Pair,
    offset: u64,
    stats: ScanStats,
    rpt: Option<howudoin::Tx>,
}

/// Begin scanning `source` from its start
pub fn scan<R: Read + Seek>(mut source: R, geometry: Geometry) -> Result<Scan<R>> {
    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;

    let rpt = howudoin::new()
        .label("Scanning image")
        .set_len(len.checked_div(geometry.pair_size() as u64));

    Ok(Scan {
        source,
        geometry,
        pair: Pair::default(),
        offset: 0,
        stats: Default::default(),
        rpt: Some(rpt),
    })
}

impl<R: Read> Scan<R> {
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Byte offset of the next pair to be read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Give back the source, e.g. to rewind it for another scan
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Read pairs until one holds an object header. `Ok(None)` is the end of the data.
    fn next_header(&mut self) -> Result<Option<ObjectHeader>> {
        let Geometry {
            spare_skip,
            byte_order,
            ..
        } = self.geometry;

        loop {
            let offset = self.offset;
            if !self.pair.read_from(&mut self.source, &self.geometry)? {
                debug!(offset, "incomplete pair at end of image");
                return Ok(None);
            }

            if self.pair.is_erased() {
                debug!(offset, "erased pair, end of written data");
                return Ok(None);
            }

            self.offset += self.geometry.pair_size() as u64;
            self.stats.pairs_read += 1;
            if let Some(rpt) = &self.rpt {
                rpt.inc();
            }

            let tag = match SpareTag::decode(&self.pair.spare, spare_skip, byte_order) {
                Ok(tag) => tag,
                Err(Error::InvalidTag(reason)) => {
                    warn!(offset, %reason, "skipping pair with invalid spare tag");
                    self.stats.invalid_tags += 1;
                    continue;
                }
                Err(error) => return Err(error),
            };

            // Only chunk 0 carries a header; file data is not reconstructed here
            if !tag.is_header() {
                self.stats.data_chunks += 1;
                continue;
            }

            return match ObjectHeader::decode(&self.pair.page, byte_order) {
                Ok(header) => {
                    self.stats.headers += 1;
                    debug!(offset, object_id = tag.object_id, %header, "object header");
                    Ok(Some(header))
                }
                Err(error @ Error::ChecksumMismatch { .. }) => {
                    error!(offset, geometry = %self.geometry, "{error}");
                    Err(error)
                }
                Err(error) => Err(error),
            };
        }
    }

    fn finish(&mut self) {
        if let Some(rpt) = self.rpt.take() {
            rpt.close();

            let ScanStats {
                pairs_read,
                headers,
                data_chunks,
                invalid_tags,
            } = self.stats;
            info!(pairs_read, headers, data_chunks, invalid_tags, "scan finished");
        }
    }
}

impl<R: Read> Iterator for Scan<R> {
    type Item = Result<ObjectHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        // Finished scans stay finished
        self.rpt.as_ref()?;

        let result = self.next_header();
        if !matches!(result, Ok(Some(_))) {
            self.finish();
        }
        result.transpose()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nand::SimImage;
    use crate::yaffs2::{ObjectType, TagKind};

    fn tag(object_id: u32, chunk_id: u32) -> SpareTag {
        SpareTag {
            sequence_number: 0x1000,
            object_id,
            kind: TagKind::Plain {
                chunk_id,
                byte_count: 0,
            },
        }
    }

    fn header(name: &str, object_type: ObjectType) -> ObjectHeader {
        ObjectHeader {
            object_type,
            parent_object_id: 1,
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn names(scan: Scan<impl Read>) -> Result<Vec<String>> {
        scan.map(|x| x.map(|header| header.name)).collect()
    }

    #[test]
    fn test_scan_headers_and_data() -> anyhow::Result<()> {
        let geometry = Geometry::default();
        let mut image = SimImage::new(geometry);
        image.push_header(&tag(1, 0), &header("", ObjectType::Directory))?;
        image.push_header(&tag(0x100, 0), &header("bin", ObjectType::Directory))?;
        image.push_header(&tag(0x101, 0), &header("sh", ObjectType::File))?;
        image.push_chunk(&tag(0x101, 1), &[0x7F, b'E', b'L', b'F'])?;
        image.push_chunk(&tag(0x101, 2), &[0; 2048])?;
        image.push_header(&tag(0x102, 0), &header("etc", ObjectType::Directory))?;
        image.push_erased();

        let mut scan = scan(image.into_cursor(), geometry)?;
        let found: Vec<_> = scan.by_ref().collect::<Result<_>>()?;
        assert_eq!(
            found.iter().map(|x| x.name.as_str()).collect::<Vec<_>>(),
            ["", "bin", "sh", "etc"]
        );
        assert_eq!(found[2].object_type, ObjectType::File);

        assert_eq!(
            *scan.stats(),
            ScanStats {
                pairs_read: 6,
                headers: 4,
                data_chunks: 2,
                invalid_tags: 0,
            }
        );
        assert_eq!(scan.offset(), 6 * 2112);
        assert!(scan.next().is_none());
        Ok(())
    }

    #[test]
    fn test_scan_skips_invalid_tags() -> anyhow::Result<()> {
        let geometry = Geometry::default();
        let mut image = SimImage::new(geometry);
        image.push_header(&tag(1, 0), &header("a", ObjectType::Directory))?;
        // Bad block sentinel, then an out-of-range object id
        image.push_chunk(
            &SpareTag {
                sequence_number: 0xffff_0000,
                ..tag(0x100, 0)
            },
            &[0; 16],
        )?;
        image.push_chunk(&tag(0x40000, 0), &[0; 16])?;
        image.push_header(&tag(0x100, 0), &header("b", ObjectType::File))?;

        let mut scan = scan(image.into_cursor(), geometry)?;
        let found: Vec<_> = scan.by_ref().collect::<Result<_>>()?;
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].name, "b");
        assert_eq!(scan.stats().invalid_tags, 2);
        Ok(())
    }

    #[test]
    fn test_scan_blank_halves_are_live() -> anyhow::Result<()> {
        let geometry = Geometry::default();
        let mut image = SimImage::new(geometry);
        image.push_header(&tag(1, 0), &header("a", ObjectType::Directory))?;
        // Erased page, but a programmed spare: a zero-length chunk, not the end of the data
        image.push_chunk(&tag(0x100, 1), &[])?;
        // Programmed page, erased spare: invalid tag, skipped
        image.push_pair(&[0; 16], &[])?;
        image.push_header(&tag(0x100, 0), &header("b", ObjectType::File))?;

        let scan = scan(image.into_cursor(), geometry)?;
        assert_eq!(names(scan)?, ["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_scan_stops_at_short_pair() -> anyhow::Result<()> {
        let geometry = Geometry::default();
        let mut image = SimImage::new(geometry);
        image.push_header(&tag(1, 0), &header("a", ObjectType::Directory))?;
        image.push_raw(&[0u8; 2100]);

        let mut scan = scan(image.into_cursor(), geometry)?;
        assert_eq!(scan.next().transpose()?.map(|x| x.name), Some("a".to_string()));
        assert!(scan.next().is_none());
        assert_eq!(scan.stats().pairs_read, 1);
        Ok(())
    }

    #[test]
    fn test_scan_checksum_mismatch_is_fatal() -> anyhow::Result<()> {
        let geometry = Geometry::default();
        let mut image = SimImage::new(geometry);
        image.push_header(&tag(1, 0), &header("a", ObjectType::Directory))?;
        image.push_header(&tag(0x100, 0), &header("b", ObjectType::File))?;
        image.push_header(&tag(0x101, 0), &header("c", ObjectType::File))?;
        // Corrupt the sentinel of "b"
        image.bytes_mut()[geometry.pair_size() + 8] = 0x00;

        let mut scan = scan(image.into_cursor(), geometry)?;
        assert_eq!(scan.next().transpose()?.map(|x| x.name), Some("a".to_string()));
        assert!(matches!(
            scan.next(),
            Some(Err(Error::ChecksumMismatch { found: 0xFF00 }))
        ));
        assert!(scan.next().is_none());
        Ok(())
    }
}
