//! A simulated NAND dump, built in memory, for testing purposes

use std::io::Cursor;

use anyhow::ensure;

use super::Geometry;
use crate::yaffs2::{ObjectHeader, SpareTag};

/// Default stand-in for the ECC bytes that follow the tag in a spare area
const SIM_ECC_FILL: u8 = 0x00;

/// An image under construction, one page/spare pair at a time
#[derive(Debug, Clone)]
pub struct SimImage {
    geometry: Geometry,
    data: Vec<u8>,

    /// Written to the spare bytes after the tag
    spare_fill: u8,
}

impl SimImage {
    /// Create an empty image with the specified geometry
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            data: Vec::new(),
            spare_fill: SIM_ECC_FILL,
        }
    }

    /// Change what fills the spare area after the tag; 0xFF leaves it erased, as on controllers
    /// that keep no ECC in the spare area
    pub fn spare_fill(mut self, fill: u8) -> Self {
        self.spare_fill = fill;
        self
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Append a raw pair. Short pages and spares are padded with 0xFF, as if partially programmed.
    pub fn push_pair(&mut self, page: &[u8], spare: &[u8]) -> anyhow::Result<()> {
        ensure!(page.len() <= self.geometry.page_size, "page too large");
        ensure!(spare.len() <= self.geometry.spare_size, "spare too large");

        for (content, size) in [
            (page, self.geometry.page_size),
            (spare, self.geometry.spare_size),
        ] {
            let begin = self.data.len();
            self.data.extend_from_slice(content);
            self.data.resize(begin + size, 0xFF);
        }

        Ok(())
    }

    /// Append a chunk of data, tagged with `tag`
    pub fn push_chunk(&mut self, tag: &SpareTag, page: &[u8]) -> anyhow::Result<()> {
        let spare = self.spare_for(tag)?;
        self.push_pair(page, &spare)
    }

    /// Append an object header, tagged with `tag`
    pub fn push_header(&mut self, tag: &SpareTag, header: &ObjectHeader) -> anyhow::Result<()> {
        let mut page = vec![0xFF; self.geometry.page_size];
        header.encode(&mut page, self.geometry.byte_order)?;
        self.push_chunk(tag, &page)
    }

    /// Append a fully erased pair
    pub fn push_erased(&mut self) {
        self.data
            .resize(self.data.len() + self.geometry.pair_size(), 0xFF);
    }

    /// Append bytes that don't make up a whole pair, as from a truncated dump
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Build a spare area: erased bad block marker, the tag, then the ECC
    fn spare_for(&self, tag: &SpareTag) -> anyhow::Result<Vec<u8>> {
        let mut spare = vec![self.spare_fill; self.geometry.spare_size];
        let skip = self.geometry.spare_skip.min(spare.len());
        spare[..skip].fill(0xFF);
        tag.encode(&mut spare, self.geometry.spare_skip, self.geometry.byte_order)?;
        Ok(spare)
    }

    /// Direct access to the bytes built so far
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Finish the image, ready to be read (and seeked) like a dump file
    pub fn into_cursor(self) -> Cursor<Vec<u8>> {
        Cursor::new(self.data)
    }
}

#[test]
fn test_sim_layout() -> anyhow::Result<()> {
    use crate::yaffs2::TagKind;

    let geometry = Geometry {
        page_size: 1024,
        spare_size: 32,
        spare_skip: 2,
        ..Default::default()
    };
    let tag = SpareTag {
        sequence_number: 0x1000,
        object_id: 0x100,
        kind: TagKind::Plain {
            chunk_id: 3,
            byte_count: 4,
        },
    };

    let mut image = SimImage::new(geometry);
    image.push_chunk(&tag, &[1, 2, 3, 4])?;
    image.push_erased();
    assert!(image.push_pair(&[0; 1025], &[]).is_err());

    let bytes = image.into_bytes();
    assert_eq!(bytes.len(), 2 * 1056);
    assert_eq!(bytes[..4], [1, 2, 3, 4]);
    assert!(bytes[4..1024].iter().all(|&b| b == 0xFF));
    assert_eq!(bytes[1024..1026], [0xFF, 0xFF]);
    assert_eq!(SpareTag::decode(&bytes[1024..1056], 2, geometry.byte_order)?, tag);
    assert!(bytes[1042..1056].iter().all(|&b| b == SIM_ECC_FILL));
    assert!(bytes[1056..].iter().all(|&b| b == 0xFF));
    Ok(())
}
