//! The Sleuth Kit companion configuration.
//!
//! TSK's YAFFS2 support cannot guess the geometry of a dump on its own; it reads it from a
//! `<image>-yaffs2.config` file placed next to the image.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::nand::Geometry;
use crate::yaffs2::tags::{CHUNK_ID_OFFSET, OBJECT_ID_OFFSET, SEQ_NUMBER_OFFSET};

/// Suffix TSK appends to the image path when looking for the config
pub const CONFIG_SUFFIX: &str = "-yaffs2.config";

/// The geometry, as TSK wants to be told about it
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct TskConfig {
    pub page_size: usize,
    pub spare_size: usize,
    pub seq_num_offset: usize,
    pub obj_id_offset: usize,
    pub chunk_id_offset: usize,
}

impl From<&Geometry> for TskConfig {
    fn from(value: &Geometry) -> Self {
        Self {
            page_size: value.page_size,
            spare_size: value.spare_size,
            seq_num_offset: value.spare_skip + SEQ_NUMBER_OFFSET,
            obj_id_offset: value.spare_skip + OBJECT_ID_OFFSET,
            chunk_id_offset: value.spare_skip + CHUNK_ID_OFFSET,
        }
    }
}

impl fmt::Display for TskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#YAFFS2 config file\n\
             flash_page_size = {}\n\
             flash_spare_size = {}\n\
             \n\
             spare_seq_num_offset = {}\n\
             spare_obj_id_offset = {}\n\
             spare_chunk_id_offset = {}",
            self.page_size,
            self.spare_size,
            self.seq_num_offset,
            self.obj_id_offset,
            self.chunk_id_offset
        )
    }
}

impl TskConfig {
    /// Where TSK looks for the config of `image`
    pub fn default_path(image: &Path) -> PathBuf {
        let mut path = image.as_os_str().to_owned();
        path.push(CONFIG_SUFFIX);
        path.into()
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_string())
    }
}

#[test]
fn test_render() {
    let geometry = Geometry {
        spare_skip: 2,
        ..Default::default()
    };
    assert_eq!(
        TskConfig::from(&geometry).to_string(),
        "#YAFFS2 config file
flash_page_size = 2048
flash_spare_size = 64

spare_seq_num_offset = 2
spare_obj_id_offset = 6
spare_chunk_id_offset = 10"
    );
}

#[test]
fn test_default_path() {
    assert_eq!(
        TskConfig::default_path(Path::new("/tmp/nand.bin")),
        Path::new("/tmp/nand.bin-yaffs2.config")
    );
}

#[test]
fn test_write() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("yaffs2-probe-{}.config", std::process::id()));
    let config = TskConfig::from(&Geometry::default());
    config.write_to(&path)?;
    let written = fs::read_to_string(&path)?;
    fs::remove_file(&path)?;
    assert_eq!(written, config.to_string());
    Ok(())
}
