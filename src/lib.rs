//! Recovery of YAFFS2 metadata from raw NAND dumps, without mounting the volume.
//!
//! The usual sequence is: [detect_geometry] on the dump (falling back on [Geometry::default]),
//! then [scan] it for object headers, and optionally hand [TskConfig] to The Sleuth Kit.

pub mod error;
pub mod nand;
pub mod tsk;
pub mod util;
pub mod yaffs2;

pub use error::{Error, InvalidTag, Result};
pub use nand::Geometry;
pub use tsk::TskConfig;
pub use yaffs2::detect::detect_geometry_or_default;
pub use yaffs2::{detect_geometry, scan, DetectionCandidates, ObjectHeader, ObjectType, Scan};
