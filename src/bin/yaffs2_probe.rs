//! List the object headers in a raw YAFFS2 NAND dump.
//!
//! The page and spare sizes are detected from the dump unless given on the command line. A
//! config file describing them is left next to the image for The Sleuth Kit, so that `fls` and
//! friends can be pointed at the same dump afterwards.

use anyhow::{Context, Result};
use clap::{Args, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use yaffs2_probe::{
    detect_geometry_or_default, scan, DetectionCandidates, Geometry, TskConfig,
};

#[derive(Args, Debug)]
struct GeometryOptions {
    /// Page size in bytes; together with --spare-size, skips auto-detection
    #[clap(long, requires = "spare_size")]
    page_size: Option<usize>,

    /// Spare (OOB) size in bytes
    #[clap(long, requires = "page_size")]
    spare_size: Option<usize>,

    /// Offset of the tag within the spare area
    #[clap(long, requires = "page_size")]
    spare_skip: Option<usize>,
}

impl GeometryOptions {
    /// The geometry given on the command line, if any
    fn manual(&self) -> Option<Geometry> {
        let defaults = Geometry::default();
        Some(Geometry {
            page_size: self.page_size?,
            spare_size: self.spare_size?,
            spare_skip: self.spare_skip.unwrap_or(defaults.spare_skip),
            byte_order: defaults.byte_order,
        })
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    /// The NAND dump to read
    image: PathBuf,

    #[clap(flatten)]
    geometry: GeometryOptions,

    /// Where to write the Sleuth Kit config [default: <IMAGE>-yaffs2.config]
    #[clap(long, conflicts_with = "no_tsk_config")]
    tsk_config: Option<PathBuf>,

    /// Don't write a Sleuth Kit config
    #[clap(long)]
    no_tsk_config: bool,

    /// Don't show a progress line
    #[clap(long)]
    no_progress: bool,
}

impl Cli {
    fn tsk_config_path(&self) -> Option<PathBuf> {
        if self.no_tsk_config {
            return None;
        }
        Some(
            self.tsk_config
                .clone()
                .unwrap_or_else(|| TskConfig::default_path(&self.image)),
        )
    }
}

/// Write the Sleuth Kit config; failing to do so doesn't stop the scan
fn write_tsk_config(geometry: &Geometry, path: PathBuf) {
    match TskConfig::from(geometry).write_to(&path) {
        Ok(()) => info!(path = %path.display(), "wrote TSK config"),
        Err(error) => warn!(path = %path.display(), %error, "could not write TSK config"),
    }
}

fn list_headers(image: &mut File, geometry: Geometry) -> Result<()> {
    for header in scan(image, geometry)? {
        let header = header.context("scan aborted")?;
        println!("{header}");
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if !args.no_progress {
        howudoin::init(howudoin::consumers::TermLine::default());
    }

    let mut image = File::open(&args.image)
        .with_context(|| format!("could not open {}", args.image.display()))?;

    let geometry = match args.geometry.manual() {
        Some(geometry) => {
            info!(%geometry, "using geometry from the command line");
            geometry
        }
        None => detect_geometry_or_default(&mut image, &DetectionCandidates::default())?,
    };

    if let Some(path) = args.tsk_config_path() {
        write_tsk_config(&geometry, path);
    }

    let result = list_headers(&mut image, geometry);

    if !args.no_progress {
        howudoin::disable();
        thread::sleep(Duration::from_millis(10)); // Give howudoin time to shut down
    }

    result
}
