use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use argh::FromArgs;
use fcheck::{fsck, Error};
use log::*;

#[derive(FromArgs)]
/// Check an xv6 file system image for consistency.
struct Args {
    /// file system image to check
    #[argh(positional)]
    image: PathBuf,
}

fn check(args: &Args) -> Result<()> {
    use memmap2::{Mmap, MmapOptions};
    use std::fs::File;

    let file = File::open(&args.image).map_err(|source| Error::Open {
        path: args.image.clone(),
        source,
    })?;
    // the image is only ever read
    let map: Mmap = unsafe { MmapOptions::new().map(&file) }.map_err(Error::Map)?;

    let report = fsck(&map)?;
    info!("{}: {:?}", args.image.display(), report);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Args = argh::from_env();

    match check(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!("{:?}", err);
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
