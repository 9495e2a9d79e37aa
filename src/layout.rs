//! Fixed xv6 geometry and superblock-derived addressing.
//!
//! Block 0 is the boot block, block 1 the superblock, the inode table starts
//! at block 2 and the allocation bitmap follows it. Everything from `min_db`
//! to the end of the image is the data region.

use log::*;

use crate::error::{Error, Result};

// fs.h
pub const BSIZE: usize = 512; /* block size */
pub const ROOTINO: u32 = 1; /* root i-number */
pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / std::mem::size_of::<u32>();
pub const MAXFILE: usize = NDIRECT + NINDIRECT;
pub const DIRSIZ: usize = 14;

pub const DINODE_SIZE: usize = 64;
pub const DIRENT_SIZE: usize = 16;

/* Inodes per block. */
pub const IPB: u32 = (BSIZE / DINODE_SIZE) as u32;
/* Bitmap bits per block. */
pub const BPB: u32 = (BSIZE * 8) as u32;

pub const SUPERBLOCK: u32 = 1;
pub const INODE_START: u32 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Superblock {
    pub size: u32,    /*  0: Size of file system image (blocks) */
    pub nblocks: u32, /*  4: Number of data blocks */
    pub ninodes: u32, /*  8: Number of inodes */
    pub nlog: u32,    /* 12: Number of log blocks */
}

impl Superblock {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        Some(Superblock {
            size: le_u32(buf, 0)?,
            nblocks: le_u32(buf, 4)?,
            ninodes: le_u32(buf, 8)?,
            nlog: le_u32(buf, 12)?,
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.size);
        put_u32(buf, 4, self.nblocks);
        put_u32(buf, 8, self.ninodes);
        put_u32(buf, 12, self.nlog);
    }
}

pub(crate) fn le_u32(buf: &[u8], off: usize) -> Option<u32> {
    let b = buf.get(off..off.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn le_u16(buf: &[u8], off: usize) -> Option<u16> {
    let b = buf.get(off..off.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn le_i16(buf: &[u8], off: usize) -> Option<i16> {
    le_u16(buf, off).map(|v| v as i16)
}

pub(crate) fn put_u32(buf: &mut [u8], off: usize, val: u32) {
    buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
}

pub(crate) fn put_u16(buf: &mut [u8], off: usize, val: u16) {
    buf[off..off + 2].copy_from_slice(&val.to_le_bytes());
}

/// Superblock plus the addressing derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub sb: Superblock,
    /// first valid data block
    pub min_db: u32,
    /// last valid data block
    pub max_db: u32,
}

impl Layout {
    /// Addressing for `sb` without looking at any image.
    pub fn from_superblock(sb: Superblock) -> Self {
        Layout {
            sb,
            min_db: sb.size.saturating_sub(sb.nblocks),
            max_db: sb.size.saturating_sub(1),
        }
    }

    /// Decode the superblock of `buf` and make sure every block it describes
    /// can be addressed inside `buf`.
    pub fn new(buf: &[u8]) -> Result<Self> {
        let sbbuf = buf
            .get(SUPERBLOCK as usize * BSIZE..(SUPERBLOCK as usize + 1) * BSIZE)
            .ok_or(Error::Geometry("image has no superblock"))?;
        let sb = Superblock::parse(sbbuf).ok_or(Error::Geometry("image has no superblock"))?;

        info!("sb={:?}, image={} bytes", sb, buf.len());

        if sb.size < 2 {
            return Err(Error::Geometry("size smaller than two blocks"));
        }
        if sb.size as u64 * BSIZE as u64 > buf.len() as u64 {
            return Err(Error::Geometry("image shorter than superblock size"));
        }
        if sb.nblocks > sb.size {
            return Err(Error::Geometry("more data blocks than blocks"));
        }

        let layout = Layout::from_superblock(sb);
        if sb.ninodes > 0 && layout.iblock(sb.ninodes - 1) >= layout.min_db {
            return Err(Error::Geometry("inode table overlaps data blocks"));
        }
        if layout.bblock(sb.size - 1) >= layout.min_db {
            return Err(Error::Geometry("bitmap overlaps data blocks"));
        }

        debug!(
            "layout: inodes from {}, bitmap at {}..={}, data {}..={}",
            INODE_START,
            layout.bblock(0),
            layout.bblock(sb.size - 1),
            layout.min_db,
            layout.max_db
        );
        Ok(layout)
    }

    /// Block containing inode `inum`.
    pub fn iblock(&self, inum: u32) -> u32 {
        inum / IPB + INODE_START
    }

    /// Bitmap block containing the bit for block `blk`.
    pub fn bblock(&self, blk: u32) -> u32 {
        blk / BPB + self.sb.ninodes / IPB + 3
    }

    pub fn is_data_block(&self, blk: u32) -> bool {
        self.min_db <= blk && blk <= self.max_db && blk < self.sb.size
    }

    pub fn data_blocks(&self) -> std::ops::RangeInclusive<u32> {
        self.min_db..=self.max_db
    }

    pub fn blk0_range(&self, blk: u32) -> std::ops::Range<usize> {
        let start = blk as usize * BSIZE;
        start..start + BSIZE
    }

    /// Contents of block `blk`, or `None` past the end of the file system.
    pub fn blk0<'b>(&self, buf: &'b [u8], blk: u32) -> Option<&'b [u8]> {
        if blk >= self.sb.size {
            return None;
        }
        buf.get(self.blk0_range(blk))
    }

    /// Block numbers stored in indirect block `blk`, zeros included.
    pub fn indir_addrs<'b>(&self, buf: &'b [u8], blk: u32) -> impl Iterator<Item = u32> + 'b {
        self.blk0(buf, blk)
            .unwrap_or(&[])
            .chunks_exact(std::mem::size_of::<u32>())
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
    }
}
