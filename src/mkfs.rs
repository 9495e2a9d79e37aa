//! Image builder following xv6 mkfs: metadata blocks are marked allocated
//! up front, data blocks are handed out in order, and files grow through
//! their direct pointers before the single indirect block.
//!
//! The raw setters (`update_dinode`, `set_allocated`, `write_u32`, ...) exist
//! so tests can damage an otherwise clean image.

use log::*;
use thiserror::Error;

use crate::bitmap::{clrbit, setbit};
use crate::dir::Dirent;
use crate::inode::{Dinode, InodeType};
use crate::layout::{
    le_u32, put_u32, Layout, Superblock, BPB, BSIZE, DINODE_SIZE, DIRENT_SIZE, IPB, MAXFILE,
    NDIRECT, ROOTINO, SUPERBLOCK,
};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{size} blocks cannot hold metadata for {ninodes} inodes")]
    Geometry { size: u32, ninodes: u32 },
    #[error("out of inodes")]
    OutOfInodes,
    #[error("out of data blocks")]
    OutOfBlocks,
    #[error("inode {0} would exceed the maximum file size")]
    FileTooLarge(u32),
    #[error("no inode {0}")]
    NoInode(u32),
}

pub type Result<T> = std::result::Result<T, BuildError>;

pub struct ImageBuilder {
    buf: Vec<u8>,
    layout: Layout,
    freeinode: u32,
    freeblock: u32,
}

impl ImageBuilder {
    /// Lay out an image of `size` blocks with `ninodes` inodes and create
    /// the root directory.
    pub fn new(size: u32, ninodes: u32) -> Result<Self> {
        let bitblocks = size / BPB + 1;
        let usedblocks = ninodes / IPB + 3 + bitblocks;
        if usedblocks >= size || ninodes <= ROOTINO {
            return Err(BuildError::Geometry { size, ninodes });
        }

        let sb = Superblock {
            size,
            nblocks: size - usedblocks,
            ninodes,
            nlog: 0,
        };
        debug!("mkfs: {:?}, usedblocks={}", sb, usedblocks);

        let mut buf = vec![0u8; size as usize * BSIZE];
        let sboff = SUPERBLOCK as usize * BSIZE;
        sb.write(&mut buf[sboff..sboff + BSIZE]);

        let mut builder = ImageBuilder {
            buf,
            layout: Layout::from_superblock(sb),
            freeinode: ROOTINO,
            freeblock: usedblocks,
        };
        for blk in 0..usedblocks {
            builder.set_allocated(blk, true);
        }

        let root = builder.ialloc(InodeType::Dir)?;
        builder.add_entry(root, ".", root)?;
        builder.add_entry(root, "..", root)?;
        Ok(builder)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn dinode_range(&self, inum: u32) -> Result<std::ops::Range<usize>> {
        if inum >= self.layout.sb.ninodes {
            return Err(BuildError::NoInode(inum));
        }
        let off = self.layout.iblock(inum) as usize * BSIZE + (inum % IPB) as usize * DINODE_SIZE;
        Ok(off..off + DINODE_SIZE)
    }

    pub fn dinode(&self, inum: u32) -> Result<Dinode> {
        let range = self.dinode_range(inum)?;
        Dinode::parse(&self.buf[range]).ok_or(BuildError::NoInode(inum))
    }

    pub fn update_dinode<F>(&mut self, inum: u32, f: F) -> Result<()>
    where
        F: FnOnce(&mut Dinode),
    {
        let mut dinode = self.dinode(inum)?;
        f(&mut dinode);
        let range = self.dinode_range(inum)?;
        dinode.write(&mut self.buf[range]);
        Ok(())
    }

    pub fn ialloc(&mut self, kind: InodeType) -> Result<u32> {
        let inum = self.freeinode;
        if inum >= self.layout.sb.ninodes {
            return Err(BuildError::OutOfInodes);
        }
        self.freeinode += 1;

        let dinode = Dinode {
            type_: kind.raw(),
            nlink: 1,
            ..Default::default()
        };
        self.update_dinode(inum, |d| *d = dinode)?;
        trace!("ialloc: {} {}", kind, inum);
        Ok(inum)
    }

    fn balloc(&mut self) -> Result<u32> {
        let blk = self.freeblock;
        if blk > self.layout.max_db {
            return Err(BuildError::OutOfBlocks);
        }
        self.freeblock += 1;
        self.set_allocated(blk, true);
        Ok(blk)
    }

    /// Flip the bitmap bit of `blk`.
    pub fn set_allocated(&mut self, blk: u32, allocated: bool) {
        let range = self.layout.blk0_range(self.layout.bblock(blk));
        let map = &mut self.buf[range];
        let bi = (blk % BPB) as usize;
        if allocated {
            setbit(map, bi);
        } else {
            clrbit(map, bi);
        }
    }

    /// Store `val` as the `idx`th word of block `blk`.
    pub fn write_u32(&mut self, blk: u32, idx: usize, val: u32) {
        let off = blk as usize * BSIZE + idx * 4;
        put_u32(&mut self.buf, off, val);
    }

    pub fn block_mut(&mut self, blk: u32) -> &mut [u8] {
        let range = self.layout.blk0_range(blk);
        &mut self.buf[range]
    }

    /// Disk block holding file block `fbn` of `inum`, 0 when unallocated.
    pub fn block_of(&self, inum: u32, fbn: usize) -> Result<u32> {
        let dinode = self.dinode(inum)?;
        if fbn < NDIRECT {
            return Ok(dinode.addrs[fbn]);
        }
        let indir = dinode.indirect();
        if indir == 0 || fbn >= MAXFILE {
            return Ok(0);
        }
        let off = indir as usize * BSIZE + (fbn - NDIRECT) * 4;
        Ok(le_u32(&self.buf, off).unwrap_or(0))
    }

    /// Append `data` to the end of `inum`, allocating blocks as needed.
    pub fn append(&mut self, inum: u32, data: &[u8]) -> Result<()> {
        let mut dinode = self.dinode(inum)?;
        let mut off = dinode.size as usize;
        let mut data = data;

        while !data.is_empty() {
            let fbn = off / BSIZE;
            if fbn >= MAXFILE {
                return Err(BuildError::FileTooLarge(inum));
            }

            let blk = if fbn < NDIRECT {
                if dinode.addrs[fbn] == 0 {
                    dinode.addrs[fbn] = self.balloc()?;
                }
                dinode.addrs[fbn]
            } else {
                if dinode.addrs[NDIRECT] == 0 {
                    dinode.addrs[NDIRECT] = self.balloc()?;
                }
                let indir = dinode.addrs[NDIRECT];
                let idx = fbn - NDIRECT;
                match le_u32(&self.buf, indir as usize * BSIZE + idx * 4).unwrap_or(0) {
                    0 => {
                        let blk = self.balloc()?;
                        self.write_u32(indir, idx, blk);
                        blk
                    }
                    blk => blk,
                }
            };

            let n = data.len().min((fbn + 1) * BSIZE - off);
            let start = blk as usize * BSIZE + off - fbn * BSIZE;
            self.buf[start..start + n].copy_from_slice(&data[..n]);
            data = &data[n..];
            off += n;
        }

        dinode.size = off as u32;
        let range = self.dinode_range(inum)?;
        dinode.write(&mut self.buf[range]);
        Ok(())
    }

    /// Append a raw entry to directory `dir`; link counts are left alone.
    pub fn add_entry(&mut self, dir: u32, name: &str, target: u32) -> Result<()> {
        let inum = u16::try_from(target).map_err(|_| BuildError::NoInode(target))?;
        let mut raw = [0u8; DIRENT_SIZE];
        Dirent::new(inum, name.as_bytes()).write(&mut raw);
        self.append(dir, &raw)
    }

    /// Overwrite entry slot `slot` of directory `dir`.
    pub fn set_entry(&mut self, dir: u32, slot: usize, name: &str, target: u16) -> Result<()> {
        let off = slot * DIRENT_SIZE;
        let blk = self.block_of(dir, off / BSIZE)?;
        if blk == 0 {
            return Err(BuildError::NoInode(dir));
        }
        let start = (off % BSIZE)..(off % BSIZE + DIRENT_SIZE);
        Dirent::new(target, name.as_bytes()).write(&mut self.block_mut(blk)[start]);
        Ok(())
    }

    /// Hard link: a new entry naming `target`, counted in its `nlink` when
    /// it is a file.
    pub fn link(&mut self, dir: u32, name: &str, target: u32) -> Result<()> {
        self.add_entry(dir, name, target)?;
        if self.dinode(target)?.kind() == Some(InodeType::File) {
            self.update_dinode(target, |d| d.nlink += 1)?;
        }
        Ok(())
    }

    pub fn create(&mut self, parent: u32, name: &str, data: &[u8]) -> Result<u32> {
        let inum = self.ialloc(InodeType::File)?;
        self.add_entry(parent, name, inum)?;
        self.append(inum, data)?;
        Ok(inum)
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> Result<u32> {
        let inum = self.ialloc(InodeType::Dir)?;
        self.add_entry(inum, ".", inum)?;
        self.add_entry(inum, "..", parent)?;
        self.add_entry(parent, name, inum)?;
        Ok(inum)
    }

    pub fn mknod(&mut self, parent: u32, name: &str, major: i16, minor: i16) -> Result<u32> {
        let inum = self.ialloc(InodeType::Dev)?;
        self.update_dinode(inum, |d| {
            d.major = major;
            d.minor = minor;
        })?;
        self.add_entry(parent, name, inum)?;
        Ok(inum)
    }
}
