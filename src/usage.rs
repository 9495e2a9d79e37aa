//! Blocks claimed by inodes, checked against the bitmap as they are claimed.

use log::*;

use crate::bitmap::BitmapView;
use crate::error::{Error, Violation};
use crate::inode::{Dinode, InodeTable, InodeType};
use crate::layout::Layout;

/// Where a pointer was found; picks the diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlkRef {
    /// pointer embedded in the dinode
    Direct,
    /// the indirect block, or a pointer stored inside it
    Indirect,
}

impl BlkRef {
    fn bad_address(self, inum: u32, blk: u32) -> Violation {
        match self {
            BlkRef::Direct => Violation::BadDirectAddress { inum, blk },
            BlkRef::Indirect => Violation::BadIndirectAddress { inum, blk },
        }
    }

    fn used_twice(self, inum: u32, blk: u32) -> Violation {
        match self {
            BlkRef::Direct => Violation::DirectUsedTwice { inum, blk },
            BlkRef::Indirect => Violation::IndirectUsedTwice { inum, blk },
        }
    }
}

pub struct BlockUsage {
    layout: Layout,
    used: Vec<bool>,
}

impl BlockUsage {
    pub fn new(layout: Layout) -> Result<Self, Error> {
        let len = layout.sb.size as usize;
        let mut used = Vec::new();
        used.try_reserve_exact(len)?;
        used.resize(len, false);
        Ok(BlockUsage { layout, used })
    }

    pub fn is_claimed(&self, blk: u32) -> bool {
        self.used.get(blk as usize).copied().unwrap_or(false)
    }

    pub fn claimed(&self) -> usize {
        self.used.iter().filter(|&&u| u).count()
    }

    /// Range, then bitmap, then uniqueness. The first failing check wins.
    fn claim(
        &mut self,
        bitmap: &BitmapView,
        inum: u32,
        blk: u32,
        r: BlkRef,
    ) -> Result<(), Violation> {
        if !self.layout.is_data_block(blk) {
            return Err(r.bad_address(inum, blk));
        }
        if !bitmap.is_allocated(blk) {
            return Err(Violation::MarkedFree { inum, blk });
        }
        let slot = &mut self.used[blk as usize];
        if *slot {
            return Err(r.used_twice(inum, blk));
        }
        *slot = true;
        Ok(())
    }

    fn claim_inode(
        &mut self,
        table: &InodeTable,
        bitmap: &BitmapView,
        inum: u32,
        dinode: &Dinode,
    ) -> Result<(), Violation> {
        for &blk in dinode.direct().iter().filter(|&&b| b != 0) {
            self.claim(bitmap, inum, blk, BlkRef::Direct)?;
        }

        let indir = dinode.indirect();
        if indir == 0 {
            return Ok(());
        }
        self.claim(bitmap, inum, indir, BlkRef::Indirect)?;
        for blk in table.indir_addrs(indir).filter(|&b| b != 0) {
            self.claim(bitmap, inum, blk, BlkRef::Indirect)?;
        }
        Ok(())
    }

    /// Check every inode's type and block pointers, claiming each valid
    /// pointer. Returns the number of inodes in use.
    pub fn scan(&mut self, table: &InodeTable, bitmap: &BitmapView) -> Result<u32, Violation> {
        let mut inuse = 0;
        for (inum, dinode) in table.iter() {
            let kind = dinode.kind().ok_or(Violation::BadInode {
                inum,
                type_: dinode.type_,
            })?;
            if kind == InodeType::Free {
                continue;
            }

            trace!(
                "ino={}, type={}, nlink={}, size={}, addrs={:?}",
                inum,
                kind,
                dinode.nlink,
                dinode.size,
                dinode.addrs
            );

            if let Err(v) = self.claim_inode(table, bitmap, inum, &dinode) {
                debug!("ino={}: {:?}", inum, v);
                return Err(v);
            }
            inuse += 1;
        }

        info!("pass1: {} inodes in use, {} blocks claimed", inuse, self.claimed());
        Ok(inuse)
    }

    /// Every data block the bitmap marks allocated must have been claimed.
    pub fn cross_check(&self, bitmap: &BitmapView) -> Result<(), Violation> {
        for blk in self.layout.data_blocks() {
            if bitmap.is_allocated(blk) && !self.is_claimed(blk) {
                debug!("blk={} allocated in bitmap, no owner", blk);
                return Err(Violation::NotInUse { blk });
            }
        }
        info!("pass2: bitmap agrees over {:?}", self.layout.data_blocks());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ROOTINO;
    use crate::mkfs::ImageBuilder;

    #[test]
    fn claim_test() {
        let b = ImageBuilder::new(64, 4).unwrap();
        let layout = *b.layout();
        let rootblk = b.block_of(ROOTINO, 0).unwrap();
        let buf = b.finish();
        let bitmap = BitmapView::new(&buf, layout);
        let mut usage = BlockUsage::new(layout).unwrap();

        // metadata is allocated in the bitmap, the range check comes first
        assert!(bitmap.is_allocated(1));
        assert_eq!(
            usage.claim(&bitmap, 2, 1, BlkRef::Direct),
            Err(Violation::BadDirectAddress { inum: 2, blk: 1 })
        );
        assert_eq!(
            usage.claim(&bitmap, 2, 64, BlkRef::Indirect),
            Err(Violation::BadIndirectAddress { inum: 2, blk: 64 })
        );

        // a free block is reported as free for either pointer kind
        let free = layout.max_db;
        assert_eq!(
            usage.claim(&bitmap, 2, free, BlkRef::Indirect),
            Err(Violation::MarkedFree { inum: 2, blk: free })
        );
        assert!(!usage.is_claimed(free));

        usage.claim(&bitmap, ROOTINO, rootblk, BlkRef::Direct).unwrap();
        assert!(usage.is_claimed(rootblk));
        assert_eq!(
            usage.claim(&bitmap, 2, rootblk, BlkRef::Direct),
            Err(Violation::DirectUsedTwice { inum: 2, blk: rootblk })
        );
        assert_eq!(
            usage.claim(&bitmap, 3, rootblk, BlkRef::Indirect),
            Err(Violation::IndirectUsedTwice { inum: 3, blk: rootblk })
        );
        assert_eq!(usage.claimed(), 1);
    }

    #[test]
    fn scan_test() {
        let mut b = ImageBuilder::new(64, 4).unwrap();
        b.create(ROOTINO, "a", b"data").unwrap();
        let layout = *b.layout();
        let buf = b.finish();
        let table = InodeTable::new(&buf, layout);
        let bitmap = BitmapView::new(&buf, layout);

        let mut usage = BlockUsage::new(layout).unwrap();
        assert_eq!(usage.scan(&table, &bitmap), Ok(2));
        assert_eq!(usage.claimed(), 2);
        assert_eq!(usage.cross_check(&bitmap), Ok(()));

        // nothing claimed, so the root's block is the first orphan
        let usage = BlockUsage::new(layout).unwrap();
        assert_eq!(
            usage.cross_check(&bitmap),
            Err(Violation::NotInUse { blk: layout.min_db })
        );
    }
}
