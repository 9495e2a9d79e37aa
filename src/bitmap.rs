use crate::layout::{Layout, BPB};

pub(crate) fn setbit(buf: &mut [u8], idx: usize) {
    buf[idx / 8] |= 1 << (idx % 8);
}
pub(crate) fn clrbit(buf: &mut [u8], idx: usize) {
    buf[idx / 8] &= !(1 << (idx % 8));
}
pub(crate) fn isset(buf: &[u8], idx: usize) -> bool {
    buf.get(idx / 8).map_or(false, |b| b & (1 << (idx % 8)) != 0)
}

/// Read-only view over the block allocation bitmap.
#[derive(Clone, Copy)]
pub struct BitmapView<'a> {
    buf: &'a [u8],
    layout: Layout,
}

impl<'a> BitmapView<'a> {
    pub fn new(buf: &'a [u8], layout: Layout) -> Self {
        BitmapView { buf, layout }
    }

    /// Whether the bitmap marks `blk` allocated. A bit that falls outside the
    /// image reads as free.
    pub fn is_allocated(&self, blk: u32) -> bool {
        let bblk = self.layout.bblock(blk);
        let bi = (blk % BPB) as usize;
        self.layout
            .blk0(self.buf, bblk)
            .map_or(false, |map| isset(map, bi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Superblock, BSIZE};

    #[test]
    fn bit_test() {
        let mut buf = [0u8; 4];
        setbit(&mut buf, 0);
        setbit(&mut buf, 9);
        setbit(&mut buf, 31);
        assert_eq!(buf, [0x01, 0x02, 0x00, 0x80]);
        assert!(isset(&buf, 9));
        assert!(!isset(&buf, 10));
        assert!(!isset(&buf, 64));

        clrbit(&mut buf, 9);
        assert_eq!(buf, [0x01, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn view_test() {
        // 16 inodes: bitmap lives in block 2 / IPB + 3 = 5
        let sb = Superblock {
            size: 16,
            nblocks: 10,
            ninodes: 16,
            nlog: 0,
        };
        let mut buf = vec![0u8; 16 * BSIZE];
        sb.write(&mut buf[BSIZE..]);
        let layout = Layout::new(&buf).unwrap();
        assert_eq!(layout.bblock(0), 5);

        setbit(&mut buf[5 * BSIZE..6 * BSIZE], 7);
        setbit(&mut buf[5 * BSIZE..6 * BSIZE], 13);

        let bitmap = BitmapView::new(&buf, layout);
        assert!(bitmap.is_allocated(7));
        assert!(bitmap.is_allocated(13));
        assert!(!bitmap.is_allocated(8));
        assert!(!bitmap.is_allocated(12));
    }
}
