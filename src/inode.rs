use derive_more::Display;

use crate::layout::{le_i16, le_u32, put_u16, put_u32, Layout, DINODE_SIZE, IPB, NDIRECT};

// stat.h
pub const T_DIR: i16 = 1; /* Directory */
pub const T_FILE: i16 = 2; /* File */
pub const T_DEV: i16 = 3; /* Device */

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    #[display(fmt = "free")]
    Free,
    #[display(fmt = "dir")]
    Dir,
    #[display(fmt = "file")]
    File,
    #[display(fmt = "dev")]
    Dev,
}

impl InodeType {
    pub fn from_raw(type_: i16) -> Option<Self> {
        match type_ {
            0 => Some(InodeType::Free),
            T_DIR => Some(InodeType::Dir),
            T_FILE => Some(InodeType::File),
            T_DEV => Some(InodeType::Dev),
            _ => None,
        }
    }

    pub fn raw(self) -> i16 {
        match self {
            InodeType::Free => 0,
            InodeType::Dir => T_DIR,
            InodeType::File => T_FILE,
            InodeType::Dev => T_DEV,
        }
    }
}

/// On-disk inode.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dinode {
    pub type_: i16,                 /*  0: File type */
    pub major: i16,                 /*  2: Major device number (T_DEV only) */
    pub minor: i16,                 /*  4: Minor device number (T_DEV only) */
    pub nlink: i16,                 /*  6: Number of links to inode in file system */
    pub size: u32,                  /*  8: Size of file (bytes) */
    pub addrs: [u32; NDIRECT + 1], /* 12: Data block addresses */
}

impl Dinode {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let mut addrs = [0u32; NDIRECT + 1];
        for (i, addr) in addrs.iter_mut().enumerate() {
            *addr = le_u32(buf, 12 + i * 4)?;
        }
        Some(Dinode {
            type_: le_i16(buf, 0)?,
            major: le_i16(buf, 2)?,
            minor: le_i16(buf, 4)?,
            nlink: le_i16(buf, 6)?,
            size: le_u32(buf, 8)?,
            addrs,
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        put_u16(buf, 0, self.type_ as u16);
        put_u16(buf, 2, self.major as u16);
        put_u16(buf, 4, self.minor as u16);
        put_u16(buf, 6, self.nlink as u16);
        put_u32(buf, 8, self.size);
        for (i, addr) in self.addrs.iter().enumerate() {
            put_u32(buf, 12 + i * 4, *addr);
        }
    }

    /// `None` for a type value outside the known set.
    pub fn kind(&self) -> Option<InodeType> {
        InodeType::from_raw(self.type_)
    }

    pub fn is_dir(&self) -> bool {
        self.type_ == T_DIR
    }

    pub fn direct(&self) -> &[u32] {
        &self.addrs[..NDIRECT]
    }

    pub fn indirect(&self) -> u32 {
        self.addrs[NDIRECT]
    }
}

/// Typed view over the inode array of an image.
#[derive(Clone, Copy)]
pub struct InodeTable<'a> {
    buf: &'a [u8],
    layout: Layout,
}

impl<'a> InodeTable<'a> {
    pub fn new(buf: &'a [u8], layout: Layout) -> Self {
        InodeTable { buf, layout }
    }

    pub fn ninodes(&self) -> u32 {
        self.layout.sb.ninodes
    }

    pub fn dinode(&self, inum: u32) -> Option<Dinode> {
        if inum >= self.ninodes() {
            return None;
        }
        let blkbuf = self.layout.blk0(self.buf, self.layout.iblock(inum))?;
        let offset = (inum % IPB) as usize * DINODE_SIZE;
        Dinode::parse(blkbuf.get(offset..offset + DINODE_SIZE)?)
    }

    /// Type of `inum`; `None` when out of the table or not a known type.
    pub fn kind(&self, inum: u32) -> Option<InodeType> {
        self.dinode(inum).and_then(|d| d.kind())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Dinode)> + 'a {
        let table = *self;
        (0..self.ninodes()).filter_map(move |inum| table.dinode(inum).map(|d| (inum, d)))
    }

    pub fn dirs(&self) -> impl Iterator<Item = (u32, Dinode)> + 'a {
        self.iter().filter(|(_, d)| d.is_dir())
    }

    /// Contents of a data block; `None` outside the data region.
    pub fn block(&self, blk: u32) -> Option<&'a [u8]> {
        if !self.layout.is_data_block(blk) {
            return None;
        }
        self.layout.blk0(self.buf, blk)
    }

    /// Indirect block entries of `blk`, zeros included.
    pub fn indir_addrs(&self, blk: u32) -> impl Iterator<Item = u32> + 'a {
        self.layout.indir_addrs(self.buf, blk)
    }

    /// Data blocks of `dinode` in file order: the direct pointers, then the
    /// children of the indirect block. The indirect block itself is not
    /// yielded, and zero or out-of-range pointers are skipped.
    pub fn data_blocks(&self, dinode: &Dinode) -> impl Iterator<Item = u32> + 'a {
        let layout = self.layout;
        let mut direct = [0u32; NDIRECT];
        direct.copy_from_slice(dinode.direct());

        let indirect = Some(dinode.indirect()).filter(|&b| layout.is_data_block(b));
        let table = *self;

        direct
            .into_iter()
            .chain(indirect.into_iter().flat_map(move |b| table.indir_addrs(b)))
            .filter(move |&b| layout.is_data_block(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{put_u32, Superblock, BSIZE, NINDIRECT};
    use memoffset::offset_of;

    #[test]
    fn inode_test() {
        assert_eq!(offset_of!(Dinode, type_), 0);
        assert_eq!(offset_of!(Dinode, nlink), 6);
        assert_eq!(offset_of!(Dinode, size), 8);
        assert_eq!(offset_of!(Dinode, addrs), 12);

        assert_eq!(std::mem::size_of::<Dinode>(), DINODE_SIZE);
    }

    #[test]
    fn type_test() {
        assert_eq!(InodeType::from_raw(0), Some(InodeType::Free));
        assert_eq!(InodeType::from_raw(3), Some(InodeType::Dev));
        assert_eq!(InodeType::from_raw(4), None);
        assert_eq!(InodeType::from_raw(-1), None);
        assert_eq!(InodeType::File.raw(), T_FILE);
        assert_eq!(InodeType::Dir.to_string(), "dir");
    }

    fn table_image() -> Vec<u8> {
        let sb = Superblock {
            size: 32,
            nblocks: 26,
            ninodes: 16,
            nlog: 0,
        };
        let mut buf = vec![0u8; 32 * BSIZE];
        sb.write(&mut buf[BSIZE..]);
        buf
    }

    #[test]
    fn table_test() {
        let mut buf = table_image();
        let mut dinode = Dinode {
            type_: T_FILE,
            nlink: 1,
            size: 3 * BSIZE as u32,
            ..Default::default()
        };
        dinode.addrs[0] = 10;
        dinode.addrs[1] = 0;
        dinode.addrs[2] = 11;
        dinode.addrs[NDIRECT] = 12;

        // inode 9 lives in the second table block
        let off = 3 * BSIZE + DINODE_SIZE;
        dinode.write(&mut buf[off..off + DINODE_SIZE]);
        put_u32(&mut buf, 12 * BSIZE, 13);
        put_u32(&mut buf, 12 * BSIZE + 4 * (NINDIRECT - 1), 14);
        // out of range, skipped
        put_u32(&mut buf, 12 * BSIZE + 4, 40);

        let layout = Layout::new(&buf).unwrap();
        let table = InodeTable::new(&buf, layout);
        assert_eq!(table.dinode(9), Some(dinode));
        assert_eq!(table.kind(9), Some(InodeType::File));
        assert_eq!(table.kind(8), Some(InodeType::Free));
        assert_eq!(table.dinode(16), None);

        let blocks = table.data_blocks(&dinode).collect::<Vec<_>>();
        assert_eq!(blocks, vec![10, 11, 13, 14]);
        assert_eq!(table.iter().count(), 16);
    }

    #[test]
    fn bad_indirect_test() {
        let buf = table_image();
        let layout = Layout::new(&buf).unwrap();
        let table = InodeTable::new(&buf, layout);

        let mut dinode = Dinode {
            type_: T_DIR,
            ..Default::default()
        };
        dinode.addrs[0] = 5; // bitmap block
        dinode.addrs[NDIRECT] = 1000;
        assert_eq!(table.data_blocks(&dinode).count(), 0);
    }
}
