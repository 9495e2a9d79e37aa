use log::*;

use crate::error::Violation;
use crate::graph::ReferenceGraph;
use crate::inode::InodeTable;
use crate::layout::{le_u16, put_u16, DIRENT_SIZE, DIRSIZ, ROOTINO};

/// On-disk directory entry. `inum == 0` marks an empty slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dirent {
    pub inum: u16,           /* 0: inode number of entry */
    pub name: [u8; DIRSIZ], /* 2: NUL padded, unterminated at DIRSIZ */
}

impl Dirent {
    /// Names longer than `DIRSIZ` are cut, as mkfs does.
    pub fn new(inum: u16, name: &[u8]) -> Self {
        let mut dirent = Dirent {
            inum,
            name: [0; DIRSIZ],
        };
        let len = name.len().min(DIRSIZ);
        dirent.name[..len].copy_from_slice(&name[..len]);
        dirent
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        let mut name = [0u8; DIRSIZ];
        name.copy_from_slice(buf.get(2..2 + DIRSIZ)?);
        Some(Dirent {
            inum: le_u16(buf, 0)?,
            name,
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        put_u16(buf, 0, self.inum);
        buf[2..2 + DIRSIZ].copy_from_slice(&self.name);
    }

    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(DIRSIZ);
        &self.name[..len]
    }

    pub fn filename(&self) -> &str {
        std::str::from_utf8(self.name()).unwrap_or("???")
    }

    pub fn is_dot(&self) -> bool {
        self.name() == b"."
    }

    pub fn is_dotdot(&self) -> bool {
        self.name() == b".."
    }
}

/// All entry slots of a directory block, empty ones included.
pub fn direct_parse(blk: &[u8]) -> impl Iterator<Item = Dirent> + '_ {
    blk.chunks_exact(DIRENT_SIZE).filter_map(Dirent::parse)
}

/// The root inode must be a directory whose first block holds a ".." entry
/// pointing back at the root. The scan stops at the first empty slot.
pub fn check_root(table: &InodeTable) -> Result<(), Violation> {
    let root = match table.dinode(ROOTINO) {
        Some(root) if root.is_dir() && root.addrs[0] != 0 => root,
        other => {
            debug!("root: {:?}", other);
            return Err(Violation::RootMissing);
        }
    };
    let blk = table.block(root.addrs[0]).ok_or(Violation::RootMissing)?;

    let parent = direct_parse(blk)
        .take_while(|de| de.inum != 0)
        .find(|de| de.is_dotdot())
        .map(|de| de.inum as u32);
    if parent != Some(ROOTINO) {
        debug!("root: .. -> {:?}", parent);
        return Err(Violation::RootMissing);
    }
    Ok(())
}

/// Every directory's first block must hold "." naming itself and a "..".
/// The ".." target is recorded in `graph` as the declared parent. Returns the
/// number of directories.
pub fn check_format(table: &InodeTable, graph: &mut ReferenceGraph) -> Result<u32, Violation> {
    let mut ndirs = 0;
    for (inum, dinode) in table.dirs() {
        let bad = Violation::BadDirFormat { inum };
        let first = dinode.addrs[0];
        if first == 0 {
            debug!("dir {}: no first block", inum);
            return Err(bad);
        }
        let blk = table.block(first).ok_or(bad)?;

        let mut dot = false;
        let mut parent = None;
        for de in direct_parse(blk).filter(|de| de.inum != 0) {
            if de.is_dot() {
                if de.inum as u32 != inum {
                    debug!("dir {}: . -> {}", inum, de.inum);
                    return Err(bad);
                }
                dot = true;
            } else if de.is_dotdot() && parent.is_none() {
                parent = Some(de.inum as u32);
            }
        }

        match (dot, parent) {
            (true, Some(parent)) => graph.declare_parent(inum, parent),
            _ => {
                debug!("dir {}: dot={}, dotdot={:?}", inum, dot, parent);
                return Err(bad);
            }
        }
        ndirs += 1;
    }
    Ok(ndirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoffset::offset_of;

    #[test]
    fn dirent_test() {
        assert_eq!(offset_of!(Dirent, inum), 0);
        assert_eq!(offset_of!(Dirent, name), 2);

        assert_eq!(std::mem::size_of::<Dirent>(), DIRENT_SIZE);
    }

    #[test]
    fn name_test() {
        let de = Dirent::new(3, b"README");
        assert_eq!(de.name(), b"README");
        assert_eq!(de.filename(), "README");
        assert!(!de.is_dot());

        let long = Dirent::new(4, b"a-very-long-file-name");
        assert_eq!(long.name(), b"a-very-long-fi");

        let mut buf = [0u8; DIRENT_SIZE];
        long.write(&mut buf);
        assert_eq!(Dirent::parse(&buf), Some(long));
    }

    #[test]
    fn parse_test() {
        let mut blk = [0u8; 4 * DIRENT_SIZE];
        Dirent::new(1, b".").write(&mut blk[0..]);
        Dirent::new(1, b"..").write(&mut blk[DIRENT_SIZE..]);
        Dirent::new(7, b"cat").write(&mut blk[3 * DIRENT_SIZE..]);

        let entries = direct_parse(&blk).collect::<Vec<_>>();
        assert_eq!(entries.len(), 4);
        assert!(entries[0].is_dot());
        assert!(entries[1].is_dotdot());
        assert_eq!(entries[2].inum, 0);
        assert_eq!(entries[3].filename(), "cat");
    }
}
