//! Who references whom, collected by walking every directory's entries.

use log::*;

use crate::dir::{direct_parse, Dirent};
use crate::error::{Error, Violation};
use crate::inode::{InodeTable, InodeType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Refs {
    /// named by some entry other than "."
    pub referenced: bool,
    /// entries naming this inode, "." excluded
    pub ref_count: u32,
    /// entries naming this inode, "." and ".." excluded
    pub dir_ref_count: u32,
    /// directory whose entry names this directory
    pub observed_parent: Option<u32>,
    /// target of this directory's own ".."
    pub declared_parent: Option<u32>,
}

pub struct ReferenceGraph {
    refs: Vec<Refs>,
}

impl ReferenceGraph {
    pub fn new(ninodes: u32) -> Result<Self, Error> {
        let len = ninodes as usize;
        let mut refs = Vec::new();
        refs.try_reserve_exact(len)?;
        refs.resize(len, Refs::default());
        Ok(ReferenceGraph { refs })
    }

    pub fn get(&self, inum: u32) -> Option<&Refs> {
        self.refs.get(inum as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Refs)> + '_ {
        self.refs.iter().enumerate().map(|(i, r)| (i as u32, r))
    }

    pub fn declare_parent(&mut self, inum: u32, parent: u32) {
        if let Some(refs) = self.refs.get_mut(inum as usize) {
            refs.declared_parent = Some(parent);
        }
    }

    /// Walk the entries of every directory, direct blocks first, then the
    /// children of the indirect block. Returns the number of entries seen.
    pub fn build(&mut self, table: &InodeTable) -> Result<u64, Violation> {
        let mut nentries = 0;
        for (dir, dinode) in table.dirs() {
            for blk in table.data_blocks(&dinode) {
                let Some(data) = table.block(blk) else {
                    continue;
                };
                for de in direct_parse(data).filter(|de| de.inum != 0) {
                    self.record(table, dir, &de)?;
                    nentries += 1;
                }
            }
        }
        info!("refs: {} directory entries", nentries);
        Ok(nentries)
    }

    fn record(&mut self, table: &InodeTable, dir: u32, de: &Dirent) -> Result<(), Violation> {
        let target = de.inum as u32;
        trace!("dir {}: {} -> {}", dir, de.filename(), target);

        let Some(refs) = self.refs.get_mut(target as usize) else {
            warn!(
                "dir {}: entry {:?} names inode {} past the table, skipped",
                dir,
                de.filename(),
                target
            );
            return Ok(());
        };

        if de.is_dot() {
            return Ok(());
        }
        let dotdot = de.is_dotdot();

        if !dotdot && table.kind(target) == Some(InodeType::Dir) {
            match refs.observed_parent {
                Some(parent) if parent != dir => {
                    debug!("dir {} listed by {} and {}", target, parent, dir);
                    return Err(Violation::DirLinkedTwice { inum: target });
                }
                _ => refs.observed_parent = Some(dir),
            }
        }

        refs.referenced = true;
        refs.ref_count = refs.ref_count.saturating_add(1);
        if !dotdot {
            refs.dir_ref_count = refs.dir_ref_count.saturating_add(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Layout, ROOTINO};
    use crate::mkfs::ImageBuilder;

    fn build(b: ImageBuilder) -> Result<(ReferenceGraph, u64), Violation> {
        let buf = b.finish();
        let layout = Layout::new(&buf).unwrap();
        let table = InodeTable::new(&buf, layout);
        let mut graph = ReferenceGraph::new(layout.sb.ninodes).unwrap();
        let n = graph.build(&table)?;
        Ok((graph, n))
    }

    #[test]
    fn record_test() {
        let mut b = ImageBuilder::new(64, 8).unwrap();
        let d = b.mkdir(ROOTINO, "d").unwrap();
        let f = b.create(d, "f", b"x").unwrap();
        b.link(ROOTINO, "g", f).unwrap();
        b.add_entry(d, "far", 40).unwrap();

        let (mut graph, n) = build(b).unwrap();
        // the entry past the table is seen but not recorded
        assert_eq!(n, 8);
        assert_eq!(graph.get(40), None);

        // "." is never counted, ".." only in ref_count
        let root = graph.get(ROOTINO).unwrap();
        assert!(root.referenced);
        assert_eq!(root.ref_count, 2);
        assert_eq!(root.dir_ref_count, 0);
        assert_eq!(root.observed_parent, None);

        let dir = *graph.get(d).unwrap();
        assert_eq!((dir.ref_count, dir.dir_ref_count), (1, 1));
        assert_eq!(dir.observed_parent, Some(ROOTINO));

        let file = graph.get(f).unwrap();
        assert_eq!((file.ref_count, file.dir_ref_count), (2, 2));
        assert_eq!(file.observed_parent, None);

        assert_eq!(graph.iter().filter(|(_, r)| r.referenced).count(), 3);

        graph.declare_parent(d, ROOTINO);
        graph.declare_parent(40, ROOTINO);
        assert_eq!(graph.get(d).unwrap().declared_parent, Some(ROOTINO));
    }

    #[test]
    fn linked_twice_test() {
        let mut b = ImageBuilder::new(64, 8).unwrap();
        let d = b.mkdir(ROOTINO, "d").unwrap();
        let e = b.mkdir(ROOTINO, "e").unwrap();
        b.add_entry(d, "e2", e).unwrap();
        assert!(matches!(build(b), Err(Violation::DirLinkedTwice { inum }) if inum == e));
    }
}
