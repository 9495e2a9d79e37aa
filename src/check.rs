//! The checker proper: a fixed sequence of passes, stopping at the first
//! inconsistency.

use log::*;

use crate::bitmap::BitmapView;
use crate::dir;
use crate::error::{Result, Violation};
use crate::graph::ReferenceGraph;
use crate::inode::{InodeTable, InodeType};
use crate::layout::{Layout, ROOTINO};
use crate::usage::BlockUsage;

/// Figures from a clean run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    pub inodes: u32,
    pub blocks: u32,
    pub dirs: u32,
    pub entries: u64,
}

pub fn fsck(buf: &[u8]) -> Result<Report> {
    let layout = Layout::new(buf)?;
    let table = InodeTable::new(buf, layout);
    let bitmap = BitmapView::new(buf, layout);

    // pass1: inode types and block pointers
    let mut usage = BlockUsage::new(layout)?;
    let inodes = usage.scan(&table, &bitmap)?;

    // pass2: bitmap vs. claimed blocks
    usage.cross_check(&bitmap)?;

    // pass3: root and directory format
    dir::check_root(&table)?;
    let mut graph = ReferenceGraph::new(layout.sb.ninodes)?;
    let dirs = dir::check_format(&table, &mut graph)?;

    // pass4: directory tree
    let entries = graph.build(&table)?;
    check_parents(&table, &graph)?;
    check_links(&table, &graph)?;

    let report = Report {
        inodes,
        blocks: usage.claimed() as u32,
        dirs,
        entries,
    };
    info!("clean: {:?}", report);
    Ok(report)
}

/// A directory listed by another must name that directory in its "..".
fn check_parents(table: &InodeTable, graph: &ReferenceGraph) -> std::result::Result<(), Violation> {
    for (inum, _) in table.dirs().filter(|&(inum, _)| inum != ROOTINO) {
        let Some(refs) = graph.get(inum) else {
            continue;
        };
        if let Some(observed) = refs.observed_parent {
            if refs.declared_parent != Some(observed) {
                debug!(
                    "dir {}: .. -> {:?}, listed by {}",
                    inum, refs.declared_parent, observed
                );
                return Err(Violation::ParentMismatch {
                    inum,
                    declared: refs.declared_parent,
                    observed,
                });
            }
        }
    }
    Ok(())
}

/// Reachability and link counts, one rule at a time over the whole table.
fn check_links(table: &InodeTable, graph: &ReferenceGraph) -> std::result::Result<(), Violation> {
    let refs = |inum: u32| graph.get(inum).copied().unwrap_or_default();

    for (inum, dinode) in table.iter() {
        if dinode.kind() != Some(InodeType::Free) && !refs(inum).referenced {
            debug!("ino {}: in use, no directory names it", inum);
            return Err(Violation::Unreferenced { inum });
        }
    }

    for (inum, r) in graph.iter() {
        if r.referenced && table.kind(inum) == Some(InodeType::Free) {
            debug!("ino {}: free, {} entries name it", inum, r.ref_count);
            return Err(Violation::ReferencedFree { inum });
        }
    }

    for (inum, dinode) in table.iter() {
        if dinode.kind() != Some(InodeType::File) {
            continue;
        }
        let count = refs(inum).ref_count;
        if i64::from(dinode.nlink) != i64::from(count) {
            debug!("file {}: nlink={}, refs={}", inum, dinode.nlink, count);
            return Err(Violation::BadRefCount {
                inum,
                nlink: dinode.nlink,
                refs: count,
            });
        }
    }

    for (inum, _) in table.dirs().filter(|&(inum, _)| inum != ROOTINO) {
        let count = refs(inum).dir_ref_count;
        if count > 1 {
            debug!("dir {}: {} entries name it", inum, count);
            return Err(Violation::DirLinkedTwice { inum });
        }
    }

    Ok(())
}
