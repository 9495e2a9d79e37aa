//! Read-only consistency checker for xv6 file system images.

pub mod bitmap;
pub mod check;
pub mod dir;
pub mod error;
pub mod graph;
pub mod inode;
pub mod layout;
pub mod mkfs;
pub mod usage;

pub use check::{fsck, Report};
pub use error::{Error, Result, Violation};
