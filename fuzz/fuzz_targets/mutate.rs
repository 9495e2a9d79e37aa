#![no_main]

use fcheck::layout::ROOTINO;
use fcheck::mkfs::ImageBuilder;
use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;

#[derive(Arbitrary, Debug)]
pub enum Op {
    /// flip one bit anywhere in the image
    Flip { offset: u32, bit: u8 },
    /// overwrite a 32-bit word, e.g. a block pointer or a superblock field
    Word { offset: u32, val: u32 },
    /// overwrite the two bytes of a directory entry's inode number
    Inum { offset: u32, val: u16 },
}

fn image() -> Vec<u8> {
    let mut b = ImageBuilder::new(256, 32).unwrap();
    let dir = b.mkdir(ROOTINO, "dir").unwrap();
    let f = b.create(dir, "file", b"hello").unwrap();
    b.link(ROOTINO, "link", f).unwrap();
    b.create(ROOTINO, "big", &vec![0x55u8; 16 * 512]).unwrap();
    b.mknod(ROOTINO, "console", 1, 1).unwrap();
    b.finish()
}

fuzz_target!(|ops: Vec<Op>| {
    let mut buf = image();
    let len = buf.len();

    for op in ops {
        match op {
            Op::Flip { offset, bit } => {
                let off = offset as usize % len;
                buf[off] ^= 1 << (bit % 8);
            }
            Op::Word { offset, val } => {
                let off = (offset as usize % len) & !3;
                buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
            }
            Op::Inum { offset, val } => {
                let off = (offset as usize % len) & !15;
                buf[off..off + 2].copy_from_slice(&val.to_le_bytes());
            }
        }
    }

    let _ = fcheck::fsck(&buf);
});
