//! Useful traits and other utilities that don't really belong anywhere else.

use std::io::{self, Read};

pub trait ReadExt {
    /// Tries to read exactly `read_len` bytes, like `read_exact`, but unlike `read_exact`, is
    /// forgiving of unexpected EOF.
    ///
    /// `vec` is cleared first. On return it holds exactly `read_len` bytes, unless an EOF was
    /// encountered, in which case it holds strictly fewer.
    fn read_to_vec(&mut self, vec: &mut Vec<u8>, read_len: usize) -> io::Result<()>;

    /// Fill `vec` with exactly `read_len` bytes, returning `false` on a short read.
    fn read_full(&mut self, vec: &mut Vec<u8>, read_len: usize) -> io::Result<bool> {
        self.read_to_vec(vec, read_len)?;
        Ok(vec.len() == read_len)
    }
}

impl<T: Read> ReadExt for T {
    fn read_to_vec(&mut self, vec: &mut Vec<u8>, read_len: usize) -> io::Result<()> {
        vec.clear();
        vec.resize(read_len, 0u8);

        let mut cursor = 0;
        while cursor < read_len {
            cursor += match self.read(&mut vec[cursor..]) {
                // This is an EOF; it means the final read size is `cursor`
                Ok(0) => break,

                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(x) => return Err(x),
            };
        }

        vec.truncate(cursor);
        Ok(())
    }
}

#[test]
fn test_read_to_vec() -> io::Result<()> {
    let mut vec = vec![0x11; 3];
    io::repeat(0xAA).read_to_vec(&mut vec, 4)?;
    assert_eq!(vec, [0xAA; 4]);

    (&[1, 2, 3][..]).read_to_vec(&mut vec, 8)?;
    assert_eq!(vec, [1, 2, 3]);

    let mut source = &[1, 2, 3, 4, 5][..];
    assert!(source.read_full(&mut vec, 2)?);
    assert_eq!(vec, [1, 2]);
    assert!(!source.read_full(&mut vec, 4)?);
    assert_eq!(vec, [3, 4, 5]);
    Ok(())
}
