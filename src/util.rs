use std::io::{ErrorKind, Read, Result};

/// Read until `buf` is full or the reader hits EOF, retrying on EINTR.
///
/// Unlike [`Read::read_exact`], a short read is not an error: the number of
/// bytes actually read is returned, and it is smaller than `buf.len()` only
/// if EOF was reached.
pub(crate) fn read_fill(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// Number of zero bytes needed to pad `len` to a whole number of blocks.
pub(crate) fn padding(len: u64, block: u64) -> u64 {
    (block - len % block) % block
}

#[cfg(test)]
mod test {
    use std::io::Error;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_read_fill() {
        let mut r = b"" as &[u8];
        assert_eq!(read_fill(&mut r, &mut [0; 9]).unwrap(), 0);

        r = b"ninebytes";
        assert_eq!(read_fill(&mut r, &mut [0; 9]).unwrap(), 9);
        assert_eq!(read_fill(&mut r, &mut [0; 9]).unwrap(), 0);

        r = b"twelve bytes";
        assert_eq!(read_fill(&mut r, &mut [0; 9]).unwrap(), 9);
        assert_eq!(read_fill(&mut r, &mut [0; 9]).unwrap(), 3);
    }

    #[test]
    fn test_read_fill_short_reads() {
        // yields one byte per call, with an EINTR in between
        struct Trickle<'a> {
            data: &'a [u8],
            interrupt: bool,
        }
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
                self.interrupt = !self.interrupt;
                if self.interrupt {
                    return Err(ErrorKind::Interrupted.into());
                }
                match self.data.split_first() {
                    Some((&b, rest)) if !buf.is_empty() => {
                        buf[0] = b;
                        self.data = rest;
                        Ok(1)
                    }
                    _ => Ok(0),
                }
            }
        }

        let mut r = Trickle {
            data: b"abcdef",
            interrupt: false,
        };
        let mut buf = [0; 4];
        assert_eq!(read_fill(&mut r, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(read_fill(&mut r, &mut buf).unwrap(), 2);
    }

    #[test]
    fn test_read_fill_broken_reader() {
        struct BrokenReader;
        impl Read for BrokenReader {
            fn read(&mut self, _buffer: &mut [u8]) -> Result<usize> {
                Err(Error::from(ErrorKind::NetworkDown))
            }
        }

        assert_eq!(
            read_fill(&mut BrokenReader, &mut [0; 9])
                .unwrap_err()
                .kind(),
            ErrorKind::NetworkDown
        );
    }

    #[test]
    fn test_padding() {
        assert_eq!(padding(0, 512), 0);
        assert_eq!(padding(1, 512), 511);
        assert_eq!(padding(22, 512), 490);
        assert_eq!(padding(512, 512), 0);
        assert_eq!(padding(513, 512), 511);
    }
}
