use indicatif::ProgressBar;
use std::io::{self, prelude::*};

/// Wrapper around `std::io::Read` that tracks the absolute stream position
/// and folds every byte into a running CRC64 (Jones polynomial, the variant
/// Redis appends after the EOF opcode).
pub struct TrackedRead<R> {
    reader: R,
    position: u64,
    crc: u64,
}

impl<R> TrackedRead<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            crc: 0,
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC64 of all bytes consumed so far.
    pub fn crc(&self) -> u64 {
        self.crc
    }
}

impl<R> Read for TrackedRead<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;

        self.position += bytes_read as u64;
        self.crc = crc64::crc64(self.crc, &buf[..bytes_read]);

        Ok(bytes_read)
    }
}

/// Wrapper around `std::io::Read` that updates a progress bar with the
/// number of bytes read.
pub struct ReadProgressBar<R> {
    reader: R,
    progress_bar: ProgressBar,
}

impl<R> ReadProgressBar<R>
where
    R: Read,
{
    pub fn new(reader: R, progress_bar: ProgressBar) -> Self {
        Self {
            reader,
            progress_bar,
        }
    }
}

impl<R> Read for ReadProgressBar<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;

        self.progress_bar.inc(bytes_read as u64);

        Ok(bytes_read)
    }
}
