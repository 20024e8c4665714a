//! Open handles with a cursor
//!
//! [`EfuseFile`] gives the array a file-like face: it keeps a position,
//! advances it by the bytes actually transferred and implements the
//! `std::io` traits, so it can be fed to `io::copy` and friends.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::Ordering;

use jzfuse_core::hal::{Delay, RegisterBus, VddqLine};
use jzfuse_core::{Error, Result, EFUSE_SIZE};

use crate::Efuse;

/// Byte-stream handle onto an [`Efuse`]
///
/// Counts towards [`Efuse::use_count`] while alive.
pub struct EfuseFile<'a, B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    efuse: &'a Efuse<B, L, D>,
    pos: u64,
}

impl<'a, B, L, D> EfuseFile<'a, B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    pub(crate) fn new(efuse: &'a Efuse<B, L, D>) -> Self {
        let count = efuse.use_count.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("EFUSE opened, {} user(s)", count);
        Self { efuse, pos: 0 }
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read `buf.len()` bytes at the cursor
    ///
    /// Unlike [`Read::read`], a request running past the end of the array
    /// fails as a whole with [`Error::OutOfRange`].
    pub fn read_fuses(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (done, res) = self.track(|efuse, offset, done| efuse.read_tracked(offset, buf, done));
        res.map(|()| done)
    }

    /// Program `data` at the cursor
    ///
    /// The cursor moves past every quantum that was committed, even when a
    /// later one fails.
    pub fn write_fuses(&mut self, data: &[u8]) -> Result<usize> {
        let (done, res) = self.track(|efuse, offset, done| efuse.write_tracked(offset, data, done));
        res.map(|()| done)
    }

    fn offset(&self) -> usize {
        usize::try_from(self.pos).unwrap_or(usize::MAX)
    }

    /// Bytes between the cursor and the end of the array
    fn remaining(&self) -> usize {
        EFUSE_SIZE.saturating_sub(self.offset())
    }

    fn track(
        &mut self,
        op: impl FnOnce(&Efuse<B, L, D>, usize, &mut usize) -> Result<()>,
    ) -> (usize, Result<()>) {
        let mut done = 0;
        let res = op(self.efuse, self.offset(), &mut done);
        self.pos += done as u64;
        (done, res)
    }
}

impl<B, L, D> Drop for EfuseFile<'_, B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    fn drop(&mut self) {
        let count = self.efuse.use_count.fetch_sub(1, Ordering::Relaxed) - 1;
        log::debug!("EFUSE released, {} user(s)", count);
    }
}

/// Map an engine error onto the closest `io::ErrorKind`
fn io_error(e: Error) -> io::Error {
    let kind = match e {
        Error::OutOfRange { .. } => io::ErrorKind::InvalidInput,
        Error::AlreadyProgrammed { .. } => io::ErrorKind::PermissionDenied,
        Error::HardwareTimeout { .. } => io::ErrorKind::TimedOut,
        Error::AllocationFailure => io::ErrorKind::OutOfMemory,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

/// A short transfer is reported as success, the error resurfaces on the
/// next call
fn io_result((done, res): (usize, Result<()>)) -> io::Result<usize> {
    match res {
        Ok(()) => Ok(done),
        Err(_) if done > 0 => Ok(done),
        Err(e) => Err(io_error(e)),
    }
}

impl<B, L, D> Read for EfuseFile<'_, B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(self.remaining());
        let buf = &mut buf[..len];
        io_result(self.track(|efuse, offset, done| efuse.read_tracked(offset, buf, done)))
    }
}

impl<B, L, D> Write for EfuseFile<'_, B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let len = data.len().min(self.remaining());
        if len == 0 {
            return Err(io_error(Error::OutOfRange {
                offset: self.offset(),
                len: data.len(),
            }));
        }
        let data = &data[..len];
        io_result(self.track(|efuse, offset, done| efuse.write_tracked(offset, data, done)))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B, L, D> Seek for EfuseFile<'_, B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => (EFUSE_SIZE as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(pos) => {
                self.pos = pos;
                Ok(pos)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
