// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! File-backed sector device.
//!
//! Works against a regular image file or a raw block device node. Transfers
//! use positioned I/O so concurrent readers never race a shared cursor.

use super::{check_transfer, DeviceCaps, SectorIo};
use crate::policy::DeviceClass;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// A sector device over a plain file.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    caps: DeviceCaps,
}

impl FileDevice {
    /// Default sector size for image files.
    pub const DEFAULT_SECTOR: u32 = 512;

    /// Open an existing image; capacity is taken from the file length and
    /// truncated down to a whole sector.
    pub fn open<P: AsRef<Path>>(path: P, class: DeviceClass, hw_flags: u32) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let bs = u64::from(Self::DEFAULT_SECTOR);
        Ok(Self {
            file,
            caps: DeviceCaps {
                logical_block_size: Self::DEFAULT_SECTOR,
                total_capacity_bytes: len - len % bs,
                class,
                hw_flags,
            },
        })
    }

    /// Create (or truncate) an image of `capacity_bytes`, rounded down to a
    /// whole sector.
    pub fn create<P: AsRef<Path>>(
        path: P,
        capacity_bytes: u64,
        class: DeviceClass,
        hw_flags: u32,
    ) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let bs = u64::from(Self::DEFAULT_SECTOR);
        let capacity = capacity_bytes - capacity_bytes % bs;
        file.set_len(capacity)?;
        Ok(Self {
            file,
            caps: DeviceCaps {
                logical_block_size: Self::DEFAULT_SECTOR,
                total_capacity_bytes: capacity,
                class,
                hw_flags,
            },
        })
    }
}

impl SectorIo for FileDevice {
    fn sync_read(&self, sector_lba: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = check_transfer(&self.caps, sector_lba, buf.len())?;
        read_exact_at(&self.file, buf, offset)
    }

    fn sync_write(&self, sector_lba: u64, buf: &[u8]) -> io::Result<()> {
        let offset = check_transfer(&self.caps, sector_lba, buf.len())?;
        write_all_at(&self.file, buf, offset)
    }

    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    #[cfg(unix)]
    fn prefetch(&self, sector_lba: u64, sector_count: u32) {
        use std::os::unix::io::AsRawFd;
        let bs = i64::from(self.caps.logical_block_size);
        let offset = sector_lba as i64 * bs;
        let len = i64::from(sector_count) * bs;
        // Advisory only; the return value is deliberately ignored.
        unsafe {
            libc::posix_fadvise(self.file.as_raw_fd(), offset, len, libc::POSIX_FADV_WILLNEED);
        }
    }

    fn flush(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
        }
        buf = &mut buf[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short write"));
        }
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}
