use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use tracing::{debug, error};

use crate::error::{Result, ShmError};
use crate::layout::{SegmentHeader, DATA_OFFSET, HEADER_SIZE};
use crate::sync::{self, SemGuard};

/// A frame copied out of the read window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFrame {
    pub generation: u32,
    pub data: Vec<u8>,
}

/// Result of one wake-up on the frame-ready semaphore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame(SharedFrame),
    /// The producer tore the segment down (frame size observed as 0).
    Shutdown,
    TimedOut,
}

/// Consumer side of a frame segment.
///
/// Follows the read protocol: wait on frame-ready, take the mutex, read
/// generation/offset/size, copy the window, release. The mapping is
/// re-validated against the header's `map_size` on every wake because the
/// producer remaps on geometry changes.
pub struct FrameReader {
    file: File,
    name: String,
    area: NonNull<SegmentHeader>,
    area_size: usize,
}

// SAFETY: the mapping is owned by this reader; shared state is only accessed
// through header atomics and semaphores.
unsafe impl Send for FrameReader {}

impl FrameReader {
    /// Open an existing segment by the name the producer announced.
    pub fn open(name: &str) -> Result<Self> {
        let fd = mman::shm_open(name, OFlag::O_RDWR, Mode::empty()).map_err(|source| {
            ShmError::Open {
                segment: name.to_string(),
                source,
            }
        })?;
        let file = File::from(fd);
        let len = file
            .metadata()
            .map_err(|e| ShmError::Open {
                segment: name.to_string(),
                source: Errno::from_raw(e.raw_os_error().unwrap_or(libc::EIO)),
            })?
            .len() as usize;
        if len < HEADER_SIZE {
            return Err(ShmError::Corrupt {
                segment: name.to_string(),
                detail: format!("segment is {len} bytes, header needs {HEADER_SIZE}"),
            });
        }

        let area = map(&file, name, len)?;
        debug!("FrameReader: opened '{name}' ({len} bytes)");
        Ok(Self {
            file,
            name: name.to_string(),
            area,
            area_size: len,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the next frame-ready post (or `timeout`), then read.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<ReadOutcome> {
        let header = self.header();
        let signalled = match timeout {
            None => sync::wait(&header.frame_ready).map(|_| true),
            Some(timeout) => sync::wait_timeout(&header.frame_ready, timeout),
        }
        .map_err(|source| ShmError::Wait {
            segment: self.name.clone(),
            source,
        })?;

        if !signalled {
            return Ok(ReadOutcome::TimedOut);
        }
        self.read_current()
    }

    /// Consume one pending post without blocking. `None` when none is pending.
    pub fn try_read(&mut self) -> Result<Option<ReadOutcome>> {
        let header = self.header();
        let signalled = sync::try_wait(&header.frame_ready).map_err(|source| ShmError::Wait {
            segment: self.name.clone(),
            source,
        })?;
        if !signalled {
            return Ok(None);
        }
        self.read_current().map(Some)
    }

    /// Number of frame-ready posts not consumed yet.
    pub fn pending(&self) -> Result<i32> {
        sync::value(&self.header().frame_ready).map_err(|source| ShmError::Wait {
            segment: self.name.clone(),
            source,
        })
    }

    /// Read the current read window under the mutex.
    pub fn read_current(&mut self) -> Result<ReadOutcome> {
        loop {
            // Unlocked hint; confirmed under the lock below.
            let advertised = self.header().map_size.load(Ordering::Relaxed) as usize;
            if advertised >= HEADER_SIZE && advertised != self.area_size {
                self.remap(advertised)?;
            }

            let header = self.header();
            let guard = SemGuard::lock(&header.mutex).map_err(|source| ShmError::Lock {
                segment: self.name.clone(),
                source,
            })?;

            let frame_size = header.frame_size.load(Ordering::Relaxed) as usize;
            if frame_size == 0 {
                return Ok(ReadOutcome::Shutdown);
            }

            let map_size = header.map_size.load(Ordering::Relaxed) as usize;
            if map_size != self.area_size {
                // Producer remapped between the hint and the lock.
                drop(guard);
                continue;
            }

            let generation = header.frame_gen.load(Ordering::Relaxed);
            let offset = header.read_offset.load(Ordering::Relaxed) as usize;
            let start = DATA_OFFSET + offset;
            if start + frame_size > self.area_size {
                return Err(ShmError::Corrupt {
                    segment: self.name.clone(),
                    detail: format!(
                        "read window {offset}+{frame_size} exceeds mapping of {}",
                        self.area_size
                    ),
                });
            }

            // SAFETY: bounds checked above; the producer does not write the
            // read window while it holds the mutex-protected role.
            let data = unsafe {
                std::slice::from_raw_parts(self.area.as_ptr().cast::<u8>().add(start), frame_size)
            }
            .to_vec();
            drop(guard);

            return Ok(ReadOutcome::Frame(SharedFrame { generation, data }));
        }
    }

    fn header(&self) -> &SegmentHeader {
        // SAFETY: `area` always holds a live mapping of at least HEADER_SIZE bytes.
        unsafe { self.area.as_ref() }
    }

    fn remap(&mut self, size: usize) -> Result<()> {
        let area = map(&self.file, &self.name, size)?;
        let old = std::mem::replace(&mut self.area, area);
        // SAFETY: `old` is the previous mapping of `area_size` bytes.
        if let Err(e) = unsafe { mman::munmap(old.cast(), self.area_size) } {
            error!("FrameReader[{}]: munmap({}) failed: {e}", self.name, self.area_size);
        }
        debug!("FrameReader[{}]: remapped {} -> {size}", self.name, self.area_size);
        self.area_size = size;
        Ok(())
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        // SAFETY: `area`/`area_size` describe our own mapping.
        if let Err(e) = unsafe { mman::munmap(self.area.cast(), self.area_size) } {
            error!("FrameReader[{}]: munmap({}) failed: {e}", self.name, self.area_size);
        }
    }
}

fn map(file: &File, name: &str, size: usize) -> Result<NonNull<SegmentHeader>> {
    let map_err = |source| ShmError::Map {
        segment: name.to_string(),
        size,
        source,
    };
    let len = NonZeroUsize::new(size).ok_or_else(|| map_err(Errno::EINVAL))?;
    // SAFETY: shared mapping of a segment the producer sized with ftruncate.
    let ptr = unsafe {
        mman::mmap(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            file,
            0,
        )
    }
    .map_err(map_err)?;
    Ok(ptr.cast())
}
