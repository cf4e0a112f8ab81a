use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd;
use tracing::{debug, error, warn};

use crate::error::{Result, ShmError};
use crate::layout::{self, SegmentHeader, WindowOffsets, DATA_OFFSET};
use crate::sync::{self, SemGuard};

/// Producer side of a double-buffered frame segment.
///
/// # Lifecycle
///
/// - **Create**: `shm_open` + `ftruncate`/`mmap` of a header-only area, header
///   zeroed, mutex initialised to 1 and frame-ready to 0.
/// - **Resize**: on slot size change, `ftruncate`, map the new size, drop the
///   old mapping and recompute window offsets under the mutex. A failed
///   resize keeps the previous mapping and is not retried for the same size.
/// - **Publish**: pixels are written to the write window outside the lock;
///   generation bump and window swap happen under it, followed by one post.
/// - **Drop**: frame size zeroed, one final post so a blocked consumer wakes
///   and sees shutdown, `munmap`, `shm_unlink`.
pub struct SharedFrameSegment {
    fd: OwnedFd,
    name: String,
    /// `None` only before the first mapping.
    area: Option<NonNull<SegmentHeader>>,
    area_size: usize,
    resize_count: u64,
    /// Aligned slot size of the last failed resize.
    failed_size: Option<usize>,
}

// SAFETY: the mapping is only touched through `&mut self` (writes) or the
// header atomics and semaphores (shared with other processes).
// Nothing in the struct is tied to the creating thread.
unsafe impl Send for SharedFrameSegment {}

impl SharedFrameSegment {
    /// Create a new segment.
    ///
    /// With `Some(name)`, opens or creates exactly that segment and fails if
    /// that is impossible. With `None`, probes `/<prefix>_shm_<pid>_<index>`
    /// for increasing indices until an unused name is found.
    pub fn create(name: Option<&str>, prefix: &str) -> Result<Self> {
        let (name, fd) = match name {
            Some(name) => {
                let fd = open_named(name).map_err(|source| ShmError::Open {
                    segment: name.to_string(),
                    source,
                })?;
                (name.to_string(), fd)
            }
            None => probe_unused(prefix)?,
        };

        let mut segment = Self {
            fd,
            name,
            area: None,
            area_size: 0,
            resize_count: 0,
            failed_size: None,
        };

        // Header only, no frame data yet.
        segment.try_resize(0)?;

        let area = segment.mapped()?;
        // SAFETY: `area` covers `area_size` writable bytes and nobody else
        // knows the name yet.
        unsafe { std::ptr::write_bytes(area.as_ptr().cast::<u8>(), 0, segment.area_size) };

        let header = segment.mapped_header()?;
        sync::init(&header.mutex, 1).map_err(|source| ShmError::SemInit {
            segment: segment.name.clone(),
            which: "mutex",
            source,
        })?;
        sync::init(&header.frame_ready, 0).map_err(|source| ShmError::SemInit {
            segment: segment.name.clone(),
            which: "frame_ready",
            source,
        })?;

        debug!("ShmHolder: new holder '{}'", segment.name);
        Ok(segment)
    }

    /// Name to hand to the consumer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current slot size, 0 when no frame has been sized yet.
    pub fn slot_size(&self) -> usize {
        self.header()
            .map_or(0, |h| h.frame_size.load(Ordering::Relaxed) as usize)
    }

    /// Total bytes currently mapped.
    pub fn mapped_size(&self) -> usize {
        self.area_size
    }

    /// Generation of the most recently published frame.
    pub fn generation(&self) -> u32 {
        self.header()
            .map_or(0, |h| h.frame_gen.load(Ordering::Relaxed))
    }

    /// Current window offsets relative to the data region.
    pub fn offsets(&self) -> Option<WindowOffsets> {
        let header = self.header()?;
        Some(WindowOffsets {
            write: header.write_offset.load(Ordering::Relaxed) as usize,
            read: header.read_offset.load(Ordering::Relaxed) as usize,
        })
    }

    /// Number of remaps performed since creation (the initial mapping excluded).
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    /// Resize the slot to hold `frame_size` bytes (rounded up to 16).
    ///
    /// A no-op when the aligned size already matches. On failure the error is
    /// logged, `false` returned and the segment keeps its previous size.
    /// Asking again for the size that failed returns `false` without another
    /// attempt until some other size has been requested.
    pub fn resize(&mut self, frame_size: usize) -> bool {
        let aligned = layout::align_frame_size(frame_size);
        if self.failed_size == Some(aligned) {
            return false;
        }
        match self.try_resize(frame_size) {
            Ok(()) => {
                self.failed_size = None;
                true
            }
            Err(e) => {
                self.failed_size = Some(aligned);
                error!(
                    "ShmHolder[{}]: resize to {frame_size} failed: {e} (errno {:?})",
                    self.name,
                    e.errno()
                );
                false
            }
        }
    }

    /// The inactive window the producer may write into.
    ///
    /// `None` while unmapped or before a frame size has been set.
    pub fn write_window(&mut self) -> Option<&mut [u8]> {
        let area = self.area?;
        // SAFETY: `area` is a live mapping at least HEADER_SIZE bytes long.
        let header = unsafe { area.as_ref() };
        let size = header.frame_size.load(Ordering::Relaxed) as usize;
        let offset = header.write_offset.load(Ordering::Relaxed) as usize;
        if size == 0 || DATA_OFFSET + offset + size > self.area_size {
            return None;
        }
        // SAFETY: bounds checked against the mapping above; the write window
        // is disjoint from the header and from the read window.
        let window = unsafe {
            std::slice::from_raw_parts_mut(area.as_ptr().cast::<u8>().add(DATA_OFFSET + offset), size)
        };
        Some(window)
    }

    /// Publish the write window: bump the generation, swap the windows and
    /// post frame-ready, all under the header mutex.
    ///
    /// Returns the new generation. A lock failure means the segment is
    /// corrupt or misused and abandons this publication.
    pub fn publish(&mut self) -> Result<u32> {
        let header = self.mapped_header()?;
        let _lock = SemGuard::lock(&header.mutex).map_err(|source| ShmError::Lock {
            segment: self.name.clone(),
            source,
        })?;

        let generation = header.frame_gen.load(Ordering::Relaxed).wrapping_add(1);
        header.frame_gen.store(generation, Ordering::Relaxed);

        let read = header.read_offset.load(Ordering::Relaxed);
        let write = header.write_offset.load(Ordering::Relaxed);
        header.read_offset.store(write, Ordering::Relaxed);
        header.write_offset.store(read, Ordering::Relaxed);

        if let Err(e) = sync::post(&header.frame_ready) {
            warn!("ShmHolder[{}]: frame-ready post failed: {e}", self.name);
        }
        Ok(generation)
    }

    fn try_resize(&mut self, frame_size: usize) -> Result<()> {
        let frame_size = layout::align_frame_size(frame_size);

        if self.slot_size() == frame_size && self.area.is_some() {
            return Ok(());
        }

        let area_size = layout::area_size(frame_size);
        let (frame_size_field, map_size_field) =
            match (u32::try_from(frame_size), u32::try_from(area_size)) {
                (Ok(f), Ok(a)) => (f, a),
                _ => {
                    return Err(ShmError::TooLarge {
                        segment: self.name.clone(),
                        size: frame_size,
                    })
                }
            };
        debug!(
            "ShmHolder[{}]: new sizes: f={frame_size}, a={area_size}",
            self.name
        );

        // The old mapping stays in place until the new one exists, so a
        // failure below leaves the segment usable at its previous size.
        let old_size = self.area_size;
        let grow = area_size > old_size;
        if grow {
            self.truncate(area_size)?;
        }

        let area = match self.map(area_size) {
            Ok(area) => area,
            Err(e) => {
                if grow && old_size > 0 {
                    if let Err(undo) = self.truncate(old_size) {
                        warn!("ShmHolder[{}]: {undo}", self.name);
                    }
                }
                return Err(e);
            }
        };

        let remap = self.area.is_some();
        self.unmap();
        self.area = Some(area);
        self.area_size = area_size;
        if remap {
            self.resize_count += 1;
        }
        if !grow {
            if let Err(e) = self.truncate(area_size) {
                warn!("ShmHolder[{}]: keeping larger file: {e}", self.name);
            }
        }

        if frame_size > 0 {
            // SAFETY: just mapped with at least HEADER_SIZE bytes.
            let header = unsafe { area.as_ref() };
            let _lock = SemGuard::lock(&header.mutex).map_err(|source| ShmError::Lock {
                segment: self.name.clone(),
                source,
            })?;

            header.frame_size.store(frame_size_field, Ordering::Relaxed);
            header.map_size.store(map_size_field, Ordering::Relaxed);

            let data_addr = area.as_ptr() as usize + DATA_OFFSET;
            let offsets = layout::window_offsets(data_addr, frame_size);
            header.write_offset.store(offsets.write as u32, Ordering::Relaxed);
            header.read_offset.store(offsets.read as u32, Ordering::Relaxed);
        }

        Ok(())
    }

    fn header(&self) -> Option<&SegmentHeader> {
        // SAFETY: while `area` is Some it is a live mapping of at least
        // HEADER_SIZE bytes, unmapped only through `&mut self`.
        self.area.map(|area| unsafe { &*area.as_ptr() })
    }

    fn mapped(&self) -> Result<NonNull<SegmentHeader>> {
        self.area.ok_or_else(|| ShmError::NotMapped {
            segment: self.name.clone(),
        })
    }

    fn mapped_header(&self) -> Result<&SegmentHeader> {
        self.header().ok_or_else(|| ShmError::NotMapped {
            segment: self.name.clone(),
        })
    }

    fn truncate(&self, area_size: usize) -> Result<()> {
        unistd::ftruncate(&self.fd, area_size as libc::off_t).map_err(|source| {
            ShmError::Truncate {
                segment: self.name.clone(),
                size: area_size,
                source,
            }
        })
    }

    fn map(&self, area_size: usize) -> Result<NonNull<SegmentHeader>> {
        let map_err = |source| ShmError::Map {
            segment: self.name.clone(),
            size: area_size,
            source,
        };
        let len = NonZeroUsize::new(area_size).ok_or_else(|| map_err(Errno::EINVAL))?;
        // SAFETY: fresh shared mapping of an fd we own, already at least
        // `area_size` bytes long.
        let ptr = unsafe {
            mman::mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &self.fd,
                0,
            )
        }
        .map_err(map_err)?;
        Ok(ptr.cast())
    }

    fn unmap(&mut self) {
        let Some(area) = self.area.take() else {
            return;
        };
        // SAFETY: `area`/`area_size` describe the mapping created in try_resize.
        if let Err(e) = unsafe { mman::munmap(area.cast(), self.area_size) } {
            error!(
                "ShmHolder[{}]: munmap({}) failed: {e}",
                self.name, self.area_size
            );
        }
        self.area_size = 0;
    }
}

impl Drop for SharedFrameSegment {
    fn drop(&mut self) {
        if let Some(header) = self.header() {
            header.frame_size.store(0, Ordering::Relaxed);
            if let Err(e) = sync::post(&header.frame_ready) {
                warn!("ShmHolder[{}]: final frame-ready post failed: {e}", self.name);
            }
        }
        self.unmap();
        if let Err(e) = mman::shm_unlink(self.name.as_str()) {
            warn!("ShmHolder[{}]: shm_unlink failed: {e}", self.name);
        }
    }
}

/// Segment name for a given owner process and stream index.
pub fn generated_name(prefix: &str, pid: i32, index: u32) -> String {
    format!("/{prefix}_shm_{pid}_{index}")
}

fn open_named(name: &str) -> nix::Result<OwnedFd> {
    mman::shm_open(
        name,
        OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_TRUNC,
        Mode::S_IRUSR | Mode::S_IWUSR,
    )
}

fn probe_unused(prefix: &str) -> Result<(String, OwnedFd)> {
    let pid = unistd::getpid().as_raw();
    for index in 0..u32::MAX {
        let name = generated_name(prefix, pid, index);
        match mman::shm_open(
            name.as_str(),
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_EXCL,
            Mode::S_IRUSR | Mode::S_IWUSR,
        ) {
            Ok(fd) => return Ok((name, fd)),
            Err(Errno::EEXIST) => continue,
            Err(source) => return Err(ShmError::Open {
                segment: name,
                source,
            }),
        }
    }
    Err(ShmError::Open {
        segment: generated_name(prefix, pid, u32::MAX),
        source: Errno::EEXIST,
    })
}
