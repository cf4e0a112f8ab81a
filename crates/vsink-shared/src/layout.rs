// Segment byte layout shared by producer and consumer.
//
// [SegmentHeader][alignment padding][Window A][Window B]
//
// Offsets stored in the header are relative to `DATA_OFFSET`, the first byte
// after the last header field (the position of a C flexible array member).

use std::cell::UnsafeCell;
use std::mem::{offset_of, size_of};
use std::sync::atomic::AtomicU32;

/// Frame windows start on, and are sized in multiples of, this boundary.
pub const FRAME_ALIGN: usize = 16;

/// Extra bytes reserved so the first window can be aligned up.
pub const ALIGN_SLACK: usize = FRAME_ALIGN - 1;

/// Fixed-layout header at the start of every segment.
///
/// Field order and sizes are part of the wire contract with external
/// consumers and must not change.
#[repr(C)]
pub struct SegmentHeader {
    /// Binary semaphore guarding the metadata below. Initialised to 1.
    pub(crate) mutex: UnsafeCell<libc::sem_t>,
    /// Counting semaphore posted once per published frame. Initialised to 0.
    pub(crate) frame_ready: UnsafeCell<libc::sem_t>,
    /// Generation of the frame in the read window. Wraps.
    pub(crate) frame_gen: AtomicU32,
    /// Slot size in bytes. Zero means "no frame" or "producer gone".
    pub(crate) frame_size: AtomicU32,
    /// Total mapped size in bytes.
    pub(crate) map_size: AtomicU32,
    pub(crate) write_offset: AtomicU32,
    pub(crate) read_offset: AtomicU32,
    data: [u8; 0],
}

/// `sizeof` the header, including trailing padding.
pub const HEADER_SIZE: usize = size_of::<SegmentHeader>();

/// Byte offset of the data region from the start of the mapping.
pub const DATA_OFFSET: usize = offset_of!(SegmentHeader, data);

/// Write/read window offsets relative to the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOffsets {
    pub write: usize,
    pub read: usize,
}

/// Round `size` up to the next multiple of [`FRAME_ALIGN`].
pub const fn align_frame_size(size: usize) -> usize {
    (size + ALIGN_SLACK) & !ALIGN_SLACK
}

/// Full mapping size for a slot of `frame_size` bytes (already aligned).
pub const fn area_size(frame_size: usize) -> usize {
    HEADER_SIZE + 2 * frame_size + ALIGN_SLACK
}

/// Compute the window offsets for a data region starting at `data_addr`.
///
/// The write window starts at the first aligned address in the data region,
/// the read window immediately after it.
pub const fn window_offsets(data_addr: usize, frame_size: usize) -> WindowOffsets {
    let write = align_frame_size(data_addr) - data_addr;
    WindowOffsets {
        write,
        read: write + frame_size,
    }
}

/// Length of the data region in a mapping of `map_size` bytes.
pub const fn data_len(map_size: usize) -> usize {
    map_size.saturating_sub(DATA_OFFSET)
}
