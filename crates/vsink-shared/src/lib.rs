//! Shared memory IPC for double-buffered video frame transport.
//!
//! A producer owns a [`SharedFrameSegment`]: a named POSIX shared memory
//! object laid out as
//!
//! ```text
//! [SegmentHeader][alignment padding][Window A][Window B]
//! ```
//!
//! The producer writes pixels into the write window, then swaps the window
//! roles and bumps the generation counter under the header mutex, and finally
//! posts the frame-ready semaphore. A consumer ([`FrameReader`]) waits on that
//! semaphore, takes the mutex, and copies the read window.
//!
//! Both semaphores are process-shared unnamed POSIX semaphores living inside
//! the mapping, so this crate only works on platforms that implement
//! `sem_init(pshared = 1)` (Linux and most other Unix systems, not macOS).

pub mod error;
pub mod layout;
pub mod reader;
pub mod segment;
mod sync;

pub use error::{Result, ShmError};
pub use layout::{SegmentHeader, WindowOffsets, DATA_OFFSET, FRAME_ALIGN, HEADER_SIZE};
pub use reader::{FrameReader, ReadOutcome, SharedFrame};
pub use segment::SharedFrameSegment;
