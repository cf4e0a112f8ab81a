use nix::errno::Errno;
use thiserror::Error;

/// Shared memory transport errors.
///
/// Every variant carries the segment name so log lines can be correlated
/// with the name announced to the consumer.
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("shm_open failed for '{segment}': {source}")]
    Open { segment: String, source: Errno },

    #[error("ftruncate({size}) failed for '{segment}': {source}")]
    Truncate {
        segment: String,
        size: usize,
        source: Errno,
    },

    #[error("mmap({size}) failed for '{segment}': {source}")]
    Map {
        segment: String,
        size: usize,
        source: Errno,
    },

    #[error("sem_init({which}) failed for '{segment}': {source}")]
    SemInit {
        segment: String,
        which: &'static str,
        source: Errno,
    },

    #[error("mutex lock failed for '{segment}': {source}")]
    Lock { segment: String, source: Errno },

    #[error("frame-ready wait failed for '{segment}': {source}")]
    Wait { segment: String, source: Errno },

    #[error("frame size {size} does not fit the header of '{segment}'")]
    TooLarge { segment: String, size: usize },

    #[error("segment '{segment}' is not mapped")]
    NotMapped { segment: String },

    #[error("corrupt header in '{segment}': {detail}")]
    Corrupt { segment: String, detail: String },
}

impl ShmError {
    /// The OS error code behind this failure, if any.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Open { source, .. }
            | Self::Truncate { source, .. }
            | Self::Map { source, .. }
            | Self::SemInit { source, .. }
            | Self::Lock { source, .. }
            | Self::Wait { source, .. } => Some(*source),
            Self::TooLarge { .. } | Self::NotMapped { .. } | Self::Corrupt { .. } => None,
        }
    }

    /// Name of the segment the error refers to.
    pub fn segment(&self) -> &str {
        match self {
            Self::Open { segment, .. }
            | Self::Truncate { segment, .. }
            | Self::Map { segment, .. }
            | Self::SemInit { segment, .. }
            | Self::Lock { segment, .. }
            | Self::Wait { segment, .. }
            | Self::TooLarge { segment, .. }
            | Self::NotMapped { segment }
            | Self::Corrupt { segment, .. } => segment,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, ShmError>;
