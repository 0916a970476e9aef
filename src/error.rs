use thiserror::Error;

/// Errors raised by the tracking engine.
///
/// Tracks leaving the frame and trajectories failing validation are not
/// errors; they only show up in the per-frame statistics.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("frame is empty")]
    EmptyFrame,

    #[error("frame {width}x{height} is smaller than the {patch_size}px descriptor patch")]
    FrameTooSmall {
        width: usize,
        height: usize,
        patch_size: usize,
    },

    #[error("frame size changed from {expected:?} to {actual:?}")]
    FrameSizeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
