// src/depth/mod.rs
//! # Depth-field raycasting
//!
//! Answers "where does this ray first meet the environment" against a small
//! linearized stereo depth buffer. Queries never fail with an error: missing
//! data, rays leaving the view and fully blocked rays are all regular
//! [`RaycastOutcome`] variants.
//!
//! The buffer is double-buffered through [`DepthFieldBuffer`]: a copy is
//! issued with the camera matrices of its source frame and only becomes
//! visible to queries once it completes, so samples and matrices always come
//! from the same frame.

pub mod buffer;
pub mod frame;
mod normal;
mod placement;
pub mod preview;
pub mod raycast;

pub use buffer::{BufferState, CopyTicket, DepthFieldBuffer};
pub use frame::{DepthFrame, EyeCamera, EyeFrame};
pub use placement::BoxPlacement;
pub use raycast::DepthRaycaster;

use glam::Vec3;
use thiserror::Error;

/// Texels per side of each eye's buffer on current devices.
pub const DEFAULT_RESOLUTION: usize = 128;
/// Number of views held by a frame.
pub const EYE_COUNT: usize = 2;

/// Which view(s) a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
    /// Left first, then right; see [`DepthRaycaster::raycast`] for how the two
    /// results are merged.
    Both,
}

impl Eye {
    pub fn index(&self) -> Option<usize> {
        match self {
            Eye::Left => Some(0),
            Eye::Right => Some(1),
            Eye::Both => None,
        }
    }
}

/// A confirmed surface hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthHit {
    pub point: Vec3,
    /// Reconstructed surface normal, when requested and available.
    pub normal: Option<Vec3>,
    /// Fraction of agreeing normal taps, in `[0, 1]`. Zero without a normal.
    pub confidence: f32,
}

impl DepthHit {
    pub fn at(point: Vec3) -> Self {
        DepthHit {
            point,
            normal: None,
            confidence: 0.0,
        }
    }
}

/// Result of a single raycast. Exactly one variant per query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RaycastOutcome {
    Success(DepthHit),
    /// The crossing sits on a depth discontinuity; carries the last point
    /// along the ray that was confidently visible.
    HitPointOccluded(Vec3),
    /// No completed depth copy is available yet.
    NotReady,
    RayOutsideFrustum,
    /// The ray never passed through observed empty space.
    RayOccluded,
    NoHit,
}

impl RaycastOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RaycastOutcome::Success(_))
    }

    pub fn hit(&self) -> Option<&DepthHit> {
        match self {
            RaycastOutcome::Success(hit) => Some(hit),
            _ => None,
        }
    }
}

/// Errors raised while feeding the depth buffer. Queries never return these.
#[derive(Debug, Error, PartialEq)]
pub enum DepthError {
    #[error("no depth copy is pending")]
    NoPendingCopy,
    #[error("copy ticket {ticket} is stale (pending copy is {pending})")]
    StaleTicket { ticket: u64, pending: u64 },
    #[error("depth buffer holds {actual} samples, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("depth readback holds {actual} bytes, expected {expected}")]
    WrongByteLength { expected: usize, actual: usize },
    #[error("depth sample {index} is negative or not finite ({value})")]
    InvalidSample { index: usize, value: f32 },
}
