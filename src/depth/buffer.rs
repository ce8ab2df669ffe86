// src/depth/buffer.rs

use std::io::Cursor;
use std::sync::Arc;

use byteorder::{ReadBytesExt, LE};
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::depth::frame::{DepthFrame, EyeCamera, EyeFrame};
use crate::depth::{DepthError, EYE_COUNT};

/// Lifecycle of the live depth buffer.
///
/// `Invalid -> CopyPending -> Valid`; [`DepthFieldBuffer::invalidate`] goes
/// back to `Invalid` from anywhere. Once a frame has been published the
/// buffer stays `Valid` while later copies are in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Invalid,
    CopyPending,
    Valid,
}

/// Handle for one issued copy. Only the most recently issued ticket can be
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyTicket {
    id: u64,
}

impl CopyTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct PendingCopy {
    id: u64,
    cameras: [EyeCamera; EYE_COUNT],
}

#[derive(Debug, Default)]
struct Inner {
    live: Option<Arc<DepthFrame>>,
    pending: Option<PendingCopy>,
    next_id: u64,
}

/// Double-buffered stereo depth storage.
///
/// A single writer issues copies with [`begin_copy`](Self::begin_copy) and
/// finishes them with [`complete_copy`](Self::complete_copy); readers take an
/// `Arc` snapshot of the live frame, so a query never observes a frame that
/// is still being written.
#[derive(Debug)]
pub struct DepthFieldBuffer {
    resolution: usize,
    inner: RwLock<Inner>,
}

impl DepthFieldBuffer {
    pub fn new(resolution: usize) -> Self {
        DepthFieldBuffer {
            resolution,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn state(&self) -> BufferState {
        let inner = self.inner.read();
        if inner.live.is_some() {
            BufferState::Valid
        } else if inner.pending.is_some() {
            BufferState::CopyPending
        } else {
            BufferState::Invalid
        }
    }

    /// Issues a copy, snapshotting the matrices of the frame being copied.
    /// Any copy still in flight is superseded and its ticket goes stale.
    pub fn begin_copy(&self, cameras: [EyeCamera; EYE_COUNT]) -> CopyTicket {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;
        if let Some(old) = inner.pending.replace(PendingCopy { id, cameras }) {
            debug!("Depth copy {} superseded by {}", old.id, id);
        }
        CopyTicket { id }
    }

    /// Completes the pending copy with linear depth samples for both eyes and
    /// publishes it. On any error the live frame is left untouched.
    pub fn complete_copy(
        &self,
        ticket: CopyTicket,
        left: Vec<f32>,
        right: Vec<f32>,
    ) -> Result<(), DepthError> {
        for samples in [&left, &right] {
            self.validate_samples(samples)?;
        }
        self.publish(ticket, |_, _| (left, right))
    }

    /// Like [`complete_copy`](Self::complete_copy) but for raw `[0, 1]`
    /// projective depth as read back from a depth texture. Each eye is
    /// linearized with the projection captured for it.
    pub fn complete_copy_ndc(
        &self,
        ticket: CopyTicket,
        left: &[f32],
        right: &[f32],
    ) -> Result<(), DepthError> {
        for samples in [left, right] {
            if samples.len() != self.samples_per_eye() {
                return Err(self.wrong_length(samples.len()));
            }
        }
        self.publish(ticket, |left_cam, right_cam| {
            (
                left.iter().map(|&d| left_cam.linearize(d)).collect(),
                right.iter().map(|&d| right_cam.linearize(d)).collect(),
            )
        })
    }

    /// Completes the pending copy straight from a GPU readback: little-endian
    /// `f32` projective depth, `resolution²` values per eye.
    pub fn complete_copy_bytes(
        &self,
        ticket: CopyTicket,
        left: &[u8],
        right: &[u8],
    ) -> Result<(), DepthError> {
        let left = self.decode_readback(left)?;
        let right = self.decode_readback(right)?;
        self.complete_copy_ndc(ticket, &left, &right)
    }

    /// Returns the live frame, or `None` unless the buffer is `Valid`.
    pub fn snapshot(&self) -> Option<Arc<DepthFrame>> {
        self.inner.read().live.clone()
    }

    /// Drops the live frame and any pending copy, e.g. when the depth source
    /// goes away.
    pub fn invalidate(&self) {
        let mut inner = self.inner.write();
        if inner.live.is_some() || inner.pending.is_some() {
            info!("Depth buffer invalidated");
        }
        inner.live = None;
        inner.pending = None;
    }

    fn publish<F>(&self, ticket: CopyTicket, build: F) -> Result<(), DepthError>
    where
        F: FnOnce(&EyeCamera, &EyeCamera) -> (Vec<f32>, Vec<f32>),
    {
        let mut inner = self.inner.write();
        let pending = match inner.pending.as_ref() {
            Some(pending) if pending.id == ticket.id => pending,
            Some(pending) => {
                warn!("Rejecting stale depth copy {} (pending {})", ticket.id, pending.id);
                return Err(DepthError::StaleTicket {
                    ticket: ticket.id,
                    pending: pending.id,
                });
            }
            None => {
                warn!("Rejecting depth copy {}: nothing pending", ticket.id);
                return Err(DepthError::NoPendingCopy);
            }
        };
        let [left_cam, right_cam] = pending.cameras;
        let (left, right) = build(&left_cam, &right_cam);
        let frame = DepthFrame::new(
            ticket.id,
            [
                EyeFrame::new(left_cam, left, self.resolution),
                EyeFrame::new(right_cam, right, self.resolution),
            ],
        );
        inner.pending = None;
        inner.live = Some(Arc::new(frame));
        debug!("Published depth frame {}", ticket.id);
        Ok(())
    }

    fn samples_per_eye(&self) -> usize {
        self.resolution * self.resolution
    }

    fn wrong_length(&self, actual: usize) -> DepthError {
        DepthError::WrongLength {
            expected: self.samples_per_eye(),
            actual,
        }
    }

    fn decode_readback(&self, bytes: &[u8]) -> Result<Vec<f32>, DepthError> {
        let expected = self.samples_per_eye() * 4;
        if bytes.len() != expected {
            warn!("Depth readback has {} bytes, expected {}", bytes.len(), expected);
            return Err(DepthError::WrongByteLength {
                expected,
                actual: bytes.len(),
            });
        }
        let mut samples = vec![0.0; self.samples_per_eye()];
        Cursor::new(bytes)
            .read_f32_into::<LE>(&mut samples)
            .map_err(|_| DepthError::WrongByteLength {
                expected,
                actual: bytes.len(),
            })?;
        Ok(samples)
    }

    fn validate_samples(&self, samples: &[f32]) -> Result<(), DepthError> {
        if samples.len() != self.samples_per_eye() {
            warn!("Depth copy has {} samples, expected {}", samples.len(), self.samples_per_eye());
            return Err(self.wrong_length(samples.len()));
        }
        if let Some((index, &value)) = samples
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || **d < 0.0)
        {
            warn!("Depth copy rejected: sample {} is {}", index, value);
            return Err(DepthError::InvalidSample { index, value });
        }
        Ok(())
    }
}
