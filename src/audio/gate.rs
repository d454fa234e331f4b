//! Exclusive access to the audio device
//!
//! The gate owns the device and lends it out as a scoped lease. While an
//! [`InputHandle`] or [`OutputHandle`] exists the device is physically out of
//! the gate, so a second claimant fails fast with [`Error::DeviceBusy`]
//! instead of queueing. Dropping a handle, on any exit path, puts the device
//! back and closes the input stream.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::device::AudioDevice;
use crate::{Error, Result};

/// What a lease is being used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Input,
    Output,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

struct Slot<D> {
    device: Option<D>,
    session: Option<Session>,
}

/// Single-holder gate over one audio device
pub struct AudioGate<D> {
    slot: Arc<Mutex<Slot<D>>>,
}

impl<D> Clone for AudioGate<D> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<D: AudioDevice> AudioGate<D> {
    pub fn new(device: D) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                device: Some(device),
                session: None,
            })),
        }
    }

    /// Claim the device for capture and open the input stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceBusy`] if another session holds the device, or
    /// the device error if the input stream cannot be started (the device is
    /// returned to the gate in that case)
    pub fn acquire_input(&self) -> Result<InputHandle<D>> {
        let mut lease = self.lease(Session::Input)?;
        lease.device()?.start_input()?;
        tracing::debug!("audio input acquired");
        Ok(InputHandle { lease })
    }

    /// Claim the device for playback
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceBusy`] if another session holds the device
    pub fn acquire_output(&self) -> Result<OutputHandle<D>> {
        let lease = self.lease(Session::Output)?;
        tracing::debug!("audio output acquired");
        Ok(OutputHandle { lease })
    }

    /// Give a lease back explicitly
    ///
    /// Equivalent to dropping the handle.
    pub fn release(&self, handle: impl Into<Released>) {
        let Released(session) = handle.into();
        tracing::trace!(%session, "audio lease handed back");
    }

    /// Session currently holding the device, if any
    #[must_use]
    pub fn active_session(&self) -> Option<Session> {
        lock(&self.slot).session
    }

    /// Whether the device is lent out
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active_session().is_some()
    }

    fn lease(&self, session: Session) -> Result<Lease<D>> {
        let mut slot = lock(&self.slot);
        let Some(device) = slot.device.take() else {
            let holder = slot.session.unwrap_or(session);
            tracing::debug!(requested = %session, %holder, "audio device busy");
            return Err(Error::DeviceBusy(holder));
        };
        slot.session = Some(session);
        drop(slot);

        Ok(Lease {
            device: Some(device),
            session,
            slot: Arc::clone(&self.slot),
        })
    }
}

fn lock<D>(slot: &Mutex<Slot<D>>) -> MutexGuard<'_, Slot<D>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Proof that a handle was consumed by [`AudioGate::release`]
pub struct Released(Session);

/// Device on loan from the gate
struct Lease<D: AudioDevice> {
    device: Option<D>,
    session: Session,
    slot: Arc<Mutex<Slot<D>>>,
}

impl<D: AudioDevice> Lease<D> {
    fn device(&mut self) -> Result<&mut D> {
        self.device
            .as_mut()
            .ok_or_else(|| Error::Audio("audio lease already returned".to_string()))
    }
}

impl<D: AudioDevice> Drop for Lease<D> {
    fn drop(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };
        if self.session == Session::Input {
            device.stop_input();
        }

        let mut slot = lock(&self.slot);
        slot.device = Some(device);
        slot.session = None;
        tracing::debug!(session = %self.session, "audio device released");
    }
}

/// Capture rights over the device
pub struct InputHandle<D: AudioDevice> {
    lease: Lease<D>,
}

impl<D: AudioDevice> InputHandle<D> {
    /// Read the next frame of `len` samples
    ///
    /// # Errors
    ///
    /// Returns error if the device fails
    pub async fn read_frame(&mut self, len: usize) -> Result<Vec<i16>> {
        self.lease.device()?.read_frame(len).await
    }

    /// Sample rate of frames read through this handle
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.lease
            .device
            .as_ref()
            .map_or(super::capture::SAMPLE_RATE, AudioDevice::sample_rate)
    }
}

impl<D: AudioDevice> From<InputHandle<D>> for Released {
    fn from(handle: InputHandle<D>) -> Self {
        Self(handle.lease.session)
    }
}

/// Playback rights over the device
pub struct OutputHandle<D: AudioDevice> {
    lease: Lease<D>,
}

impl<D: AudioDevice> OutputHandle<D> {
    /// Play encoded audio to completion
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub async fn play(&mut self, audio: &[u8]) -> Result<()> {
        self.lease.device()?.play(audio).await
    }
}

impl<D: AudioDevice> From<OutputHandle<D>> for Released {
    fn from(handle: OutputHandle<D>) -> Self {
        Self(handle.lease.session)
    }
}
