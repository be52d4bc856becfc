//! Device gate: the speaker and the microphone are exclusive resources.
//!
//! At most one of {a playback session, a recognition session} may own the
//! audio devices at any instant. Owners hold a [`DeviceLease`]; dropping the
//! lease releases the gate. A hard-stop force-releases the gate so a stale
//! lease dropped later cannot clobber a newer owner.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::VoiceError;

const IDLE: u64 = 0;
const KIND_BITS: u64 = 2;
const KIND_OUTPUT: u64 = 1;
const KIND_INPUT: u64 = 2;

/// Who currently owns the audio devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOwner {
    /// Nobody; recognition or playback may start.
    Idle,
    /// A playback session holds the speaker.
    Output,
    /// A recognition session holds the microphone.
    Input,
}

impl DeviceOwner {
    const fn describe(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Output => "audio output",
            Self::Input => "microphone",
        }
    }
}

/// Shared gate coordinating speaker and microphone ownership.
///
/// The slot stores `(lease id << 2) | kind`, so each lease releases only
/// itself.
#[derive(Debug, Clone, Default)]
pub struct DeviceGate {
    slot: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
}

impl DeviceGate {
    /// Create an idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current owner.
    #[must_use]
    pub fn owner(&self) -> DeviceOwner {
        decode(self.slot.load(Ordering::SeqCst))
    }

    /// Whether nothing holds the devices.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.owner() == DeviceOwner::Idle
    }

    /// Take the speaker. Fails if the microphone or another playback holds it.
    pub fn acquire_output(&self) -> Result<DeviceLease, VoiceError> {
        self.acquire(KIND_OUTPUT)
    }

    /// Take the microphone. Fails unless the gate is idle.
    pub fn acquire_input(&self) -> Result<DeviceLease, VoiceError> {
        self.acquire(KIND_INPUT)
    }

    /// Release whatever holds the gate (hard-stop path).
    pub fn force_release(&self) {
        let previous = self.slot.swap(IDLE, Ordering::SeqCst);
        if previous != IDLE {
            tracing::debug!(owner = decode(previous).describe(), "Device gate force-released");
        }
    }

    fn acquire(&self, kind: u64) -> Result<DeviceLease, VoiceError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let value = (id << KIND_BITS) | kind;
        match self
            .slot
            .compare_exchange(IDLE, value, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                tracing::trace!(owner = decode(value).describe(), "Device gate acquired");
                Ok(DeviceLease {
                    slot: Arc::clone(&self.slot),
                    value,
                })
            }
            Err(current) => Err(VoiceError::ResourceConflict(format!(
                "cannot acquire {} while {} is active",
                decode(value).describe(),
                decode(current).describe()
            ))),
        }
    }
}

const fn decode(value: u64) -> DeviceOwner {
    match value & ((1 << KIND_BITS) - 1) {
        KIND_OUTPUT => DeviceOwner::Output,
        KIND_INPUT => DeviceOwner::Input,
        _ => DeviceOwner::Idle,
    }
}

/// Ownership of the gate; released on drop.
#[derive(Debug)]
pub struct DeviceLease {
    slot: Arc<AtomicU64>,
    value: u64,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        // Only release if we still own it; a force-release may have handed
        // the gate to someone else in the meantime.
        let _ = self
            .slot
            .compare_exchange(self.value, IDLE, Ordering::SeqCst, Ordering::SeqCst);
    }
}
