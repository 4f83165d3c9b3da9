//! Registration slot and no-conflict teardown
//!
//! A loader can register itself in a shared `RegistrationSlot`, remembering
//! whoever occupied the slot before. Once all of its work has drained, the
//! teardown controller detaches it: either the previous occupant is put
//! back, or the slot is cleared and a caller-supplied callback runs.
//!
//! Slots hold weak references, so registration never keeps a loader alive
//! after its last `LoaderHandle` is dropped.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::loader::manager::{LoaderHandle, WeakLoaderHandle};

/// Teardown callback invoked with its caller-supplied arguments
pub type TeardownCallback = Box<dyn FnOnce(Vec<Value>) + Send + 'static>;

/// Shared slot holding the currently registered loader
#[derive(Debug, Clone, Default)]
pub struct RegistrationSlot {
    occupant: Arc<Mutex<Option<WeakLoaderHandle>>>,
}

impl RegistrationSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide slot
    pub fn global() -> &'static RegistrationSlot {
        static GLOBAL: OnceLock<RegistrationSlot> = OnceLock::new();
        GLOBAL.get_or_init(RegistrationSlot::new)
    }

    fn lock(&self) -> MutexGuard<'_, Option<WeakLoaderHandle>> {
        self.occupant.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current occupant, if it is still running
    pub fn current(&self) -> Option<LoaderHandle> {
        self.lock().as_ref().and_then(WeakLoaderHandle::upgrade)
    }

    pub fn is_occupied(&self) -> bool {
        self.current().is_some()
    }

    /// Install `handle`, returning the previous occupant if still running
    pub fn install(&self, handle: LoaderHandle) -> Option<LoaderHandle> {
        self.swap(handle.downgrade())
            .as_ref()
            .and_then(WeakLoaderHandle::upgrade)
    }

    fn swap(&self, occupant: WeakLoaderHandle) -> Option<WeakLoaderHandle> {
        self.lock().replace(occupant)
    }

    /// Put `occupant` into the slot if `loader_id` still holds it
    ///
    /// Returns `false` when another loader has taken the slot meanwhile.
    fn release(&self, loader_id: Uuid, occupant: Option<WeakLoaderHandle>) -> bool {
        let mut slot = self.lock();
        let holds = slot.as_ref().map(|h| h.id() == loader_id).unwrap_or(false);
        if holds {
            *slot = occupant;
        }
        holds
    }

    /// Empty the slot, returning the occupant
    pub fn clear(&self) -> Option<LoaderHandle> {
        self.lock().take().as_ref().and_then(WeakLoaderHandle::upgrade)
    }
}

/// What happens once a registered loader has no work left
pub enum NoConflict {
    /// Stay registered
    Disabled,
    /// Restore the previous occupant of the slot
    Restore,
    /// Clear the slot and invoke `callback(args)`
    Callback {
        callback: TeardownCallback,
        args: Vec<Value>,
    },
}

impl NoConflict {
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            NoConflict::Restore
        } else {
            NoConflict::Disabled
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, NoConflict::Disabled)
    }
}

impl fmt::Debug for NoConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoConflict::Disabled => f.write_str("Disabled"),
            NoConflict::Restore => f.write_str("Restore"),
            NoConflict::Callback { args, .. } => f
                .debug_struct("Callback")
                .field("args", args)
                .finish_non_exhaustive(),
        }
    }
}

/// A loader's registration in a slot
#[derive(Debug)]
pub struct Registration {
    slot: RegistrationSlot,
    loader_id: Uuid,
    previous: Option<WeakLoaderHandle>,
}

impl Registration {
    /// Install `handle` into `slot`, saving the previous occupant
    pub fn install(slot: RegistrationSlot, handle: LoaderHandle) -> Self {
        let loader_id = handle.id();
        let previous = slot.swap(handle.downgrade());
        debug!(
            "Loader {} registered (previous occupant: {})",
            loader_id,
            previous.is_some()
        );
        Self {
            slot,
            loader_id,
            previous,
        }
    }
}

/// Fires the no-conflict teardown at most once
#[derive(Debug)]
pub struct TeardownController {
    mode: NoConflict,
    registration: Option<Registration>,
    torn_down: bool,
}

impl TeardownController {
    pub fn new(mode: NoConflict, registration: Option<Registration>) -> Self {
        Self {
            mode,
            registration,
            torn_down: false,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Called whenever the loader has nothing in flight and nothing queued
    ///
    /// Returns `true` if teardown ran on this call.
    pub fn on_idle(&mut self) -> bool {
        if self.torn_down || self.mode.is_disabled() {
            return false;
        }
        self.torn_down = true;

        match std::mem::replace(&mut self.mode, NoConflict::Disabled) {
            NoConflict::Disabled => {}
            NoConflict::Restore => {
                if let Some(registration) = self.registration.take() {
                    let restored = registration
                        .slot
                        .release(registration.loader_id, registration.previous);
                    info!(
                        "Loader {} detached, previous occupant restored: {}",
                        registration.loader_id, restored
                    );
                }
            }
            NoConflict::Callback { callback, args } => {
                if let Some(registration) = self.registration.take() {
                    registration.slot.release(registration.loader_id, None);
                    info!("Loader {} detached from its slot", registration.loader_id);
                }
                callback(args);
            }
        }
        true
    }
}
