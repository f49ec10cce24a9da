use std::sync::atomic::{AtomicBool, Ordering};

/// Marks a tracker as busy with a top-level operation.
///
/// This is a suppression switch, not a lock: entering never waits. A caller
/// that finds the flag already set gets a nested [`Scope`] and is expected to
/// skip diffing and dispatch.
#[derive(Debug, Default)]
pub struct Guard {
    held: AtomicBool,
}

impl Guard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the guard if it is free.
    pub fn enter(&self) -> Scope<'_> {
        let top_level = self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        Scope {
            guard: self,
            top_level,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// One operation's claim on a [`Guard`].
///
/// A top-level scope releases the guard when dropped, whether the operation
/// returned, failed, or its future was dropped mid-flight.
#[derive(Debug)]
pub struct Scope<'a> {
    guard: &'a Guard,
    top_level: bool,
}

impl Scope<'_> {
    pub fn is_top_level(&self) -> bool {
        self.top_level
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.top_level {
            self.guard.held.store(false, Ordering::Release);
        }
    }
}
