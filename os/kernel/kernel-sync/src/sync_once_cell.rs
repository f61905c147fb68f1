use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

/// 0 = UNINIT, 1 = INITING, 2 = READY
const UNINIT: u8 = 0;
const INITING: u8 = 1;
const READY: u8 = 2;

/// A cell written at most once, readable from any core afterwards.
///
/// The transition to "ready" is one-way, so [`is_initialized`](Self::is_initialized)
/// doubles as a readiness flag that never needs to be reset.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Returns `Some(&T)` if already initialized.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY guarantees the write is done
            Some(unsafe { &*(*self.value.get()).as_ptr() })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Store `value` if the cell is still empty.
    ///
    /// # Errors
    /// Hands `value` back if the cell is initialized or being initialized.
    pub fn set(&self, value: T) -> Result<(), T> {
        if self
            .state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(value);
        }
        unsafe {
            (*self.value.get()).write(value);
        }
        self.state.store(READY, Ordering::Release);
        Ok(())
    }

    /// Initialize at most once and return `&T`.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        // Fast path
        if let Some(v) = self.get() {
            return v;
        }

        if self
            .state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            let v = init();
            unsafe {
                (*self.value.get()).write(v);
            }
            // Publish value before marking READY
            self.state.store(READY, Ordering::Release);
        } else {
            // Someone else is initializing; wait until READY
            while self.state.load(Ordering::Acquire) != READY {
                spin_loop();
            }
        }
        // SAFETY: READY
        unsafe { &*(*self.value.get()).as_ptr() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means the value was written and is never moved out.
            unsafe { self.value.get_mut().assume_init_drop() }
        }
    }
}

// Safety: shared after READY; initialization is single-writer.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
