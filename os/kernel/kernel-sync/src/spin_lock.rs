use crate::irq::{InterruptControl, IrqGuard};
use core::{
    cell::UnsafeCell,
    fmt,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

pub struct SpinLock<T> {
    /// lock state
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.try_acquire().then_some(SpinLockGuard { lock: self })
    }

    /// Spin until acquired (TATAS), then return a guard.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while !self.try_acquire() {
            // Contended path: spin on a read, then retry CAS.
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Disable local interrupts through `ctl`, then acquire the lock.
    ///
    /// Interrupts are restored after the lock is released, so a handler on
    /// this core can never spin on a lock its own core holds.
    #[inline]
    pub fn lock_irq<'a, C: InterruptControl + ?Sized>(
        &'a self,
        ctl: &'a C,
    ) -> IrqSpinLockGuard<'a, T, C> {
        let irq = IrqGuard::new(ctl);
        let guard = self.lock();
        IrqSpinLockGuard { guard, _irq: irq }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Whether some guard currently holds the lock. Racy; diagnostics only.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(g) => f.debug_struct("SpinLock").field("inner", &*g).finish(),
            None => f.write_str("SpinLock(<locked>)"),
        }
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Guard returned by [`SpinLock::lock_irq`].
///
/// Field order matters: the lock is released before interrupts are restored.
pub struct IrqSpinLockGuard<'a, T, C: InterruptControl + ?Sized> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard<'a, C>,
}

impl<T, C: InterruptControl + ?Sized> Deref for IrqSpinLockGuard<'_, T, C> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, C: InterruptControl + ?Sized> DerefMut for IrqSpinLockGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
