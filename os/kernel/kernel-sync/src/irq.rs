//! # Local interrupt control
//!
//! The virtual-memory code only needs two primitives from the platform:
//! "disable interrupts on this core and tell me what the level was" and
//! "restore a previously saved level". [`InterruptControl`] captures exactly
//! that (the `splhigh()` / `splx()` pair), and [`IrqGuard`] pairs them up
//! RAII-style so an early return can never leave interrupts disabled.
//!
//! [`SoftInterrupts`] is a per-core software model of the interrupt-enable
//! bit, used by hosted builds and tests.

use core::sync::atomic::{AtomicBool, Ordering};

/// Saved interrupt level, returned by [`InterruptControl::disable`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use = "the saved state must be handed back to `restore`"]
pub struct InterruptState {
    enabled: bool,
}

impl InterruptState {
    #[inline]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether interrupts were enabled when this state was captured.
    #[inline]
    #[must_use]
    pub const fn were_enabled(self) -> bool {
        self.enabled
    }
}

/// Interrupt enable/disable for the **current** core.
///
/// Implementations only affect the local core; they give no protection
/// against other cores.
pub trait InterruptControl {
    /// Disables interrupts and returns the previous level.
    fn disable(&self) -> InterruptState;

    /// Restores a level previously returned by [`disable`](Self::disable).
    fn restore(&self, prior: InterruptState);

    /// Whether interrupts are currently enabled.
    fn enabled(&self) -> bool;
}

impl<C: InterruptControl + ?Sized> InterruptControl for &C {
    #[inline]
    fn disable(&self) -> InterruptState {
        (**self).disable()
    }

    #[inline]
    fn restore(&self, prior: InterruptState) {
        (**self).restore(prior);
    }

    #[inline]
    fn enabled(&self) -> bool {
        (**self).enabled()
    }
}

/// RAII guard that disables interrupts on creation and restores the previous
/// level on drop.
///
/// Guards nest: an inner guard created while interrupts are already off
/// restores "off", leaving the outer guard in charge.
///
/// # Examples
///
/// ```
/// use kernel_sync::{InterruptControl, IrqGuard, SoftInterrupts};
///
/// let irq = SoftInterrupts::new();
/// {
///     let _g = IrqGuard::new(&irq);
///     assert!(!irq.enabled());
/// }
/// assert!(irq.enabled());
/// ```
pub struct IrqGuard<'a, C: InterruptControl + ?Sized> {
    ctl: &'a C,
    prior: InterruptState,
}

impl<'a, C: InterruptControl + ?Sized> IrqGuard<'a, C> {
    #[inline]
    #[must_use]
    pub fn new(ctl: &'a C) -> Self {
        let prior = ctl.disable();
        Self { ctl, prior }
    }
}

impl<C: InterruptControl + ?Sized> Drop for IrqGuard<'_, C> {
    fn drop(&mut self) {
        self.ctl.restore(self.prior);
    }
}

/// Software model of a core's interrupt-enable bit.
///
/// Starts with interrupts enabled.
pub struct SoftInterrupts {
    enabled: AtomicBool,
}

impl Default for SoftInterrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftInterrupts {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }
}

impl InterruptControl for SoftInterrupts {
    #[inline]
    fn disable(&self) -> InterruptState {
        InterruptState::new(self.enabled.swap(false, Ordering::AcqRel))
    }

    #[inline]
    fn restore(&self, prior: InterruptState) {
        self.enabled.store(prior.were_enabled(), Ordering::Release);
    }

    #[inline]
    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_enabled() {
        let irq = SoftInterrupts::new();
        assert!(irq.enabled());
        {
            let _g = IrqGuard::new(&irq);
            assert!(!irq.enabled());
        }
        assert!(irq.enabled());
    }

    #[test]
    fn nested_guards_restore_in_order() {
        let irq = SoftInterrupts::new();
        let outer = IrqGuard::new(&irq);
        {
            let _inner = IrqGuard::new(&irq);
            assert!(!irq.enabled());
        }
        // inner guard saw "disabled" and must not re-enable
        assert!(!irq.enabled());
        drop(outer);
        assert!(irq.enabled());
    }

    #[test]
    fn disable_reports_prior_level() {
        let irq = SoftInterrupts::new();
        let first = irq.disable();
        let second = irq.disable();
        assert!(first.were_enabled());
        assert!(!second.were_enabled());
        irq.restore(second);
        assert!(!irq.enabled());
        irq.restore(first);
        assert!(irq.enabled());
    }
}
