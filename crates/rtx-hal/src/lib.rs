//! Platform abstraction trait for the RTX kernel
//!
//! This crate defines the `Hal` trait that allows the kernel to run on
//! different platforms (Cortex-M hardware, QEMU, a hosted test harness) by
//! abstracting the handful of operations the kernel core cannot express
//! portably:
//!
//! - saved execution contexts (register frame + stack pointer) and the
//!   transition between them
//! - the global interrupt mask used as the kernel's critical-section
//!   primitive
//! - debug output
//!
//! The kernel core never inspects a context; it only asks the platform to
//! synthesize one for a process entry point and to switch between two of
//! them.

#![no_std]

/// Entry-point token for a process.
///
/// On hardware this is the address of the process's entry function; the
/// kernel treats it as an opaque value and hands it back to the platform
/// when a fresh initial context is needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryPoint(pub usize);

/// Platform abstraction trait.
///
/// Implementations provide context management, the interrupt mask, and
/// debug output. All operations are infallible: a platform that cannot
/// carve out a process stack at boot has no meaningful way to continue.
pub trait Hal: Send + Sync + 'static {
    /// Saved execution context of a process. Opaque to the kernel; only
    /// the platform knows its representation (exception stack frame on
    /// Cortex-M, a recorded token in the hosted mock).
    type Context: Send;

    /// Synthesize an initial context: a minimal frame that, when restored
    /// for the first time, begins execution at `entry` on a fresh stack of
    /// `stack_words` words.
    fn init_context(&self, entry: EntryPoint, stack_words: usize) -> Self::Context;

    /// Save the outgoing context (if any) and restore the incoming one.
    ///
    /// `from` is `None` when there is no outgoing context to save, e.g. on
    /// the very first dispatch out of the boot path.
    ///
    /// Must only be called with interrupts enabled: the incoming process
    /// expects to resume with the mask in its default state.
    fn switch_context(&self, from: Option<&mut Self::Context>, to: &mut Self::Context);

    /// Mask interrupts. Returns `true` if they were previously enabled, so
    /// nested critical sections restore correctly.
    fn disable_interrupts(&self) -> bool;

    /// Restore the interrupt-enable state previously returned by
    /// [`Hal::disable_interrupts`].
    fn restore_interrupts(&self, was_enabled: bool);

    /// Write a debug message to the platform's console/log.
    fn debug_write(&self, msg: &str);
}
