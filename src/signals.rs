use signal_hook::consts::{SIGINT, SIGTSTP};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flags set asynchronously by the shell's SIGINT and SIGTSTP handlers.
///
/// The handlers only store `true`; the interpreter consumes the flags between
/// operations. Clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    interrupted: Arc<AtomicBool>,
    suspended: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT and SIGTSTP into the flags instead of their default
    /// actions, so the shell itself survives Ctrl-C and Ctrl-Z.
    pub fn install(&self) -> io::Result<()> {
        signal_hook::flag::register(SIGINT, Arc::clone(&self.interrupted))?;
        signal_hook::flag::register(SIGTSTP, Arc::clone(&self.suspended))?;
        log::debug!("SIGINT/SIGTSTP handlers installed");
        Ok(())
    }

    /// Clear and return the interrupt flag.
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    /// Clear and return the suspend flag.
    pub fn take_suspend(&self) -> bool {
        self.suspended.swap(false, Ordering::SeqCst)
    }

    pub fn raise_interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn raise_suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }
}
