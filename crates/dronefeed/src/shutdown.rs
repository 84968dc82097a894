use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Called when the host fails to exit within the grace period.
pub type ExitHook = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Default)]
struct SignalState {
    raised: bool,
    exited: bool,
}

/// Process-level termination flag shared by the host driver, stages and the
/// display surface.
///
/// `raise` asks the pipeline to wind down; `mark_exited` is the host's
/// confirmation that it did.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<SignalState>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        if !state.raised {
            state.raised = true;
            log::info!("Shutdown requested");
        }
        cvar.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        self.inner.0.lock().raised
    }

    /// Block until raised or `timeout` elapses. Returns whether it was raised.
    pub fn wait_raised(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        if !state.raised {
            cvar.wait_while_for(&mut state, |s| !s.raised, timeout);
        }
        state.raised
    }

    pub fn mark_exited(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().exited = true;
        cvar.notify_all();
    }

    pub fn has_exited(&self) -> bool {
        self.inner.0.lock().exited
    }

    /// Block until the host confirms exit or `timeout` elapses.
    pub fn wait_exited(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        if !state.exited {
            cvar.wait_while_for(&mut state, |s| !s.exited, timeout);
        }
        state.exited
    }
}

/// Default exit hook: terminate the process.
pub fn process_exit_hook() -> ExitHook {
    Arc::new(|| std::process::exit(0))
}

/// Last-resort shutdown: raise the signal now, and if the host has not
/// confirmed exit after `grace`, run `hook`.
///
/// Pipeline threads can be stuck in a blocking read on the decoder; this is
/// what keeps a closed window from leaving a headless process behind.
pub fn arm_forced_shutdown(
    signal: &ShutdownSignal,
    grace: Duration,
    hook: ExitHook,
) -> Option<JoinHandle<()>> {
    signal.raise();
    let signal = signal.clone();
    let spawned = std::thread::Builder::new()
        .name("shutdown-watchdog".into())
        .spawn(move || {
            if signal.wait_exited(grace) {
                log::debug!("Pipeline exited cleanly, watchdog disarmed");
                return;
            }
            log::error!(
                "Pipeline did not exit within {} ms of the display closing, forcing shutdown",
                grace.as_millis()
            );
            hook();
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("Failed to spawn shutdown watchdog: {e}");
            None
        }
    }
}
