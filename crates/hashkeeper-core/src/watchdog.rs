use crossbeam_channel::{select, tick, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::{EngineInner, ScanEngine};
use crate::error::Error;

/// Periodic skip-if-busy re-scan of the engine's last root.
///
/// The timer thread holds only a weak reference, so dropping the last
/// [`ScanEngine`] ends it at the next tick. Missed ticks are dropped, not
/// queued.
pub(crate) struct Watchdog {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    pub(crate) fn spawn(engine: Weak<EngineInner>, interval: Duration) -> Result<Self, Error> {
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("hashkeeper-watchdog".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let Some(inner) = engine.upgrade() else {
                                debug!("Watchdog: engine dropped, exiting");
                                break;
                            };
                            let outcome = ScanEngine::from_inner(inner).watchdog_tick();
                            debug!("Watchdog tick: {:?}", outcome);
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })?;
        Ok(Self { stop, handle })
    }

    /// Signal the timer thread and wait for it to exit.
    pub(crate) fn stop(self) {
        let Watchdog { stop, handle } = self;
        drop(stop);
        if handle.join().is_err() {
            warn!("Watchdog thread panicked");
        }
    }
}
