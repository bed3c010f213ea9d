//! Cooperative per-entity animation process.
//!
//! Each `AnimationWorker` owns a dedicated thread for one `Controller`. The
//! thread runs a fixed-step loop driven by `flint_runtime::GameClock` and
//! stops when told to, via a `crossbeam` channel rather than a shared atomic
//! flag — the worker blocks on `recv_timeout` between ticks instead of
//! spinning.

use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Sender};
use flint_runtime::GameClock;

use crate::controller::Controller;

/// Supplies the visibility gate the worker consults before paying for
/// sampling and hierarchy composition (step 5 of the worker's tick).
pub trait VisibilityOracle: Send + Sync {
    fn is_visible(&self) -> bool;
}

/// Always-visible oracle, used when no culling system is wired up.
pub struct AlwaysVisible;
impl VisibilityOracle for AlwaysVisible {
    fn is_visible(&self) -> bool {
        true
    }
}

enum Control {
    Stop,
}

/// Handle to a running worker thread. Dropping this without calling `stop`
/// leaves the thread running — callers should `stop` explicitly to ensure a
/// clean final tick.
pub struct AnimationWorker {
    control_tx: Sender<Control>,
    handle: Option<JoinHandle<()>>,
}

impl AnimationWorker {
    /// Spawns the worker thread. The thread loops at `clock`'s fixed timestep
    /// until `stop` is called (or its controller is dropped), taking a write
    /// lock on the controller's palette for the duration of each tick.
    ///
    /// `controller` is a weak handle (spec §3: "the Worker holds a weak
    /// handle to the Controller") — the orchestrator owning the strong `Arc`
    /// may drop it at any time; when that happens the next tick's `upgrade`
    /// fails, which is a schedule error (§7): the worker aborts and the last
    /// palette it published remains visible to renderers.
    pub fn spawn(
        name: impl Into<String>,
        controller: Weak<Mutex<Controller>>,
        visibility: Arc<dyn VisibilityOracle>,
        mut clock: GameClock,
    ) -> Self {
        let name = name.into();
        let (control_tx, control_rx) = bounded::<Control>(1);

        let handle = std::thread::spawn(move || {
            println!("animation worker '{}' started", name);
            loop {
                match control_rx.recv_timeout(Duration::from_millis(1)) {
                    Ok(Control::Stop) => break,
                    Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
                    Err(crossbeam::channel::RecvTimeoutError::Timeout) => {}
                }

                clock.tick();
                while clock.should_fixed_update() {
                    clock.consume_fixed_step();
                    let dt = clock.fixed_timestep as f32;

                    let Some(controller) = controller.upgrade() else {
                        eprintln!(
                            "animation worker '{}': {}",
                            name,
                            flint_core::FlintError::ScheduleError(name.clone())
                        );
                        return;
                    };
                    let mut controller = controller.lock().expect("controller mutex poisoned");
                    controller.advance(dt);
                    if visibility.is_visible() {
                        controller.sample_and_publish();
                    }
                    drop(controller);

                    if matches!(control_rx.try_recv(), Ok(Control::Stop)) {
                        println!("animation worker '{}' stopped", name);
                        return;
                    }
                }
            }
            println!("animation worker '{}' stopped", name);
        });

        Self { control_tx, handle: Some(handle) }
    }

    /// Signal the worker to finish its current tick and exit, then join it.
    pub fn stop(mut self) {
        let _ = self.control_tx.send(Control::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AnimationWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.control_tx.send(Control::Stop);
            let _ = handle.join();
        }
    }
}
