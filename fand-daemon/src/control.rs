//! Shelf control threads
//!
//! Each shelf gets a thread that recomputes its PWM, then sleeps for the
//! shelf's interval or until termination. Any failure in a shelf thread is
//! fatal for the whole process.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use fand_core::{Config, Probe, Shelf, ShelfRegistry, Terminator};
use fand_error::{FandError, Result};

/// Create every configured shelf, locating its devices
pub fn build_shelves(config: &Config, probe: &dyn Probe) -> Result<ShelfRegistry> {
    let mut shelves = ShelfRegistry::new();
    for shelf_config in &config.shelves {
        let shelf = Shelf::from_config(shelf_config, probe)?;
        info!("Shelf {} with {} device(s)", shelf.id(), shelf.device_count());
        shelves.insert(shelf)?;
    }
    Ok(shelves)
}

/// Update `shelf` until termination
pub fn run_shelf(shelf: &Shelf, probe: &dyn Probe, terminator: &Terminator) -> Result<()> {
    info!("Starting control loop for shelf {}", shelf.id());
    while !terminator.is_terminating() {
        shelf.update(probe)?;
        if !terminator.sleep(shelf.sleep_time()) {
            break;
        }
    }
    debug!("Control loop for shelf {} stopped", shelf.id());
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Start one control thread per shelf
pub fn spawn_shelf_threads(
    shelves: &ShelfRegistry,
    probe: Arc<dyn Probe>,
    terminator: &Terminator,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(shelves.len());
    for shelf in shelves.iter() {
        let shelf = Arc::clone(shelf);
        let probe = Arc::clone(&probe);
        let terminator = terminator.clone();
        let handle = thread::Builder::new()
            .name(format!("shelf-{}", shelf.id()))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_shelf(&shelf, probe.as_ref(), &terminator)
                }));
                let failure = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => e.to_string(),
                    Err(payload) => panic_message(payload.as_ref()),
                };
                terminator.terminate(Some(format!("Error in shelf {} thread: {}", shelf.id(), failure)));
            })
            .map_err(|e| FandError::io("Cannot start shelf thread", e))?;
        handles.push(handle);
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use fand_core::{Backend, CurveSet, Device};

    /// Probe that counts refreshes and fails after `fail_after` of them
    struct CountingProbe {
        refreshes: AtomicUsize,
        fail_after: usize,
    }

    impl CountingProbe {
        fn new(fail_after: usize) -> Self {
            Self {
                refreshes: AtomicUsize::new(0),
                fail_after,
            }
        }
    }

    impl Probe for CountingProbe {
        fn locate(&self, _serial: &str) -> Backend {
            Backend::None
        }

        fn refresh(&self, _backend: &mut Backend) -> Result<()> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.fail_after {
                return Err(FandError::hardware("sensor vanished"));
            }
            Ok(())
        }
    }

    fn shelf_with_device(probe: &dyn Probe, sleep: Duration) -> ShelfRegistry {
        let mut shelves = ShelfRegistry::new();
        let device = Device::new("ZA1", "bay 1", probe);
        shelves
            .insert(Shelf::new("s1", vec![device], CurveSet::default(), sleep))
            .unwrap();
        shelves
    }

    #[test]
    fn test_build_shelves() {
        let config = Config::from_json(r#"{"shelves": [{"id": "a"}, {"id": "b", "devices": [{"serial": "X"}]}]}"#)
            .unwrap();
        let shelves = build_shelves(&config, &CountingProbe::new(usize::MAX)).unwrap();
        assert_eq!(shelves.len(), 2);
        assert_eq!(shelves.get("b").unwrap().device_count(), 1);
    }

    #[test]
    fn test_thread_stops_on_terminate() {
        let probe = Arc::new(CountingProbe::new(usize::MAX));
        let shelves = shelf_with_device(probe.as_ref(), Duration::from_secs(3600));
        let terminator = Terminator::new();

        let handles = spawn_shelf_threads(&shelves, probe.clone(), &terminator).unwrap();
        while probe.refreshes.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        terminator.terminate(None);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(terminator.error(), None);
    }

    #[test]
    fn test_failure_terminates_process() {
        let probe = Arc::new(CountingProbe::new(2));
        let shelves = shelf_with_device(probe.as_ref(), Duration::from_millis(1));
        let terminator = Terminator::new();

        let handles = spawn_shelf_threads(&shelves, probe, &terminator).unwrap();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(terminator.is_terminating());
        let error = terminator.error().unwrap();
        assert!(error.contains("shelf s1"), "{error}");
        assert!(error.contains("sensor vanished"), "{error}");
    }
}
