//! Routing between interfaces.
//!
//! Every input interface pushes onto one central queue. A single engine
//! thread pops from it and copies each sentence onto the queue of every
//! output interface except the one it came from. When the last input ends
//! the central queue closes, the engine drains it and then closes every
//! output queue so the writers finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nmeaplex_frame::InterfaceId;
use tracing::{debug, error, info};

use crate::error::{InterfaceError, Result};
use crate::interface::{Built, Direction, ExitReason, Interface, InterfaceExit};
use crate::queue::BoundedQueue;

/// Default capacity of the central queue.
pub const DEFAULT_MUX_QSIZE: usize = 256;

/// A set of interfaces waiting to be started.
#[derive(Debug)]
pub struct Mux {
    qsize: usize,
    interfaces: Vec<Interface>,
}

impl Default for Mux {
    fn default() -> Self {
        Self::new(DEFAULT_MUX_QSIZE)
    }
}

impl Mux {
    /// Create an empty registry whose central queue holds `qsize` sentences.
    pub fn new(qsize: usize) -> Self {
        Self {
            qsize,
            interfaces: Vec::new(),
        }
    }

    /// Register the result of [`InterfaceSetup::build`](crate::InterfaceSetup::build).
    pub fn add(&mut self, built: Built) {
        self.interfaces.extend(built.into_interfaces());
    }

    /// Register a single interface.
    pub fn add_interface(&mut self, interface: Interface) {
        self.interfaces.push(interface);
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Spawn the engine and one thread per interface.
    pub fn start(self) -> Result<RunningMux> {
        let central = Arc::new(BoundedQueue::new(self.qsize)?);

        let mut routes = Vec::new();
        let mut inputs = 0usize;
        for interface in &self.interfaces {
            match interface.direction() {
                Direction::In => inputs += 1,
                _ => {
                    if let Some(queue) = interface.queue() {
                        routes.push(Route {
                            id: interface.id(),
                            pair: interface.pair(),
                            queue: Arc::clone(queue),
                        });
                    }
                }
            }
        }
        let output_queues: Vec<_> = routes.iter().map(|r| Arc::clone(&r.queue)).collect();

        info!(
            interfaces = self.interfaces.len(),
            inputs,
            outputs = routes.len(),
            qsize = self.qsize,
            "starting mux"
        );

        let live_inputs = Arc::new(AtomicUsize::new(inputs));
        if inputs == 0 {
            central.close();
        }

        let shutdown_all = |central: &BoundedQueue| {
            central.close();
            for queue in &output_queues {
                queue.close();
            }
        };

        let engine = {
            let central = Arc::clone(&central);
            spawn_named("mux-engine".to_string(), move || run_engine(&central, routes))
        }
        .inspect_err(|_| shutdown_all(&central))?;

        let mut workers = Vec::with_capacity(self.interfaces.len());
        for interface in self.interfaces {
            let id = interface.id();
            let name = interface.name().to_string();
            let direction = interface.direction();
            let thread_name = format!("{id}-{direction}");

            let spawned = if direction == Direction::In {
                let guard = InputGuard {
                    live: Arc::clone(&live_inputs),
                    central: Arc::clone(&central),
                };
                let sink = Arc::clone(&central);
                spawn_named(thread_name, move || {
                    let _guard = guard;
                    interface.run(Some(sink))
                })
            } else {
                spawn_named(thread_name, move || interface.run(None))
            };

            match spawned {
                Ok(handle) => workers.push(Worker {
                    id,
                    name,
                    direction,
                    handle,
                }),
                Err(err) => {
                    shutdown_all(&central);
                    return Err(err);
                }
            }
        }

        Ok(RunningMux {
            central,
            engine,
            workers,
        })
    }
}

/// Handle to a started mux.
pub struct RunningMux {
    central: Arc<BoundedQueue>,
    engine: JoinHandle<()>,
    workers: Vec<Worker>,
}

impl RunningMux {
    /// Stop accepting input.
    ///
    /// Sentences already queued are still delivered. Readers end at their
    /// next sentence.
    pub fn stop(&self) {
        debug!("mux stop requested");
        self.central.close();
    }

    /// Number of interface threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Block until every interface and the engine have finished.
    pub fn wait(self) -> Vec<InterfaceExit> {
        let exits = self
            .workers
            .into_iter()
            .map(|worker| match worker.handle.join() {
                Ok(exit) => exit,
                Err(_) => {
                    error!(interface = %worker.id, "interface thread panicked");
                    InterfaceExit {
                        id: worker.id,
                        name: worker.name,
                        direction: worker.direction,
                        sentences: 0,
                        dropped: 0,
                        reason: ExitReason::Panicked,
                    }
                }
            })
            .collect();

        if self.engine.join().is_err() {
            error!("mux engine panicked");
        }
        info!("mux stopped");
        exits
    }
}

impl std::fmt::Debug for RunningMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningMux")
            .field("central", &self.central)
            .field("workers", &self.workers.len())
            .finish()
    }
}

struct Worker {
    id: InterfaceId,
    name: String,
    direction: Direction,
    handle: JoinHandle<InterfaceExit>,
}

struct Route {
    id: InterfaceId,
    pair: Option<InterfaceId>,
    queue: Arc<BoundedQueue>,
}

// Closes the central queue when the last reader exits, including by panic.
struct InputGuard {
    live: Arc<AtomicUsize>,
    central: Arc<BoundedQueue>,
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("last input finished, closing central queue");
            self.central.close();
        }
    }
}

fn run_engine(central: &BoundedQueue, mut routes: Vec<Route>) {
    let mut routed = 0u64;
    while let Some(sentence) = central.pop() {
        let src = sentence.source();
        routes.retain(|route| {
            if route.id == src || route.pair == Some(src) {
                return true;
            }
            if route.queue.push(sentence.clone()).is_err() {
                debug!(interface = %route.id, "output queue closed, removing route");
                return false;
            }
            true
        });
        routed += 1;
    }

    for route in &routes {
        route.queue.close();
    }
    info!(sentences = routed, "mux engine finished");
}

fn spawn_named<T, F>(name: String, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|source| InterfaceError::Spawn { name, source })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use nmeaplex_frame::SentenceBlock;

    use super::*;
    use crate::interface::tests::{CloseCounter, MockTransport};
    use crate::interface::InterfaceSetup;

    fn bodies(written: &Mutex<Vec<SentenceBlock>>) -> Vec<String> {
        written
            .lock()
            .unwrap()
            .iter()
            .map(|s| String::from_utf8_lossy(s.body()).into_owned())
            .collect()
    }

    fn input(id: u32, lines: &[&str], counter: &Arc<CloseCounter>) -> Built {
        let id = InterfaceId::new(id);
        let transport = MockTransport::new(Arc::clone(counter)).with_lines(id, lines);
        InterfaceSetup::new(id, "in", Direction::In)
            .build(Box::new(transport), 1)
            .expect("input should build")
    }

    fn output(id: u32, counter: &Arc<CloseCounter>) -> (Built, Arc<Mutex<Vec<SentenceBlock>>>) {
        let transport = MockTransport::new(Arc::clone(counter));
        let written = Arc::clone(&transport.written);
        let built = InterfaceSetup::new(InterfaceId::new(id), "out", Direction::Out)
            .build(Box::new(transport), 4)
            .expect("output should build");
        (built, written)
    }

    #[test]
    fn fans_out_to_every_output_in_order() {
        let counter = Arc::new(CloseCounter::default());
        let mut mux = Mux::new(2);
        mux.add(input(1, &["$A,1", "$A,2", "$A,3"], &counter));
        let (out_a, written_a) = output(2, &counter);
        let (out_b, written_b) = output(3, &counter);
        mux.add(out_a);
        mux.add(out_b);
        assert_eq!(mux.len(), 3);

        let exits = mux.start().expect("mux should start").wait();

        assert_eq!(exits.len(), 3);
        assert_eq!(bodies(&written_a), vec!["$A,1", "$A,2", "$A,3"]);
        assert_eq!(bodies(&written_b), vec!["$A,1", "$A,2", "$A,3"]);
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn keeps_per_source_order_with_several_inputs() {
        let counter = Arc::new(CloseCounter::default());
        let first: Vec<String> = (0..100).map(|n| format!("$X,{n}")).collect();
        let second: Vec<String> = (0..100).map(|n| format!("$Y,{n}")).collect();
        let first_refs: Vec<&str> = first.iter().map(String::as_str).collect();
        let second_refs: Vec<&str> = second.iter().map(String::as_str).collect();

        let mut mux = Mux::new(3);
        mux.add(input(1, &first_refs, &counter));
        mux.add(input(2, &second_refs, &counter));
        let (out, written) = output(3, &counter);
        mux.add(out);
        mux.start().expect("mux should start").wait();

        let got = bodies(&written);
        assert_eq!(got.len(), 200);
        let xs: Vec<_> = got.iter().filter(|s| s.starts_with("$X")).cloned().collect();
        let ys: Vec<_> = got.iter().filter(|s| s.starts_with("$Y")).cloned().collect();
        assert_eq!(xs, first);
        assert_eq!(ys, second);
    }

    #[test]
    fn bidirectional_interface_does_not_hear_itself() {
        let counter = Arc::new(CloseCounter::default());
        let both_id = InterfaceId::new(1);
        let both = MockTransport::new(Arc::clone(&counter)).with_lines(both_id, &["$B,1", "$B,2"]);
        let both_written = Arc::clone(&both.written);
        let built = InterfaceSetup::new(both_id, "bi", Direction::Both)
            .build(Box::new(both), 4)
            .expect("pair should build");

        let mut mux = Mux::default();
        mux.add(built);
        mux.add(input(2, &["$C,1"], &counter));
        let (out, written) = output(3, &counter);
        mux.add(out);

        let exits = mux.start().expect("mux should start").wait();
        assert_eq!(exits.len(), 4);

        // Sentences read by the duplicated half carry the duplicate's id.
        assert_eq!(bodies(&both_written), vec!["$C,1"]);
        let mut heard = bodies(&written);
        heard.sort();
        assert_eq!(heard, vec!["$B,1", "$B,2", "$C,1"]);
        // Two interfaces share one resource, plus two more.
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn outputs_finish_when_there_are_no_inputs() {
        let counter = Arc::new(CloseCounter::default());
        let mut mux = Mux::new(4);
        let (out, written) = output(1, &counter);
        mux.add(out);
        let exits = mux.start().expect("mux should start").wait();
        assert!(matches!(exits[0].reason, ExitReason::QueueClosed));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_output_does_not_stop_the_others() {
        let counter = Arc::new(CloseCounter::default());
        let lines: Vec<String> = (0..20).map(|n| format!("$D,{n}")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();

        let mut broken = MockTransport::new(Arc::clone(&counter));
        broken.fail_writes_after = Some(0);
        let broken = InterfaceSetup::new(InterfaceId::new(2), "broken", Direction::Out)
            .build(Box::new(broken), 1)
            .expect("output should build");

        let mut mux = Mux::new(2);
        mux.add(input(1, &refs, &counter));
        mux.add(broken);
        let (out, written) = output(3, &counter);
        mux.add(out);

        let exits = mux.start().expect("mux should start").wait();
        let broken_exit = exits
            .iter()
            .find(|e| e.id == InterfaceId::new(2))
            .expect("broken output exit");
        assert!(matches!(broken_exit.reason, ExitReason::Failed(_)));
        assert_eq!(bodies(&written), lines);
    }

    struct Endless(InterfaceId);

    impl crate::interface::Transport for Endless {
        fn kind(&self) -> &'static str {
            "endless"
        }

        fn read_sentence(&mut self) -> nmeaplex_frame::Result<Option<SentenceBlock>> {
            SentenceBlock::from_body(b"$E,1", self.0).map(Some)
        }

        fn write_sentence(&mut self, _sentence: &SentenceBlock) -> nmeaplex_frame::Result<()> {
            Ok(())
        }

        fn duplicate(&mut self, _id: InterfaceId) -> std::io::Result<Box<dyn crate::interface::Transport>> {
            Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
        }
    }

    #[test]
    fn stop_ends_inputs_that_never_finish() {
        let counter = Arc::new(CloseCounter::default());
        let id = InterfaceId::new(1);
        let endless = InterfaceSetup::new(id, "endless", Direction::In)
            .build(Box::new(Endless(id)), 1)
            .expect("input should build");

        let mut mux = Mux::new(4);
        mux.add(endless);
        let (out, written) = output(2, &counter);
        mux.add(out);

        let running = mux.start().expect("mux should start");
        assert_eq!(running.workers(), 2);
        std::thread::sleep(std::time::Duration::from_millis(50));
        running.stop();
        let exits = running.wait();

        let input_exit = exits.iter().find(|e| e.id == id).expect("input exit");
        assert!(matches!(input_exit.reason, ExitReason::QueueClosed));
        assert!(!written.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_central_qsize_fails_start() {
        assert!(matches!(
            Mux::new(0).start(),
            Err(InterfaceError::Queue(_))
        ));
    }
}
