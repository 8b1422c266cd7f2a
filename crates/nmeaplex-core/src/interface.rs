use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nmeaplex_frame::{FrameError, InterfaceId, SentenceBlock};
use tracing::{debug, info, trace, warn};

use crate::error::{ConfigError, InterfaceError, Result};
use crate::filter::{passes, FilterHandle, NmeaChecksum};
use crate::options::Options;
use crate::queue::BoundedQueue;

/// Data direction of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    /// Whether this direction produces sentences.
    pub fn reads(self) -> bool {
        self != Direction::Out
    }

    /// Whether this direction consumes sentences.
    pub fn writes(self) -> bool {
        self != Direction::In
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "both" => Ok(Direction::Both),
            _ => Err(ConfigError::InvalidDirection(s.to_string())),
        }
    }
}

/// Capabilities a transport provides to the generic interface driver.
///
/// A transport owns its resources (file handles, sockets). Resources that
/// the two halves of a duplicated interface share must be held behind a
/// shared handle so they are released exactly once, when the last half
/// drops them.
pub trait Transport: Send {
    /// Short transport name for diagnostics.
    fn kind(&self) -> &'static str;

    /// Frame the next sentence from the transport (blocking).
    ///
    /// `Ok(None)` is end of stream.
    fn read_sentence(&mut self) -> nmeaplex_frame::Result<Option<SentenceBlock>>;

    /// Transmit one sentence (blocking).
    fn write_sentence(&mut self, sentence: &SentenceBlock) -> nmeaplex_frame::Result<()>;

    /// Create the input-half transport for a bidirectional interface.
    ///
    /// `self` keeps serving the output half. `id` is the identity of the new
    /// half.
    fn duplicate(&mut self, id: InterfaceId) -> std::io::Result<Box<dyn Transport>>;

    /// Release per-direction state before the transport is dropped.
    ///
    /// Failures here are logged by the transport, never returned.
    fn cleanup(&mut self, _direction: Direction) {}
}

/// Everything an orchestrator supplies to construct an interface.
#[derive(Clone)]
pub struct InterfaceSetup {
    pub id: InterfaceId,
    pub name: String,
    pub direction: Direction,
    pub options: Options,
    pub checksum: Option<FilterHandle>,
    pub input_filter: Option<FilterHandle>,
    pub output_filter: Option<FilterHandle>,
}

impl InterfaceSetup {
    pub fn new(id: InterfaceId, name: impl Into<String>, direction: Direction) -> Self {
        Self {
            id,
            name: name.into(),
            direction,
            options: Options::new(),
            checksum: None,
            input_filter: None,
            output_filter: None,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Enable or disable NMEA checksum validation on input.
    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled.then(|| Arc::new(NmeaChecksum) as FilterHandle);
        self
    }

    /// Use a custom checksum predicate on input.
    pub fn with_checksum_check(mut self, check: FilterHandle) -> Self {
        self.checksum = Some(check);
        self
    }

    pub fn with_input_filter(mut self, filter: FilterHandle) -> Self {
        self.input_filter = Some(filter);
        self
    }

    pub fn with_output_filter(mut self, filter: FilterHandle) -> Self {
        self.output_filter = Some(filter);
        self
    }

    /// Hand the option list to the transport, leaving it empty here.
    pub fn take_options(&mut self) -> Options {
        std::mem::take(&mut self.options)
    }

    /// Finish construction around a ready transport.
    ///
    /// Allocates a queue of `qsize` sentences for writing directions and
    /// splits a bidirectional interface into its two halves.
    pub fn build(self, transport: Box<dyn Transport>, qsize: usize) -> Result<Built> {
        let queue = if self.direction.writes() {
            Some(Arc::new(BoundedQueue::new(qsize)?))
        } else {
            None
        };

        let interface = Interface {
            id: self.id,
            name: self.name,
            direction: self.direction,
            queue,
            transport,
            pair: None,
            checksum: self.checksum,
            input_filter: self.input_filter,
            output_filter: self.output_filter,
        };

        info!(
            interface = %interface.id,
            name = %interface.name,
            kind = interface.transport.kind(),
            direction = %interface.direction,
            "interface configured"
        );

        if interface.direction == Direction::Both {
            let (output, input) = interface.duplicate()?;
            Ok(Built::Pair { output, input })
        } else {
            Ok(Built::Single(interface))
        }
    }
}

impl fmt::Debug for InterfaceSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceSetup")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("options", &self.options)
            .field("checksum", &self.checksum.is_some())
            .field("input_filter", &self.input_filter.is_some())
            .field("output_filter", &self.output_filter.is_some())
            .finish()
    }
}

/// Result of constructing an interface.
#[derive(Debug)]
pub enum Built {
    /// A unidirectional interface.
    Single(Interface),
    /// The two halves of a bidirectional interface.
    Pair { output: Interface, input: Interface },
}

impl Built {
    /// Flatten into the runnable interfaces.
    pub fn into_interfaces(self) -> Vec<Interface> {
        match self {
            Built::Single(interface) => vec![interface],
            Built::Pair { output, input } => vec![output, input],
        }
    }
}

/// Why an interface stopped.
#[derive(Debug)]
pub enum ExitReason {
    /// The transport reported end of stream.
    EndOfStream,
    /// The queue it reads from or writes to was closed.
    QueueClosed,
    /// A transport read or write failed.
    Failed(FrameError),
    /// The interface cannot run as configured.
    Unrunnable(&'static str),
    /// The worker thread panicked.
    Panicked,
}

/// Summary returned when an interface finishes.
#[derive(Debug)]
pub struct InterfaceExit {
    pub id: InterfaceId,
    pub name: String,
    pub direction: Direction,
    pub sentences: u64,
    pub dropped: u64,
    pub reason: ExitReason,
}

/// One transport endpoint in a single direction.
pub struct Interface {
    id: InterfaceId,
    name: String,
    direction: Direction,
    queue: Option<Arc<BoundedQueue>>,
    transport: Box<dyn Transport>,
    pair: Option<InterfaceId>,
    checksum: Option<FilterHandle>,
    input_filter: Option<FilterHandle>,
    output_filter: Option<FilterHandle>,
}

impl Interface {
    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sibling created by duplication, if any.
    pub fn pair(&self) -> Option<InterfaceId> {
        self.pair
    }

    /// Queue this interface writes from.
    pub fn queue(&self) -> Option<&Arc<BoundedQueue>> {
        self.queue.as_ref()
    }

    pub fn kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Split a bidirectional interface.
    ///
    /// Returns `(output, input)`: this interface becomes the output half and
    /// keeps the queue; the transport's duplicate becomes the input half.
    pub fn duplicate(mut self) -> Result<(Interface, Interface)> {
        let dup_id = self.id.duplicate();
        let transport = self
            .transport
            .duplicate(dup_id)
            .map_err(|source| InterfaceError::Duplicate {
                id: self.id,
                source,
            })?;

        let input = Interface {
            id: dup_id,
            name: self.name.clone(),
            direction: Direction::In,
            queue: None,
            transport,
            pair: Some(self.id),
            checksum: self.checksum.clone(),
            input_filter: self.input_filter.clone(),
            output_filter: self.output_filter.clone(),
        };

        self.direction = Direction::Out;
        self.pair = Some(dup_id);
        debug!(output = %self.id, input = %input.id, "interface duplicated");
        Ok((self, input))
    }

    /// Run until the transport or queue ends, then tear down.
    ///
    /// Input interfaces push onto `sink`; output interfaces drain their own
    /// queue.
    pub fn run(self, sink: Option<Arc<BoundedQueue>>) -> InterfaceExit {
        match (self.direction, sink) {
            (Direction::In, Some(sink)) => self.run_input(&sink),
            (Direction::In, None) => self.finish(0, 0, ExitReason::Unrunnable("no input sink")),
            (Direction::Out, _) => self.run_output(),
            (Direction::Both, _) => {
                self.finish(0, 0, ExitReason::Unrunnable("bidirectional interface not split"))
            }
        }
    }

    fn run_input(mut self, sink: &BoundedQueue) -> InterfaceExit {
        info!(interface = %self.id, name = %self.name, "reader started");
        let mut sentences = 0u64;
        let mut dropped = 0u64;

        let reason = loop {
            let sentence = match self.transport.read_sentence() {
                Ok(Some(sentence)) => sentence,
                Ok(None) => break ExitReason::EndOfStream,
                Err(err) => {
                    warn!(interface = %self.id, error = %err, "read failed");
                    break ExitReason::Failed(err);
                }
            };

            if !passes(self.checksum.as_ref(), &sentence) {
                dropped += 1;
                trace!(interface = %self.id, len = sentence.len(), "checksum mismatch (dropping)");
                continue;
            }
            if !passes(self.input_filter.as_ref(), &sentence) {
                dropped += 1;
                trace!(interface = %self.id, len = sentence.len(), "rejected by input filter");
                continue;
            }
            if sink.push(sentence).is_err() {
                break ExitReason::QueueClosed;
            }
            sentences += 1;
        };

        self.finish(sentences, dropped, reason)
    }

    fn run_output(mut self) -> InterfaceExit {
        let Some(queue) = self.queue.clone() else {
            return self.finish(0, 0, ExitReason::Unrunnable("output interface has no queue"));
        };
        info!(interface = %self.id, name = %self.name, "writer started");
        let mut sentences = 0u64;
        let mut dropped = 0u64;

        let reason = loop {
            let Some(sentence) = queue.pop() else {
                break ExitReason::QueueClosed;
            };
            if !passes(self.output_filter.as_ref(), &sentence) {
                dropped += 1;
                trace!(interface = %self.id, len = sentence.len(), "rejected by output filter");
                continue;
            }
            if let Err(err) = self.transport.write_sentence(&sentence) {
                warn!(interface = %self.id, error = %err, "write failed");
                break ExitReason::Failed(err);
            }
            sentences += 1;
        };

        self.finish(sentences, dropped, reason)
    }

    // Generic teardown; the transport itself is released when `self` drops.
    fn finish(mut self, sentences: u64, dropped: u64, reason: ExitReason) -> InterfaceExit {
        self.transport.cleanup(self.direction);
        if let Some(queue) = &self.queue {
            queue.close();
        }
        info!(
            interface = %self.id,
            name = %self.name,
            direction = %self.direction,
            sentences,
            dropped,
            reason = ?reason,
            "interface stopped"
        );
        InterfaceExit {
            id: self.id,
            name: std::mem::take(&mut self.name),
            direction: self.direction,
            sentences,
            dropped,
            reason,
        }
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.transport.kind())
            .field("direction", &self.direction)
            .field("pair", &self.pair)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    use super::*;

    /// Counts how many times the shared resource was released.
    #[derive(Default)]
    pub(crate) struct CloseCounter(pub AtomicUsize);

    pub(crate) struct SharedResource(pub Arc<CloseCounter>);

    impl Drop for SharedResource {
        fn drop(&mut self) {
            self.0 .0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// In-memory transport: reads from a script, records writes.
    pub(crate) struct MockTransport {
        pub input: VecDeque<nmeaplex_frame::Result<SentenceBlock>>,
        pub written: Arc<Mutex<Vec<SentenceBlock>>>,
        pub cleanups: Arc<Mutex<Vec<Direction>>>,
        pub resource: Arc<SharedResource>,
        pub fail_duplicate: bool,
        pub fail_writes_after: Option<usize>,
    }

    impl MockTransport {
        pub(crate) fn new(counter: Arc<CloseCounter>) -> Self {
            Self {
                input: VecDeque::new(),
                written: Arc::default(),
                cleanups: Arc::default(),
                resource: Arc::new(SharedResource(counter)),
                fail_duplicate: false,
                fail_writes_after: None,
            }
        }

        pub(crate) fn with_lines(mut self, id: InterfaceId, lines: &[&str]) -> Self {
            for line in lines {
                self.input
                    .push_back(SentenceBlock::from_body(line.as_bytes(), id));
            }
            self
        }
    }

    impl Transport for MockTransport {
        fn kind(&self) -> &'static str {
            "mock"
        }

        fn read_sentence(&mut self) -> nmeaplex_frame::Result<Option<SentenceBlock>> {
            self.input.pop_front().transpose()
        }

        fn write_sentence(&mut self, sentence: &SentenceBlock) -> nmeaplex_frame::Result<()> {
            let mut written = self.written.lock().unwrap();
            if self.fail_writes_after == Some(written.len()) {
                return Err(FrameError::Io(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )));
            }
            written.push(sentence.clone());
            Ok(())
        }

        fn duplicate(&mut self, id: InterfaceId) -> std::io::Result<Box<dyn Transport>> {
            if self.fail_duplicate {
                return Err(std::io::Error::from(std::io::ErrorKind::OutOfMemory));
            }
            // Readers tag sentences with their own id.
            let input = std::mem::take(&mut self.input)
                .into_iter()
                .map(|r| r.map(|s| s.with_source(id)))
                .collect();
            Ok(Box::new(MockTransport {
                input,
                written: Arc::clone(&self.written),
                cleanups: Arc::clone(&self.cleanups),
                resource: Arc::clone(&self.resource),
                fail_duplicate: false,
                fail_writes_after: None,
            }))
        }

        fn cleanup(&mut self, direction: Direction) {
            self.cleanups.lock().unwrap().push(direction);
        }
    }

    fn sentence(body: &str, id: InterfaceId) -> SentenceBlock {
        SentenceBlock::from_body(body.as_bytes(), id).unwrap()
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("IN".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(ConfigError::InvalidDirection(_))
        ));
        assert!(Direction::Both.reads() && Direction::Both.writes());
        assert!(!Direction::In.writes());
    }

    #[test]
    fn build_allocates_queue_only_for_writers() {
        let counter = Arc::new(CloseCounter::default());
        let input = InterfaceSetup::new(InterfaceId::new(1), "in", Direction::In)
            .build(Box::new(MockTransport::new(Arc::clone(&counter))), 4)
            .unwrap();
        let Built::Single(input) = input else {
            panic!("expected single interface");
        };
        assert!(input.queue().is_none());

        let output = InterfaceSetup::new(InterfaceId::new(2), "out", Direction::Out)
            .build(Box::new(MockTransport::new(counter)), 4)
            .unwrap();
        let Built::Single(output) = output else {
            panic!("expected single interface");
        };
        assert_eq!(output.queue().unwrap().capacity(), 4);
    }

    #[test]
    fn zero_qsize_fails_build() {
        let counter = Arc::new(CloseCounter::default());
        let err = InterfaceSetup::new(InterfaceId::new(1), "out", Direction::Out)
            .build(Box::new(MockTransport::new(counter)), 0)
            .unwrap_err();
        assert!(matches!(err, InterfaceError::Queue(_)));
    }

    #[test]
    fn built_debug_names_its_halves() {
        let counter = Arc::new(CloseCounter::default());
        let built = InterfaceSetup::new(InterfaceId::new(3), "bi", Direction::Both)
            .build(Box::new(MockTransport::new(counter)), 2)
            .unwrap();
        let debug = format!("{built:?}");
        assert!(debug.starts_with("Pair"), "{debug}");
        assert!(debug.contains("direction: Out"), "{debug}");
        assert!(debug.contains("direction: In"), "{debug}");
    }

    #[test]
    fn both_yields_linked_in_and_out() {
        let counter = Arc::new(CloseCounter::default());
        let built = InterfaceSetup::new(InterfaceId::new(5), "bi", Direction::Both)
            .build(Box::new(MockTransport::new(counter)), 8)
            .unwrap();
        let Built::Pair { output, input } = built else {
            panic!("expected a pair");
        };
        assert_eq!(output.direction(), Direction::Out);
        assert_eq!(input.direction(), Direction::In);
        assert_eq!(output.pair(), Some(input.id()));
        assert_eq!(input.pair(), Some(output.id()));
        assert_eq!(input.id(), InterfaceId::new(5).duplicate());
        assert!(output.queue().is_some());
        assert!(input.queue().is_none());
    }

    #[test]
    fn failed_duplication_fails_build() {
        let counter = Arc::new(CloseCounter::default());
        let mut transport = MockTransport::new(Arc::clone(&counter));
        transport.fail_duplicate = true;
        let result = InterfaceSetup::new(InterfaceId::new(5), "bi", Direction::Both)
            .build(Box::new(transport), 8);
        assert!(matches!(result, Err(InterfaceError::Duplicate { .. })));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shared_resource_released_once_under_any_interleaving() {
        for round in 0..50 {
            let counter = Arc::new(CloseCounter::default());
            let built = InterfaceSetup::new(InterfaceId::new(1), "bi", Direction::Both)
                .build(Box::new(MockTransport::new(Arc::clone(&counter))), 2)
                .unwrap();
            let Built::Pair { output, input } = built else {
                panic!("expected a pair");
            };
            let out_queue = Arc::clone(output.queue().unwrap());
            let sink = Arc::new(BoundedQueue::new(4).unwrap());

            let (first, second) = if round % 2 == 0 {
                (output, input)
            } else {
                (input, output)
            };
            let t1 = {
                let sink = Arc::clone(&sink);
                thread::spawn(move || first.run(Some(sink)))
            };
            let t2 = {
                let sink = Arc::clone(&sink);
                thread::spawn(move || second.run(Some(sink)))
            };
            out_queue.close();
            t1.join().unwrap();
            t2.join().unwrap();

            assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn input_drops_bad_checksums_and_filtered_sentences() {
        let id = InterfaceId::new(3);
        let counter = Arc::new(CloseCounter::default());
        let transport = MockTransport::new(counter).with_lines(
            id,
            &["$GPRMC,1*56", "$GPRMC,1*00", "$GPGGA,1*4B", "$GPRMC,1*56"],
        );
        let only_rmc: FilterHandle =
            Arc::new(|s: &SentenceBlock| s.body().get(3..6) == Some(b"RMC".as_slice()));
        let built = InterfaceSetup::new(id, "in", Direction::In)
            .with_checksum(true)
            .with_input_filter(only_rmc)
            .build(Box::new(transport), 1)
            .unwrap();
        let Built::Single(interface) = built else {
            panic!("expected single interface");
        };

        let sink = Arc::new(BoundedQueue::new(8).unwrap());
        let exit = interface.run(Some(Arc::clone(&sink)));

        assert!(matches!(exit.reason, ExitReason::EndOfStream));
        assert_eq!(exit.sentences, 2);
        assert_eq!(exit.dropped, 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.pop().unwrap(), sentence("$GPRMC,1*56", id));
    }

    #[test]
    fn read_error_ends_input_and_runs_cleanup() {
        let id = InterfaceId::new(3);
        let counter = Arc::new(CloseCounter::default());
        let mut transport = MockTransport::new(counter).with_lines(id, &["$A"]);
        transport.input.push_back(Err(FrameError::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        ))));
        let cleanups = Arc::clone(&transport.cleanups);

        let Built::Single(interface) = InterfaceSetup::new(id, "in", Direction::In)
            .build(Box::new(transport), 1)
            .unwrap()
        else {
            panic!("expected single interface");
        };
        let sink = Arc::new(BoundedQueue::new(8).unwrap());
        let exit = interface.run(Some(sink));

        assert!(matches!(exit.reason, ExitReason::Failed(_)));
        assert_eq!(exit.sentences, 1);
        assert_eq!(*cleanups.lock().unwrap(), vec![Direction::In]);
    }

    #[test]
    fn output_applies_filter_and_stops_on_write_error() {
        let id = InterfaceId::new(4);
        let counter = Arc::new(CloseCounter::default());
        let mut transport = MockTransport::new(counter);
        transport.fail_writes_after = Some(1);
        let written = Arc::clone(&transport.written);

        let no_gsv: FilterHandle =
            Arc::new(|s: &SentenceBlock| s.body().get(3..6) != Some(b"GSV".as_slice()));
        let Built::Single(interface) = InterfaceSetup::new(id, "out", Direction::Out)
            .with_output_filter(no_gsv)
            .build(Box::new(transport), 8)
            .unwrap()
        else {
            panic!("expected single interface");
        };
        let queue = Arc::clone(interface.queue().unwrap());
        let src = InterfaceId::new(9);
        queue.push(sentence("$GPGSV,1", src)).unwrap();
        queue.push(sentence("$GPRMC,1", src)).unwrap();
        queue.push(sentence("$GPRMC,2", src)).unwrap();
        queue.push(sentence("$GPRMC,3", src)).unwrap();

        let exit = interface.run(None);
        assert!(matches!(exit.reason, ExitReason::Failed(_)));
        assert_eq!(exit.sentences, 1);
        assert_eq!(exit.dropped, 1);
        assert_eq!(*written.lock().unwrap(), vec![sentence("$GPRMC,1", src)]);
        assert!(queue.is_closed(), "teardown closes the output queue");
    }

    #[test]
    fn input_without_sink_is_unrunnable() {
        let counter = Arc::new(CloseCounter::default());
        let Built::Single(interface) = InterfaceSetup::new(InterfaceId::new(1), "in", Direction::In)
            .build(Box::new(MockTransport::new(counter)), 1)
            .unwrap()
        else {
            panic!("expected single interface");
        };
        let exit = interface.run(None);
        assert!(matches!(exit.reason, ExitReason::Unrunnable(_)));
    }
}
