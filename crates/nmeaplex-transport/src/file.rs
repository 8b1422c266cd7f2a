//! Line-oriented file and stdio transport.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

use nmeaplex_core::{
    parse_qsize, Built, ConfigError, Direction, InterfaceSetup, Options, Transport,
};
use nmeaplex_frame::{FrameError, InterfaceId, LineReader, SentenceBlock, SentenceWriter};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Default queue size for file outputs.
pub const DEFAULT_FILE_QSIZE: usize = 128;

/// Where a file interface reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTarget {
    /// Standard input for readers, standard output for writers.
    Stdio,
    Path(PathBuf),
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTarget::Stdio => f.write_str("-"),
            FileTarget::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Parsed file interface options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub target: FileTarget,
    pub qsize: usize,
}

impl FileConfig {
    /// Build a config from `filename` and `qsize` options.
    pub fn from_options(options: Options, direction: Direction) -> Result<Self> {
        let mut filename = None;
        let mut qsize = DEFAULT_FILE_QSIZE;

        for kv in options {
            if kv.is("filename") {
                filename = Some(kv.value);
            } else if kv.is("qsize") {
                qsize = parse_qsize(&kv.value)?;
            } else {
                return Err(ConfigError::UnknownOption(kv.name).into());
            }
        }

        let filename = filename.ok_or(ConfigError::MissingOption {
            option: "filename",
            kind: "file",
        })?;
        let target = if filename == "-" {
            FileTarget::Stdio
        } else {
            FileTarget::Path(PathBuf::from(filename))
        };

        if direction == Direction::Both {
            if let FileTarget::Path(path) = &target {
                return Err(TransportError::BidirectionalFile(path.clone()));
            }
        }

        Ok(Self { target, qsize })
    }
}

enum Stream {
    Reader(LineReader<BufReader<Box<dyn Read + Send>>>),
    Writer(SentenceWriter<Box<dyn Write + Send>>),
}

/// A file, pipe or stdio stream carrying one sentence per line.
///
/// Each instance serves one direction. A bidirectional stdio interface is
/// split into a stdout writer and a stdin reader by [`Transport::duplicate`].
pub struct FileTransport {
    target: FileTarget,
    stream: Stream,
}

impl FileTransport {
    /// Open `config.target` for `direction`.
    ///
    /// Regular files are opened read-only for input and truncated for output.
    pub fn open(config: &FileConfig, id: InterfaceId, direction: Direction) -> Result<Self> {
        let stream = match (&config.target, direction) {
            (FileTarget::Stdio, Direction::In) => reader(Box::new(io::stdin()), id),
            (FileTarget::Stdio, _) => Stream::Writer(SentenceWriter::new(Box::new(io::stdout()))),
            (FileTarget::Path(path), Direction::In) => {
                let file = File::open(path).map_err(|source| TransportError::Open {
                    path: path.clone(),
                    source,
                })?;
                reader(Box::new(file), id)
            }
            (FileTarget::Path(path), Direction::Out) => {
                let file = File::create(path).map_err(|source| TransportError::Open {
                    path: path.clone(),
                    source,
                })?;
                Stream::Writer(SentenceWriter::new(Box::new(file)))
            }
            (FileTarget::Path(path), Direction::Both) => {
                return Err(TransportError::BidirectionalFile(path.clone()));
            }
        };

        Ok(Self {
            target: config.target.clone(),
            stream,
        })
    }

    /// Wrap an arbitrary byte stream as an input.
    pub fn from_reader(inner: impl Read + Send + 'static, id: InterfaceId) -> Self {
        Self {
            target: FileTarget::Stdio,
            stream: reader(Box::new(inner), id),
        }
    }

    /// Wrap an arbitrary byte sink as an output.
    pub fn from_writer(inner: impl Write + Send + 'static) -> Self {
        Self {
            target: FileTarget::Stdio,
            stream: Stream::Writer(SentenceWriter::new(Box::new(inner))),
        }
    }

    pub fn target(&self) -> &FileTarget {
        &self.target
    }
}

fn reader(inner: Box<dyn Read + Send>, id: InterfaceId) -> Stream {
    Stream::Reader(LineReader::new(BufReader::new(inner), id))
}

fn wrong_direction(what: &str) -> FrameError {
    FrameError::Io(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("file interface not opened for {what}"),
    ))
}

impl Transport for FileTransport {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn read_sentence(&mut self) -> nmeaplex_frame::Result<Option<SentenceBlock>> {
        match &mut self.stream {
            Stream::Reader(reader) => reader.read_sentence(),
            Stream::Writer(_) => Err(wrong_direction("reading")),
        }
    }

    fn write_sentence(&mut self, sentence: &SentenceBlock) -> nmeaplex_frame::Result<()> {
        match &mut self.stream {
            Stream::Writer(writer) => writer.write_sentence(sentence),
            Stream::Reader(_) => Err(wrong_direction("writing")),
        }
    }

    fn duplicate(&mut self, id: InterfaceId) -> io::Result<Box<dyn Transport>> {
        if self.target != FileTarget::Stdio {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "only stdio can be duplicated",
            ));
        }
        Ok(Box::new(FileTransport {
            target: FileTarget::Stdio,
            stream: reader(Box::new(io::stdin()), id),
        }))
    }

    fn cleanup(&mut self, direction: Direction) {
        if let Stream::Writer(writer) = &mut self.stream {
            if let Err(err) = writer.flush() {
                warn!(target_file = %self.target, direction = %direction, error = %err, "flush on cleanup failed");
            }
        }
    }
}

impl fmt::Debug for FileTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stream = match self.stream {
            Stream::Reader(_) => "reader",
            Stream::Writer(_) => "writer",
        };
        f.debug_struct("FileTransport")
            .field("target", &self.target)
            .field("stream", &stream)
            .finish()
    }
}

/// Parse options, open the file and build the interface.
pub fn open(mut setup: InterfaceSetup) -> Result<Built> {
    let config = FileConfig::from_options(setup.take_options(), setup.direction)?;
    let transport = FileTransport::open(&config, setup.id, setup.direction)?;
    debug!(
        interface = %setup.id,
        target_file = %config.target,
        qsize = config.qsize,
        "file transport opened"
    );
    Ok(setup.build(Box::new(transport), config.qsize)?)
}
