//! Refcounted output writers and the collectors feeding them
//!
//! Every output destination a script writes to (pipe to the next stage, a
//! redirect file, a host buffer, the process's own stdout/stderr) is one
//! record in [`IoArena`], addressed by a generational [`WriterId`]. Stages
//! `retain` a writer for as long as they may write to it and `release` it when
//! they retire; the sink is closed when the count reaches zero and its queue
//! has drained.
//!
//! Writes never block. Pipe writes are queued and flushed in chunks of at
//! most `PIPE_BUF` bytes whenever poll(2) reports the pipe writable; every
//! other sink accepts data immediately.

mod poll;
mod slab;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::process::Stdio;
use std::time::Duration;

use crate::error::ExecError;
use crate::host::HostBuffer;
use poll::PollSet;
use slab::{Key, Slab};

const PIPE_BUF: usize = libc::PIPE_BUF;
const READ_CHUNK: usize = 64 * 1024;

/// One of the shell process's own output streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdout,
    Stderr,
}

impl StdStream {
    fn write_all(self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()
            }
            Self::Stderr => io::stderr().lock().write_all(bytes),
        }
    }

    fn stdio(self) -> Stdio {
        match self {
            Self::Stdout => Stdio::from(io::stdout()),
            Self::Stderr => Stdio::from(io::stderr()),
        }
    }
}

/// Where a writer's bytes end up
#[derive(Debug)]
pub enum Sink {
    /// Write end of a pipe to another stage
    Pipe(PipeWriter),
    File(File),
    /// Host buffer, optionally mirrored to a process stream
    Buffer { buffer: HostBuffer, echo: Option<StdStream> },
    Inherit(StdStream),
}

/// Arena invariant violations. These abort the run.
#[derive(thiserror::Error, Debug)]
pub enum IoFault {
    #[error("husk: stale writer handle {0:?}")]
    Stale(WriterId),

    #[error("husk: writer {0:?} released more often than it was acquired")]
    OverRelease(WriterId),

    #[error("husk: write to writer {0:?} after its last reference was released")]
    WriteAfterRelease(WriterId),

    #[error("husk: file sink of writer {0:?} would block")]
    WouldBlock(WriterId),

    #[error("husk: poll failed: {0}")]
    Poll(io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriterId(Key);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectorId(Key);

/// Completion marker for one write: done once the writer has flushed
/// everything up to and including that write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    writer: WriterId,
    mark: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Pending,
    Done,
    /// The reader went away before the bytes were delivered
    Broken,
}

struct Chunk {
    bytes: Vec<u8>,
    offset: usize,
}

struct Writer {
    sink: Sink,
    queue: VecDeque<Chunk>,
    refs: usize,
    dead: bool,
    enqueued: u64,
    flushed: u64,
}

impl Writer {
    fn pipe_fd(&self) -> Option<RawFd> {
        match &self.sink {
            Sink::Pipe(pipe) if !self.dead && !self.queue.is_empty() => Some(pipe.as_raw_fd()),
            _ => None,
        }
    }

    fn closable(&self) -> bool {
        self.refs == 0 && (self.queue.is_empty() || self.dead)
    }

    fn kill(&mut self, err: &io::Error) {
        if err.kind() != io::ErrorKind::BrokenPipe {
            tracing::warn!(error = %err, "writer failed");
        }
        self.dead = true;
        self.queue.clear();
    }

    /// Queue bytes for a pipe, or hand them straight to any other sink
    fn accept(&mut self, bytes: &[u8]) -> Result<(), io::ErrorKind> {
        let result = match &mut self.sink {
            Sink::Pipe(_) => {
                self.queue.push_back(Chunk {
                    bytes: bytes.to_vec(),
                    offset: 0,
                });
                self.flush();
                return Ok(());
            }
            Sink::File(file) => file.write_all(bytes),
            Sink::Buffer { buffer, echo } => {
                buffer.append(bytes);
                if let Some(stream) = echo {
                    // The buffer is the primary destination
                    let _ = stream.write_all(bytes);
                }
                Ok(())
            }
            Sink::Inherit(stream) => stream.write_all(bytes),
        };
        match result {
            Ok(()) => {
                self.flushed += bytes.len() as u64;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(io::ErrorKind::WouldBlock),
            Err(err) => {
                self.kill(&err);
                Ok(())
            }
        }
    }

    /// Push queued chunks into the pipe while it accepts them
    fn flush(&mut self) {
        let Sink::Pipe(pipe) = &mut self.sink else {
            return;
        };
        while let Some(chunk) = self.queue.front_mut() {
            if !poll::writable_now(pipe.as_raw_fd()) {
                return;
            }
            let end = chunk.bytes.len().min(chunk.offset + PIPE_BUF);
            match pipe.write(&chunk.bytes[chunk.offset..end]) {
                Ok(n) => {
                    chunk.offset += n;
                    self.flushed += n as u64;
                    if chunk.offset == chunk.bytes.len() {
                        self.queue.pop_front();
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    self.kill(&err);
                    return;
                }
            }
        }
    }
}

/// Reads an external process's output pipe into a writer
struct Collector {
    reader: PipeReader,
    target: WriterId,
}

/// All writers and collectors of one script run
pub struct IoArena {
    writers: Slab<Writer>,
    collectors: Slab<Collector>,
}

impl Default for IoArena {
    fn default() -> Self {
        Self::new()
    }
}

impl IoArena {
    #[must_use]
    pub fn new() -> Self {
        Self {
            writers: Slab::new(),
            collectors: Slab::new(),
        }
    }

    /// New writer with one reference
    pub fn acquire(&mut self, sink: Sink) -> WriterId {
        let id = WriterId(self.writers.insert(Writer {
            sink,
            queue: VecDeque::new(),
            refs: 1,
            dead: false,
            enqueued: 0,
            flushed: 0,
        }));
        tracing::trace!(writer = ?id, "writer acquired");
        id
    }

    fn writer(&self, id: WriterId) -> Result<&Writer, IoFault> {
        self.writers.get(id.0).ok_or(IoFault::Stale(id))
    }

    fn writer_mut(&mut self, id: WriterId) -> Result<&mut Writer, IoFault> {
        self.writers.get_mut(id.0).ok_or(IoFault::Stale(id))
    }

    /// Add a reference.
    ///
    /// # Errors
    ///
    /// [`IoFault`] for a stale handle or one whose last reference is gone.
    pub fn retain(&mut self, id: WriterId) -> Result<WriterId, IoFault> {
        let writer = self.writer_mut(id)?;
        if writer.refs == 0 {
            return Err(IoFault::WriteAfterRelease(id));
        }
        writer.refs += 1;
        Ok(id)
    }

    /// Drop a reference. The sink closes once nothing refers to it and its
    /// queue is empty (or it is dead).
    ///
    /// # Errors
    ///
    /// [`IoFault`] for a stale handle or a release without matching acquire.
    pub fn release(&mut self, id: WriterId) -> Result<(), IoFault> {
        let writer = self.writer_mut(id)?;
        if writer.refs == 0 {
            return Err(IoFault::OverRelease(id));
        }
        writer.refs -= 1;
        tracing::trace!(writer = ?id, refs = writer.refs, "writer released");
        if writer.closable() {
            self.writers.remove(id.0);
        }
        Ok(())
    }

    /// Queue `bytes` and flush what the sink takes now.
    ///
    /// # Errors
    ///
    /// [`IoFault`] for a stale or released handle, or a file sink that would
    /// block.
    pub fn write(&mut self, id: WriterId, bytes: &[u8]) -> Result<Ticket, IoFault> {
        let writer = self.writer_mut(id)?;
        if writer.refs == 0 {
            return Err(IoFault::WriteAfterRelease(id));
        }
        if writer.dead || bytes.is_empty() {
            return Ok(Ticket {
                writer: id,
                mark: writer.enqueued,
            });
        }

        writer.enqueued += bytes.len() as u64;
        let mark = writer.enqueued;
        if writer.accept(bytes).is_err() {
            return Err(IoFault::WouldBlock(id));
        }
        Ok(Ticket { writer: id, mark })
    }

    #[must_use]
    pub fn ticket_state(&self, ticket: Ticket) -> TicketState {
        match self.writers.get(ticket.writer.0) {
            None => TicketState::Done,
            Some(writer) if writer.dead && writer.flushed < ticket.mark => TicketState::Broken,
            Some(writer) if writer.flushed >= ticket.mark => TicketState::Done,
            Some(_) => TicketState::Pending,
        }
    }

    /// Whether the writer's reader has gone away
    #[must_use]
    pub fn is_dead(&self, id: WriterId) -> bool {
        self.writers.get(id.0).is_some_and(|writer| writer.dead)
    }

    /// Number of open writers
    #[must_use]
    pub fn live_writers(&self) -> usize {
        self.writers.len()
    }

    /// The stdio a child process should get for this writer. Buffer sinks get
    /// a pipe whose read end is collected back into the writer.
    ///
    /// # Errors
    ///
    /// [`IoFault`] for a stale handle; an OS error when duplicating the fd
    /// or creating the pipe fails.
    pub fn child_stdio(&mut self, id: WriterId) -> Result<(Stdio, Option<CollectorId>), ExecError> {
        let writer = self.writer(id)?;
        let stdio = match &writer.sink {
            Sink::Pipe(pipe) => Stdio::from(pipe.try_clone()?),
            Sink::File(file) => Stdio::from(file.try_clone()?),
            Sink::Inherit(stream) => stream.stdio(),
            Sink::Buffer { .. } => {
                let (reader, pipe) = io::pipe()?;
                let target = self.retain(id)?;
                let collector = CollectorId(self.collectors.insert(Collector { reader, target }));
                return Ok((Stdio::from(pipe), Some(collector)));
            }
        };
        Ok((stdio, None))
    }

    /// Whether a collector has seen end of file
    #[must_use]
    pub fn collector_done(&self, id: CollectorId) -> bool {
        self.collectors.get(id.0).is_none()
    }

    /// Flush writers and drain collectors, waiting up to `timeout` for any
    /// of their fds to become ready first.
    ///
    /// # Errors
    ///
    /// [`IoFault`] when poll fails or a collector's target is stale.
    pub fn service(&mut self, timeout: Duration) -> Result<(), IoFault> {
        let writer_keys = self.writers.keys();
        let collector_keys = self.collectors.keys();

        let mut set = PollSet::new();
        for &key in &writer_keys {
            if let Some(fd) = self.writers.get(key).and_then(Writer::pipe_fd) {
                set.watch_write(fd);
            }
        }
        for &key in &collector_keys {
            if let Some(collector) = self.collectors.get(key) {
                set.watch_read(collector.reader.as_raw_fd());
            }
        }
        set.wait(timeout).map_err(IoFault::Poll)?;

        for key in collector_keys {
            let ready = self
                .collectors
                .get(key)
                .is_some_and(|collector| set.ready(collector.reader.as_raw_fd()));
            if ready {
                self.collect(CollectorId(key))?;
            }
        }
        for key in writer_keys {
            let Some(writer) = self.writers.get_mut(key) else {
                continue;
            };
            writer.flush();
            if writer.closable() {
                self.writers.remove(key);
            }
        }
        Ok(())
    }

    fn collect(&mut self, id: CollectorId) -> Result<(), IoFault> {
        let Some(collector) = self.collectors.get_mut(id.0) else {
            return Ok(());
        };
        let target = collector.target;
        let mut buf = vec![0; READ_CHUNK];
        match collector.reader.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                self.write(target, &buf[..n])?;
                return Ok(());
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {
                return Ok(());
            }
            Err(err) => tracing::warn!(error = %err, "collector read failed"),
        }
        self.collectors.remove(id.0);
        self.release(target)
    }
}
