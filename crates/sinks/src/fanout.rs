//! Fan-out core
//!
//! Writes every record to every sink that accepts its level. The slot table
//! is fixed at construction; at most one slot is the remote slot, whose sink
//! is swapped atomically by the flush-and-rotate protocol.
//!
//! # Rotation
//!
//! ```text
//! Active(old) --flush ok--> factory.create() --ok--> Active(new)
//!      |                          |
//!      | flush error              | create error
//!      v                          v
//! Active(old, closed)          Empty (retried by the next flush_remote)
//! ```
//!
//! A write racing a rotation lands in exactly one writer. If it hits the old
//! writer after it closed, the rejection is returned to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use thiserror::Error;

use crate::common::{Sink, SinkError};
use crate::record::{Level, LogRecord};
use crate::remote::{RemoteSink, RemoteSinkFactory, RemoteWriter, WriterError};
use crate::util::RateLimitedLogger;

/// One sink's failure during a fan-out write
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: String,
    pub error: SinkError,
}

/// Some sinks failed; the others still received the record
#[derive(Debug, Error)]
#[error("{} sink(s) failed, {delivered} succeeded: {}", .failures.len(), summary(.failures))]
pub struct FanOutError {
    /// Sinks that accepted the record
    pub delivered: usize,
    pub failures: Vec<SinkFailure>,
}

fn summary(failures: &[SinkFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.sink, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors building a [`FanOut`]
#[derive(Debug, Error)]
pub enum FanOutBuildError {
    #[error("no sinks enabled")]
    NoSinks,

    #[error("only one remote sink is supported")]
    DuplicateRemote,

    #[error("failed to create remote sink: {0}")]
    Creation(#[source] SinkError),
}

/// Errors from [`FanOut::flush_remote`]
#[derive(Debug, Error)]
pub enum RotationError {
    /// Draining the current writer failed; it stays installed
    #[error("remote flush failed: {0}")]
    Flush(#[source] WriterError),

    /// Replacement could not be built; the remote slot is empty
    #[error("remote writer recreation failed: {0}")]
    Recreate(#[source] SinkError),
}

enum SlotKind {
    Fixed(Arc<dyn Sink>),
    Remote,
}

struct Slot {
    name: String,
    kind: SlotKind,
    reporter: RateLimitedLogger,
}

struct RemoteSlot {
    factory: RemoteSinkFactory,
    current: ArcSwapOption<RemoteSink>,
    rotation: tokio::sync::Mutex<()>,
}

/// Ordered set of sinks sharing one encoded record
pub struct FanOut {
    slots: Vec<Slot>,
    remote: Option<RemoteSlot>,
}

impl FanOut {
    pub fn builder() -> FanOutBuilder {
        FanOutBuilder::default()
    }

    /// Write to every sink accepting the record's level
    ///
    /// Returns the number of sinks that took the record. A failing sink does
    /// not stop delivery to the rest; its error is reported (rate limited)
    /// and collected into [`FanOutError`].
    pub fn write(&self, record: &LogRecord) -> Result<usize, FanOutError> {
        let level = record.level();
        let mut delivered = 0;
        let mut failures = Vec::new();

        for slot in &self.slots {
            let result = match &slot.kind {
                SlotKind::Fixed(sink) => {
                    if !sink.accepts(level) {
                        continue;
                    }
                    sink.write(record)
                }
                SlotKind::Remote => {
                    let Some(sink) = self.current_remote() else {
                        continue;
                    };
                    if !sink.accepts(level) {
                        continue;
                    }
                    sink.write(record)
                }
            };

            match result {
                Ok(_) => delivered += 1,
                Err(error) => {
                    slot.reporter.report(&error);
                    failures.push(SinkFailure {
                        sink: slot.name.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(delivered)
        } else {
            Err(FanOutError {
                delivered,
                failures,
            })
        }
    }

    /// Flush buffered bytes of the local sinks
    ///
    /// The remote sink is drained only by [`FanOut::flush_remote`].
    pub fn flush(&self) -> Result<(), FanOutError> {
        let mut delivered = 0;
        let mut failures = Vec::new();

        for slot in &self.slots {
            let SlotKind::Fixed(sink) = &slot.kind else {
                continue;
            };
            match sink.flush() {
                Ok(()) => delivered += 1,
                Err(error) => {
                    tracing::warn!(sink = %slot.name, error = %error, "sink flush failed");
                    failures.push(SinkFailure {
                        sink: slot.name.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanOutError {
                delivered,
                failures,
            })
        }
    }

    /// Drain the remote writer and install a fresh one
    ///
    /// No-op without a remote slot. Concurrent calls run one after another.
    ///
    /// # Errors
    ///
    /// - [`RotationError::Flush`] when the drain fails or times out; the old
    ///   writer stays installed and refuses further writes
    /// - [`RotationError::Recreate`] when no replacement can be built; the
    ///   slot stays empty until the next call succeeds
    pub async fn flush_remote(&self, deadline: Duration) -> Result<(), RotationError> {
        let Some(remote) = &self.remote else {
            return Ok(());
        };
        let _rotation = remote.rotation.lock().await;

        if let Some(current) = remote.current.load_full() {
            match current.writer().flush(deadline).await {
                Ok(()) => {}
                Err(WriterError::Closed) => {
                    // Left closed by an earlier failed flush
                    tracing::warn!("remote writer was already closed, replacing it");
                }
                Err(e) => return Err(RotationError::Flush(e)),
            }
        }

        match remote.factory.create() {
            Ok((sink, writer)) => {
                remote.current.store(Some(sink));
                tracing::info!(destination = %writer.destination(), "remote writer rotated");
                Ok(())
            }
            Err(e) => {
                remote.current.store(None);
                tracing::error!(error = %e, "failed to recreate remote writer");
                Err(RotationError::Recreate(e))
            }
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Writer currently installed in the remote slot
    pub fn remote_writer(&self) -> Option<Arc<RemoteWriter>> {
        self.current_remote().map(|sink| Arc::clone(sink.writer()))
    }

    /// Sink names in write order
    pub fn sink_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }

    /// Whether any sink would take a record at `level`
    pub fn accepts_any(&self, level: Level) -> bool {
        self.slots.iter().any(|slot| match &slot.kind {
            SlotKind::Fixed(sink) => sink.accepts(level),
            SlotKind::Remote => self
                .remote
                .as_ref()
                .is_some_and(|remote| level >= remote.factory.settings().level),
        })
    }

    fn current_remote(&self) -> Option<Arc<RemoteSink>> {
        self.remote.as_ref().and_then(|remote| remote.current.load_full())
    }
}

impl fmt::Debug for FanOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOut")
            .field("sinks", &self.sink_names())
            .field("remote_installed", &self.current_remote().is_some())
            .finish()
    }
}

/// Collects sinks in write order
#[derive(Default)]
pub struct FanOutBuilder {
    slots: Vec<PendingSlot>,
    duplicate_remote: bool,
}

enum PendingSlot {
    Fixed(Arc<dyn Sink>),
    Remote(RemoteSinkFactory),
}

impl FanOutBuilder {
    /// Add a local sink
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.slots.push(PendingSlot::Fixed(sink));
        self
    }

    /// Add the remote slot; its first writer is built by `build()`
    #[must_use]
    pub fn remote(mut self, factory: RemoteSinkFactory) -> Self {
        if self
            .slots
            .iter()
            .any(|slot| matches!(slot, PendingSlot::Remote(_)))
        {
            self.duplicate_remote = true;
        }
        self.slots.push(PendingSlot::Remote(factory));
        self
    }

    /// # Errors
    ///
    /// - [`FanOutBuildError::NoSinks`] with an empty slot list
    /// - [`FanOutBuildError::DuplicateRemote`] when `remote()` was called twice
    /// - [`FanOutBuildError::Creation`] when the first remote writer fails
    pub fn build(self) -> Result<FanOut, FanOutBuildError> {
        if self.slots.is_empty() {
            return Err(FanOutBuildError::NoSinks);
        }
        if self.duplicate_remote {
            return Err(FanOutBuildError::DuplicateRemote);
        }

        let mut slots = Vec::with_capacity(self.slots.len());
        let mut remote = None;

        for pending in self.slots {
            match pending {
                PendingSlot::Fixed(sink) => {
                    let name = sink.name().to_string();
                    slots.push(Slot {
                        reporter: RateLimitedLogger::for_sink(name.clone()),
                        name,
                        kind: SlotKind::Fixed(sink),
                    });
                }
                PendingSlot::Remote(factory) => {
                    let (sink, writer) = factory.create().map_err(FanOutBuildError::Creation)?;
                    tracing::info!(destination = %writer.destination(), "remote sink ready");
                    remote = Some(RemoteSlot {
                        factory,
                        current: ArcSwapOption::from(Some(sink)),
                        rotation: tokio::sync::Mutex::new(()),
                    });
                    slots.push(Slot {
                        name: "remote".to_string(),
                        kind: SlotKind::Remote,
                        reporter: RateLimitedLogger::for_sink("remote"),
                    });
                }
            }
        }

        Ok(FanOut { slots, remote })
    }
}

#[cfg(test)]
#[path = "fanout_test.rs"]
mod fanout_test;
