//! Pull-driven streaming rewriter.
//!
//! The rewriter owns the upstream body and a FIFO of work items. Each pull
//! processes items until one of them produces bytes, so output is emitted as
//! soon as it is known and never buffered past the current chunk plus a
//! bounded carry-over.
//!
//! Fragment lookups start as detached tasks the moment their token is
//! matched and are awaited in queue order. Output therefore follows document
//! order no matter how slow a fragment is, and dropping the output stream
//! stops all further reads without cancelling a lookup already started.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use edge_core::{Body, BoxError};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::scanner::PlaceholderSet;

/// Where fragment bytes for a matched token come from.
#[async_trait]
pub trait FragmentSource: Send + Sync + 'static {
    /// Resolve the fragment of the token at `index` in the placeholder set.
    async fn fragment(&self, index: usize) -> Result<Bytes, BoxError>;
}

/// Errors that end a rewritten stream.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// Reading the upstream body failed.
    #[error("upstream body failed: {0}")]
    Upstream(#[source] BoxError),

    /// A fragment could not be resolved.
    #[error("fragment '{token}' could not be resolved: {source}")]
    Fragment {
        token: String,
        #[source]
        source: BoxError,
    },

    /// A fragment task panicked or was aborted.
    #[error("fragment task for '{0}' did not complete")]
    TaskFailed(String),
}

/// One pending unit of work.
enum WorkItem {
    /// Read the next upstream chunk.
    UpstreamRead,
    /// Bytes still to be scanned (the tail after a match).
    Scan(Bytes),
    /// Carry-over to prepend to the next item's bytes before scanning.
    Merge(Bytes),
    /// A fragment lookup whose bytes are emitted verbatim.
    Fragment {
        index: usize,
        task: JoinHandle<Result<Bytes, BoxError>>,
    },
}

/// Byte counters for one rewritten stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Bytes read from upstream.
    pub bytes_in: usize,
    /// Bytes emitted downstream.
    pub bytes_out: usize,
    /// Tokens replaced.
    pub substitutions: usize,
}

/// Rewrites one upstream body, replacing placeholder tokens with fragments.
pub struct StreamRewriter {
    upstream: Body,
    upstream_done: bool,
    placeholders: Arc<PlaceholderSet>,
    source: Arc<dyn FragmentSource>,
    queue: VecDeque<WorkItem>,
    stats: RewriteStats,
}

impl StreamRewriter {
    /// Create a rewriter over an upstream body.
    pub fn new(
        upstream: Body,
        placeholders: Arc<PlaceholderSet>,
        source: Arc<dyn FragmentSource>,
    ) -> Self {
        Self {
            upstream,
            upstream_done: false,
            placeholders,
            source,
            queue: VecDeque::from([WorkItem::UpstreamRead]),
            stats: RewriteStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> RewriteStats {
        self.stats
    }

    /// Produce the next output chunk, or `None` once the stream is complete.
    ///
    /// After an error the queue is abandoned and every later pull returns
    /// `None`.
    pub async fn pull(&mut self) -> Option<Result<Bytes, RewriteError>> {
        while let Some(item) = self.queue.pop_front() {
            match self.step(item).await {
                Ok(Some(bytes)) if !bytes.is_empty() => {
                    self.stats.bytes_out += bytes.len();
                    return Some(Ok(bytes));
                }
                Ok(_) => {}
                Err(e) => {
                    self.queue.clear();
                    return Some(Err(e));
                }
            }
        }

        tracing::debug!(
            bytes_in = self.stats.bytes_in,
            bytes_out = self.stats.bytes_out,
            substitutions = self.stats.substitutions,
            "rewrite complete"
        );
        None
    }

    /// Turn the rewriter into a body that pulls on demand.
    pub fn into_body(self) -> Body {
        Body::from_stream(futures::stream::unfold(self, |mut rewriter| async move {
            rewriter.pull().await.map(|item| (item, rewriter))
        }))
    }

    async fn step(&mut self, item: WorkItem) -> Result<Option<Bytes>, RewriteError> {
        match item {
            WorkItem::Fragment { index, task } => match task.await {
                Ok(Ok(bytes)) => Ok(Some(bytes)),
                Ok(Err(source)) => Err(RewriteError::Fragment {
                    token: self.token_name(index),
                    source,
                }),
                Err(_) => Err(RewriteError::TaskFailed(self.token_name(index))),
            },
            WorkItem::UpstreamRead => match self.read_upstream().await? {
                Some(chunk) => Ok(Some(self.scan_upstream(chunk))),
                None => Ok(None),
            },
            WorkItem::Scan(bytes) => {
                let is_final = self.upstream_done;
                Ok(Some(self.scan_with(bytes, is_final, false)))
            }
            WorkItem::Merge(carry) => match self.queue.pop_front() {
                Some(WorkItem::UpstreamRead) => match self.read_upstream().await? {
                    Some(chunk) => {
                        let mut merged = BytesMut::with_capacity(carry.len() + chunk.len());
                        merged.extend_from_slice(&carry);
                        merged.extend_from_slice(&chunk);
                        Ok(Some(self.scan_upstream(merged.freeze())))
                    }
                    None => Ok(Some(self.scan_with(carry, true, false))),
                },
                Some(WorkItem::Scan(bytes)) => {
                    let mut merged = BytesMut::with_capacity(carry.len() + bytes.len());
                    merged.extend_from_slice(&carry);
                    merged.extend_from_slice(&bytes);
                    let is_final = self.upstream_done;
                    Ok(Some(self.scan_with(merged.freeze(), is_final, false)))
                }
                Some(other) => {
                    // Carry-over only ever precedes a read; nothing to merge with.
                    self.queue.push_front(other);
                    Ok(Some(carry))
                }
                None => Ok(Some(self.scan_with(carry, true, false))),
            },
        }
    }

    /// Scan a chunk read from upstream.
    fn scan_upstream(&mut self, buffer: Bytes) -> Bytes {
        let is_final = self.upstream_done;
        self.scan_with(buffer, is_final, true)
    }

    /// Scan `buffer`, queue what follows the emitted bytes, return the bytes.
    fn scan_with(&mut self, buffer: Bytes, is_final: bool, from_upstream: bool) -> Bytes {
        let outcome = self.placeholders.scan(&buffer, is_final);

        let mut next = Vec::with_capacity(3);
        if let Some(m) = outcome.matched {
            self.stats.substitutions += 1;
            next.push(self.spawn_fragment(m.index));
            if !outcome.after.is_empty() {
                next.push(WorkItem::Scan(outcome.after));
            }
        }
        if !outcome.carry_over.is_empty() {
            next.push(WorkItem::Merge(outcome.carry_over));
        }
        for item in next.into_iter().rev() {
            self.queue.push_front(item);
        }

        if from_upstream && !self.upstream_done {
            self.queue.push_back(WorkItem::UpstreamRead);
        }

        outcome.before
    }

    fn spawn_fragment(&self, index: usize) -> WorkItem {
        let source = Arc::clone(&self.source);
        let task = tokio::spawn(async move { source.fragment(index).await });
        WorkItem::Fragment { index, task }
    }

    async fn read_upstream(&mut self) -> Result<Option<Bytes>, RewriteError> {
        loop {
            match self.upstream.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    self.stats.bytes_in += chunk.len();
                    return Ok(Some(chunk));
                }
                Some(Err(e)) => return Err(RewriteError::Upstream(e)),
                None => {
                    self.upstream_done = true;
                    return Ok(None);
                }
            }
        }
    }

    fn token_name(&self, index: usize) -> String {
        self.placeholders
            .token(index)
            .map(|t| String::from_utf8_lossy(t).into_owned())
            .unwrap_or_else(|| format!("#{}", index))
    }
}
