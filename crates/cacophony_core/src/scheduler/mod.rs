/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The seam to the content-addressed store.
//!
//! Every operation is asynchronous: it returns a [`NetFuture`] immediately and
//! the caller blocks on [`NetFuture::get`] when it needs the result. Worker
//! threads owned by the implementation do the actual I/O. Retry policy is left
//! to callers.

mod memory;

pub use memory::MemoryScheduler;

use cacophony_protocol::{
    Cid, PublicKey, StreamDescription, StreamIndex, StreamRecommendations, StreamRecord,
    StreamRecords,
};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("connection to the content store failed: {0}")]
    Connection(String),
    #[error("failed to decode {cid}: {reason}")]
    FailedDeserialization { cid: Cid, reason: String },
    #[error("{cid} exceeds the size limit of {limit_bytes} bytes")]
    SizeConstraint { cid: Cid, limit_bytes: u64 },
    #[error("{0} is not present on the node")]
    NotFound(Cid),
}

impl NetworkError {
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// The result of an in-flight network request.
#[must_use = "a NetFuture does nothing unless resolved with get()"]
pub struct NetFuture<T> {
    rx: oneshot::Receiver<Result<T, NetworkError>>,
}

/// The completing side of a [`NetFuture`], handed to whichever worker runs the request.
pub struct NetPromise<T> {
    tx: oneshot::Sender<Result<T, NetworkError>>,
}

impl<T> NetFuture<T> {
    pub fn pending() -> (NetPromise<T>, NetFuture<T>) {
        let (tx, rx) = oneshot::channel();
        (NetPromise { tx }, NetFuture { rx })
    }

    pub fn ready(result: Result<T, NetworkError>) -> Self {
        let (promise, future) = Self::pending();
        promise.complete(result);
        future
    }

    /// Blocks the calling thread until the request completes.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn get(self) -> Result<T, NetworkError> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Connection(
                "request abandoned before completion".to_string(),
            )),
        }
    }
}

impl<T> NetPromise<T> {
    pub fn complete(self, result: Result<T, NetworkError>) {
        // The requester may have given up on the result.
        let _ = self.tx.send(result);
    }
}

pub trait NetworkScheduler: Send + Sync {
    fn read_index(&self, cid: &Cid) -> NetFuture<StreamIndex>;
    fn read_description(&self, cid: &Cid) -> NetFuture<StreamDescription>;
    fn read_recommendations(&self, cid: &Cid) -> NetFuture<StreamRecommendations>;
    fn read_records(&self, cid: &Cid) -> NetFuture<StreamRecords>;
    fn read_record(&self, cid: &Cid) -> NetFuture<StreamRecord>;

    fn pin(&self, cid: &Cid) -> NetFuture<()>;
    fn unpin(&self, cid: &Cid) -> NetFuture<()>;
    fn size_in_bytes(&self, cid: &Cid) -> NetFuture<u64>;

    fn publish(&self, key_name: &str, public_key: &PublicKey, root: &Cid) -> NetFuture<()>;
    fn resolve(&self, public_key: &PublicKey) -> NetFuture<Cid>;
}
