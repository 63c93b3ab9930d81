//! Coordinate asynchronous page requests between a pageable memory object and an external
//! [Provider].
//!
//! A pageable memory object does not hold all of its pages. When a faulting task needs a page
//! that is not resident, it asks a [source::Source] for it. The [source::Source] either answers
//! synchronously (the [Provider] already has the page), or records the interest in a
//! caller-owned [source::Request] and forwards a request to the [Provider], which resolves it
//! later (from some other task) by calling back into the [source::Source].
//!
//! # Deduplication
//!
//! At most one provider-level request is in flight for any page and [Kind]. A request that
//! lands inside an outstanding one is "piggybacked" onto it and resolved for free when the
//! outstanding request completes. If the owner of an outstanding request gives up, the first
//! piggybacked request is promoted to take its place (and its provider token).
//!
//! # Batching
//!
//! Requests that allow batching are extended one page at a time while the faulting task walks
//! a contiguous range, and are only forwarded once the batch is finalized, becomes
//! non-contiguous, or reaches the boundary of an outstanding request.
//!
//! # Status
//!
//! `commonware-pager` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

#![doc(
    html_logo_url = "https://commonware.xyz/imgs/rustdoc_logo.svg",
    html_favicon_url = "https://commonware.xyz/favicon.ico"
)]

use futures::{channel::oneshot, FutureExt};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use thiserror::Error;

pub mod source;
pub use source::{Config, Request, Source, Status};

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

/// The operation a request is waiting on.
///
/// Each kind is tracked independently: the same page may be outstanding for [Kind::Read] and
/// [Kind::Dirty] at the same time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// Supply the contents of absent pages.
    Read,
    /// Acknowledge that clean pages may become dirty.
    Dirty,
    /// Flush modified pages back to the provider.
    Writeback,
}

impl Kind {
    /// Number of request kinds.
    pub const COUNT: usize = 3;

    /// All request kinds, in tracking order.
    pub const ALL: [Kind; Self::COUNT] = [Kind::Read, Kind::Dirty, Kind::Writeback];

    /// Position of the kind in per-kind tables.
    pub const fn index(self) -> usize {
        match self {
            Kind::Read => 0,
            Kind::Dirty => 1,
            Kind::Writeback => 2,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Read => write!(f, "read"),
            Kind::Dirty => write!(f, "dirty"),
            Kind::Writeback => write!(f, "writeback"),
        }
    }
}

/// Reason a [Provider] could not resolve a range.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Failure {
    #[error("io")]
    Io,
    #[error("data integrity")]
    DataIntegrity,
    #[error("bad state")]
    BadState,
    #[error("no memory")]
    NoMemory,
}

impl Failure {
    /// Returns true if an external provider (e.g. a user-mode pager) may report this failure.
    ///
    /// [Failure::NoMemory] can only originate inside the kernel.
    pub fn is_external(&self) -> bool {
        match self {
            Failure::Io | Failure::DataIntegrity | Failure::BadState => true,
            Failure::NoMemory => false,
        }
    }
}

/// Errors that can occur when requesting pages or waiting on a request.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("{0} requests not supported")]
    Unsupported(Kind),
    #[error("backing gone")]
    Detached,
    #[error("request failed: {0}")]
    Failed(Failure),
    #[error("wait interrupted")]
    Interrupted,
    #[error("wait timed out")]
    Timeout,
    #[error("request canceled")]
    Canceled,
}

impl Error {
    /// Returns true if the error was produced by completing the request (rather than by the
    /// wait itself).
    pub fn is_completion(&self) -> bool {
        matches!(self, Error::Detached | Error::Failed(_))
    }
}

/// Result of submitting a request.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The provider had the page available synchronously.
    Ready(T),
    /// The request was forwarded (or merged into an in-flight one). Wait on it.
    WouldBlock,
    /// The page was added to a batch. Request the next page with the same request, or
    /// finalize it.
    Continue,
}

/// Diagnostic information about the memory object that made a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugInfo {
    /// Address of the memory object.
    pub object: usize,
    /// Identifier of the memory object.
    pub id: u64,
}

/// Properties of a [Provider].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Properties {
    /// Pages are supplied by a user-mode pager.
    pub is_user_pager: bool,
    /// The provider preserves page contents (pages may be written back and must not be
    /// discarded while dirty).
    pub is_preserving_page_content: bool,
    /// The provider hands out specific physical pages rather than contents.
    pub is_providing_specific_physical_pages: bool,
    /// The provider must be told when pages are freed.
    pub is_handling_free: bool,
}

/// Opaque identifier of a request, shared with the [Provider].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value of the token.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request as seen by the [Provider].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderRequest {
    /// Identifies the request in later `clear_async` and `swap_async` calls.
    pub token: Token,
    /// Operation requested.
    pub kind: Kind,
    /// Page-aligned start of the range.
    pub offset: u64,
    /// Page-aligned length of the range.
    pub length: u64,
}

impl ProviderRequest {
    /// Offset one past the last byte of the request.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Single-shot wait primitive of a [source::Request].
///
/// Resolves with the result the request was completed with, or [Error::Canceled] if the
/// request was dropped by the [source::Source] without being completed.
pub struct Signal(oneshot::Receiver<Result<(), Error>>);

impl Signal {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<(), Error>>) -> Self {
        Self(receiver)
    }
}

impl Future for Signal {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0
            .poll_unpin(cx)
            .map(|result| result.unwrap_or(Err(Error::Canceled)))
    }
}

/// Supplier of pages for a [source::Source].
///
/// All methods except [Provider::wait] are invoked while the [source::Source] holds its lock.
/// Implementations must not call back into the [source::Source] from within them; resolutions
/// are reported later (from another task or thread) through `on_pages_*`.
pub trait Provider: Send + Sync + 'static {
    /// A page handed out by the synchronous fast path.
    type Page: Send;

    /// Returns the properties of the provider.
    fn properties(&self) -> Properties;

    /// Returns true if the provider handles requests of the given kind.
    fn supports(&self, kind: Kind) -> bool;

    /// Returns the page at `offset` if it can be supplied without waiting.
    fn get_page_sync(&self, offset: u64, debug: &DebugInfo) -> Option<Self::Page>;

    /// Start resolving a request. Completion is reported through the [source::Source].
    fn send_async(&self, request: ProviderRequest);

    /// Stop tracking a request (it was completed or canceled).
    fn clear_async(&self, token: Token);

    /// Replace an in-flight request with another covering the same range.
    fn swap_async(&self, old: Token, new: ProviderRequest);

    /// The [source::Source] was detached.
    fn on_detach(&self);

    /// The [source::Source] was closed. No other method is called afterwards.
    fn on_close(&self);

    /// Wait for a request to be completed.
    ///
    /// Providers may override this to apply their own policy (e.g. interruption or timeouts).
    fn wait<'a>(
        &'a self,
        signal: &'a mut Signal,
    ) -> impl Future<Output = Result<(), Error>> + Send + 'a {
        signal
    }

    /// Returns true if `page` is a valid page for `offset`.
    fn is_page_ok(&self, _page: &Self::Page, _offset: u64) -> bool {
        true
    }

    /// Returns a human-readable description of the provider's state.
    fn dump(&self) -> String {
        String::new()
    }
}
