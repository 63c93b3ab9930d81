//! Track requests for pages and resolve them through a [Provider].
//!
//! A [Source] owns a [Provider], one ordered index of outstanding requests per [Kind], and a
//! single lock that serializes every state transition. Callers own their [Request]s; the
//! [Source] only refers to them by [Token] while they are tracked.
//!
//! # Lifecycle of a request
//!
//! ```txt
//!                  request_*              forward
//!   Untracked ---------------> Accumulating -----+----> Outstanding
//!       ^                          |             |          |
//!       |                          |             +----> Piggybacked (on an Outstanding request)
//!       |                          |                        |
//!       +-------- cancel ----------+---- complete/cancel ---+
//! ```
//!
//! A request that is not batched is forwarded by the same call that initialized it. When an
//! outstanding request with piggybacked requests is canceled, the first piggybacked request is
//! promoted to outstanding and inherits the provider-level request.
//!
//! # Teardown
//!
//! [Source::detach] completes every outstanding [Kind::Read] and [Kind::Dirty] request with
//! [Error::Detached] and rejects all further submissions. [Kind::Writeback] requests are left
//! outstanding so pending writes can still be flushed, and resolutions for them are still
//! applied. [Source::close] detaches (if needed) and then closes the provider. Once closed, the
//! provider receives no further calls: writebacks that are still outstanding can be resolved,
//! failed or canceled, but are no longer cleared or swapped with the provider. A [Source] must
//! be detached and closed before it is dropped.
//!
//! # Example
//!
//! ```rust
//! use commonware_pager::{
//!     source::{Config, Request, Source},
//!     DebugInfo, Kind, Outcome, Properties, Provider, ProviderRequest, Token,
//! };
//! use commonware_runtime::{deterministic, Runner};
//!
//! // A provider that never has pages ready and learns about resolutions out of band
//! struct Remote;
//!
//! impl Provider for Remote {
//!     type Page = ();
//!
//!     fn properties(&self) -> Properties { Properties::default() }
//!     fn supports(&self, kind: Kind) -> bool { kind == Kind::Read }
//!     fn get_page_sync(&self, _: u64, _: &DebugInfo) -> Option<()> { None }
//!     fn send_async(&self, _: ProviderRequest) {}
//!     fn clear_async(&self, _: Token) {}
//!     fn swap_async(&self, _: Token, _: ProviderRequest) {}
//!     fn on_detach(&self) {}
//!     fn on_close(&self) {}
//! }
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     let source = Source::new(context, Remote, Config { page_size: 4096 });
//!
//!     // Nothing is resident, so the request is forwarded to the provider
//!     let mut request = Request::new(false);
//!     let outcome = source.request_page(0, &mut request, DebugInfo::default()).unwrap();
//!     assert_eq!(outcome, Outcome::WouldBlock);
//!
//!     // The provider supplies the page (normally from another task)
//!     source.on_pages_supplied(0, 4096);
//!     request.wait().await.unwrap();
//!
//!     source.close();
//! });
//! ```

mod dump;
mod index;
mod metrics;
mod request;

pub use dump::{Dump, Outstanding};
pub use request::{Request, Status};

use crate::{
    DebugInfo, Error, Failure, Kind, Outcome, Properties, Provider, ProviderRequest, Signal,
    Token,
};
use futures::channel::oneshot;
use index::Index;
use metrics::Metrics;
use request::Binding;
use std::{
    collections::{HashMap, VecDeque},
    ops::Range,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, trace};

/// Configuration for a [Source].
#[derive(Clone, Debug)]
pub struct Config {
    /// Size of a page in bytes. Must be a power of two.
    pub page_size: u64,
}

/// Where a [Descriptor] is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tracking {
    Accumulating,
    Outstanding,
    Piggybacked(Token),
}

/// The [Source]'s view of a [Request].
struct Descriptor {
    kind: Kind,
    offset: u64,
    len: u64,

    /// Length of the forwarded range that has not been resolved yet.
    pending: u64,

    tracking: Tracking,

    /// Requests resolved together with this one (only populated while outstanding).
    piggyback: VecDeque<Token>,

    debug: DebugInfo,
    sender: oneshot::Sender<Result<(), Error>>,
}

impl Descriptor {
    fn end(&self) -> u64 {
        self.offset + self.len
    }
}

struct State {
    detached: bool,
    closed: bool,

    /// Next token to hand out. Tokens are never reused.
    next: u64,

    /// Every tracked request, whatever its [Tracking].
    descriptors: HashMap<Token, Descriptor>,

    /// Outstanding requests, by kind.
    outstanding: [Index; Kind::COUNT],
}

struct Inner<P: Provider> {
    provider: P,
    page_size: u64,
    state: Mutex<State>,
    metrics: Metrics,
}

impl<P: Provider> Drop for Inner<P> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let Ok(state) = self.state.get_mut() else {
            return;
        };
        assert!(
            state.detached && state.closed,
            "source dropped before being detached and closed"
        );
    }
}

/// Coordinates requests for the pages of one memory object.
pub struct Source<P: Provider> {
    inner: Arc<Inner<P>>,
}

impl<P: Provider> Clone for Source<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Provider> Source<P> {
    /// Create a new [Source] backed by `provider`.
    pub fn new(context: impl commonware_runtime::Metrics, provider: P, cfg: Config) -> Self {
        assert!(
            cfg.page_size.is_power_of_two(),
            "page size must be a power of two"
        );
        Self {
            inner: Arc::new(Inner {
                provider,
                page_size: cfg.page_size,
                state: Mutex::new(State {
                    detached: false,
                    closed: false,
                    next: 0,
                    descriptors: HashMap::new(),
                    outstanding: std::array::from_fn(|_| Index::new()),
                }),
                metrics: Metrics::init(context),
            }),
        }
    }

    /// Returns the provider backing the source.
    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Returns the page size of the source.
    pub fn page_size(&self) -> u64 {
        self.inner.page_size
    }

    /// Returns true if the source has been detached.
    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }

    /// Returns true if the source has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns the number of outstanding requests of the given kind.
    pub fn outstanding(&self, kind: Kind) -> usize {
        self.lock().outstanding[kind.index()].len()
    }

    /// Returns the properties of the provider.
    pub fn properties(&self) -> Properties {
        let _state = self.lock();
        self.inner.provider.properties()
    }

    /// Returns true if the provider considers `page` valid for `offset`.
    pub fn is_page_ok(&self, page: &P::Page, offset: u64) -> bool {
        self.inner.provider.is_page_ok(page, offset)
    }

    /// Request the page containing `offset`.
    ///
    /// If the provider can supply the page synchronously, it is returned directly. Otherwise
    /// the page is added to `request`:
    /// - [Outcome::WouldBlock]: the request was forwarded (or merged into an outstanding
    ///   request covering the page). Wait on `request`.
    /// - [Outcome::Continue]: the page was added to a batch. Request the next contiguous page
    ///   with the same `request`, or [Source::finalize] it.
    ///
    /// If `request` is batching and `offset` is not contiguous with the batch, the batch is
    /// forwarded without the page. Wait on `request` and retry the page afterwards.
    pub fn request_page(
        &self,
        offset: u64,
        request: &mut Request<P>,
        debug: DebugInfo,
    ) -> Result<Outcome<P::Page>, Error> {
        if !self.inner.provider.supports(Kind::Read) {
            return Err(Error::Unsupported(Kind::Read));
        }
        let offset = self.round_down(offset);

        // Only the owner of a request can move it out of (or into) accumulation
        if let Some(binding) = &request.binding {
            assert!(
                Arc::ptr_eq(&binding.source.inner, &self.inner),
                "request bound to another source"
            );
            assert!(
                matches!(
                    self.status(binding.token),
                    Status::Untracked | Status::Accumulating
                ),
                "request already forwarded"
            );
        }

        let mut state = self.lock();
        if state.detached {
            return Err(Error::Detached);
        }
        if let Some(page) = self.inner.provider.get_page_sync(offset, &debug) {
            self.inner.metrics.sync.inc();
            return Ok(Outcome::Ready(page));
        }

        // Batch requests arrive already initialized
        let token = match self.bound(&state, request) {
            Some(token) => token,
            None => {
                trace!(offset, "initializing read request");
                self.bind(&mut state, request, offset, Kind::Read, debug)
            }
        };
        Ok(self.populate(&mut state, token, offset, request.allow_batching()))
    }

    /// Request permission to dirty the pages overlapping `[offset, offset + len)`.
    ///
    /// `request` must not be in use. On success, the request was forwarded (possibly covering
    /// only a prefix of the range, if it ran into an outstanding request). Wait on `request`
    /// and retry any remaining pages afterwards.
    pub fn request_dirty_transition(
        &self,
        offset: u64,
        len: u64,
        request: &mut Request<P>,
        debug: DebugInfo,
    ) -> Result<(), Error> {
        self.request_range(Kind::Dirty, offset, len, request, debug)
    }

    /// Request that the pages overlapping `[offset, offset + len)` be written back.
    ///
    /// Behaves like [Source::request_dirty_transition].
    pub fn request_writeback(
        &self,
        offset: u64,
        len: u64,
        request: &mut Request<P>,
        debug: DebugInfo,
    ) -> Result<(), Error> {
        self.request_range(Kind::Writeback, offset, len, request, debug)
    }

    /// Forward a batch that is still accumulating.
    ///
    /// Panics if `request` is not accumulating.
    pub fn finalize(&self, request: &mut Request<P>) -> Result<(), Error> {
        let token = request.token().expect("finalizing an unbound request");
        let kind = self.kind(token).expect("finalizing an untracked request");
        if !self.inner.provider.supports(kind) {
            return Err(Error::Unsupported(kind));
        }

        // Only the owner of an accumulating request can change its status
        assert_eq!(
            self.status(token),
            Status::Accumulating,
            "request already forwarded"
        );
        let mut state = self.lock();
        if state.detached {
            return Err(Error::Detached);
        }
        self.forward(&mut state, token);
        Ok(())
    }

    /// Resolve outstanding [Kind::Read] requests overlapping `[offset, offset + len)`.
    pub fn on_pages_supplied(&self, offset: u64, len: u64) {
        self.resolve(Kind::Read, offset, len);
    }

    /// Resolve outstanding [Kind::Dirty] requests overlapping `[offset, offset + len)`.
    pub fn on_pages_dirtied(&self, offset: u64, len: u64) {
        self.resolve(Kind::Dirty, offset, len);
    }

    /// Resolve outstanding [Kind::Writeback] requests overlapping `[offset, offset + len)`.
    pub fn on_pages_written(&self, offset: u64, len: u64) {
        self.resolve(Kind::Writeback, offset, len);
    }

    /// Fail every outstanding request (of any kind) overlapping `[offset, offset + len)`.
    ///
    /// Unlike successful resolutions, failures complete a request even if they only cover part
    /// of it.
    pub fn on_pages_failed(&self, offset: u64, len: u64, failure: Failure) {
        let end = offset.checked_add(len).expect("range overflow");
        let mut state = self.lock();
        for kind in Kind::ALL {
            if !self.inner.provider.supports(kind) {
                continue;
            }
            if state.detached && kind != Kind::Writeback {
                continue;
            }
            let failed: Vec<_> = state.outstanding[kind.index()]
                .intersecting(offset, end)
                .collect();
            for entry in failed {
                trace!(?kind, ?failure, offset = entry.offset, "failing request");
                state.outstanding[kind.index()].remove(entry.end);
                self.complete(&mut state, entry.token, Err(Error::Failed(failure)));
            }
        }
    }

    /// Stop tracking `request`.
    ///
    /// Panics if `request` is bound to a different source.
    pub fn cancel(&self, request: &mut Request<P>) {
        if let Some(binding) = &request.binding {
            assert!(
                Arc::ptr_eq(&binding.source.inner, &self.inner),
                "request bound to another source"
            );
        }
        request.cancel();
    }

    /// Complete all outstanding requests (except writebacks) with [Error::Detached] and reject
    /// any further requests.
    ///
    /// Calling this more than once has no effect.
    pub fn detach(&self) {
        let mut state = self.lock();
        if state.detached {
            return;
        }
        state.detached = true;
        debug!("detaching");

        for kind in Kind::ALL {
            if kind == Kind::Writeback || !self.inner.provider.supports(kind) {
                continue;
            }
            while let Some(entry) = state.outstanding[kind.index()].pop_first() {
                trace!(?kind, offset = entry.offset, end = entry.end, "dropping request");
                self.complete(&mut state, entry.token, Err(Error::Detached));
            }
        }
        self.inner.provider.on_detach();
    }

    /// Detach (if not already detached) and close the provider.
    ///
    /// After this returns, the provider is never called again. Calling this more than once has
    /// no effect.
    pub fn close(&self) {
        self.detach();

        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        debug!("closing");
        self.inner.provider.on_close();
    }

    /// Capture the state of the source.
    pub fn dump(&self) -> Dump {
        let guard = self.lock();
        let state = &*guard;
        let outstanding = Kind::ALL
            .iter()
            .flat_map(|kind| state.outstanding[kind.index()].iter())
            .map(|entry| {
                let descriptor = &state.descriptors[&entry.token];
                Outstanding {
                    kind: descriptor.kind,
                    offset: entry.offset,
                    end: entry.end,
                    pending: descriptor.pending,
                    piggybacked: descriptor.piggyback.len(),
                    debug: descriptor.debug,
                }
            })
            .collect();
        Dump {
            detached: state.detached,
            closed: state.closed,
            outstanding,
            provider: self.inner.provider.dump(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap()
    }

    fn round_down(&self, offset: u64) -> u64 {
        offset & !(self.inner.page_size - 1)
    }

    fn round_up(&self, offset: u64) -> u64 {
        offset
            .checked_add(self.inner.page_size - 1)
            .expect("range overflow")
            & !(self.inner.page_size - 1)
    }

    pub(super) fn status(&self, token: Token) -> Status {
        let state = self.lock();
        match state.descriptors.get(&token).map(|d| d.tracking) {
            None => Status::Untracked,
            Some(Tracking::Accumulating) => Status::Accumulating,
            Some(Tracking::Outstanding) => Status::Outstanding,
            Some(Tracking::Piggybacked(host)) => Status::Piggybacked(host),
        }
    }

    pub(super) fn range(&self, token: Token) -> Option<Range<u64>> {
        let state = self.lock();
        let descriptor = state.descriptors.get(&token)?;
        Some(descriptor.offset..descriptor.end())
    }

    pub(super) fn kind(&self, token: Token) -> Option<Kind> {
        self.lock().descriptors.get(&token).map(|d| d.kind)
    }

    /// Returns the token of `request` if it is bound to a tracked descriptor.
    fn bound(&self, state: &State, request: &Request<P>) -> Option<Token> {
        let binding = request.binding.as_ref()?;
        state
            .descriptors
            .contains_key(&binding.token)
            .then_some(binding.token)
    }

    /// Start tracking `request` as an empty batch at `offset`.
    fn bind(
        &self,
        state: &mut State,
        request: &mut Request<P>,
        offset: u64,
        kind: Kind,
        debug: DebugInfo,
    ) -> Token {
        let token = Token::new(state.next);
        state.next += 1;

        let (sender, receiver) = oneshot::channel();
        state.descriptors.insert(
            token,
            Descriptor {
                kind,
                offset,
                len: 0,
                pending: 0,
                tracking: Tracking::Accumulating,
                piggyback: VecDeque::new(),
                debug,
                sender,
            },
        );
        request.binding = Some(Binding {
            source: self.clone(),
            token,
            signal: Signal::new(receiver),
        });
        token
    }

    /// Add the page at `offset` to an accumulating request, forwarding it if the batch is
    /// complete.
    fn populate(
        &self,
        state: &mut State,
        token: Token,
        offset: u64,
        batching: bool,
    ) -> Outcome<P::Page> {
        let page_size = self.inner.page_size;
        let descriptor = state
            .descriptors
            .get_mut(&token)
            .expect("missing request");
        assert_eq!(
            descriptor.tracking,
            Tracking::Accumulating,
            "request already forwarded"
        );

        if !batching {
            descriptor.len = page_size;
            self.forward(state, token);
            return Outcome::WouldBlock;
        }

        // If the page does not extend the batch, send what we have and let the caller retry
        if descriptor.end() != offset {
            trace!(
                offset,
                end = descriptor.end(),
                "page not contiguous: ending batch"
            );
            self.forward(state, token);
            return Outcome::WouldBlock;
        }
        descriptor.len = descriptor
            .len
            .checked_add(page_size)
            .expect("batch length overflow");
        let start = descriptor.offset;
        let end = start.checked_add(descriptor.len).expect("range overflow");
        let kind = descriptor.kind;
        self.inner.metrics.batched.inc();

        // Stop growing once the batch would stop (or start) overlapping an outstanding request
        if state.outstanding[kind.index()].reaches_boundary(start, end) {
            trace!(offset = start, end, "batch reached outstanding request");
            self.forward(state, token);
            return Outcome::WouldBlock;
        }
        Outcome::Continue
    }

    /// Build a batch over a whole range and forward it.
    fn request_range(
        &self,
        kind: Kind,
        offset: u64,
        len: u64,
        request: &mut Request<P>,
        debug: DebugInfo,
    ) -> Result<(), Error> {
        if !self.inner.provider.supports(kind) {
            return Err(Error::Unsupported(kind));
        }
        assert_eq!(request.status(), Status::Untracked, "request already in use");
        let end = offset.checked_add(len).expect("range overflow");
        let mut offset = self.round_down(offset);
        let end = self.round_up(end);

        let mut state = self.lock();
        if state.detached {
            return Err(Error::Detached);
        }
        let token = self.bind(&mut state, request, offset, kind, debug);

        // Keep building the batch until it is sent or covers the range
        loop {
            let outcome = self.populate(&mut state, token, offset, true);
            if !matches!(outcome, Outcome::Continue) {
                return Ok(());
            }
            offset += self.inner.page_size;
            if offset >= end {
                break;
            }
        }
        self.forward(&mut state, token);
        Ok(())
    }

    /// Hand an accumulated request to the provider, or merge it into the outstanding request
    /// that already covers its start.
    fn forward(&self, state: &mut State, token: Token) {
        let State {
            descriptors,
            outstanding,
            ..
        } = state;
        let descriptor = descriptors.get_mut(&token).expect("missing request");
        assert!(descriptor.len > 0, "forwarding empty request");
        let kind = descriptor.kind;
        let index = &mut outstanding[kind.index()];

        // An outstanding request already covers the start: resolve this one along with it
        if let Some(host) = index.containing(descriptor.offset) {
            descriptor.len = host.end.min(descriptor.end()) - descriptor.offset;
            descriptor.tracking = Tracking::Piggybacked(host.token);
            debug!(
                ?kind,
                offset = descriptor.offset,
                end = descriptor.end(),
                %token,
                host = %host.token,
                "piggybacking request"
            );
            descriptors
                .get_mut(&host.token)
                .expect("missing outstanding request")
                .piggyback
                .push_back(token);
            self.inner.metrics.piggybacked.inc();
            return;
        }

        // Never ask the provider for a page that is already outstanding
        let end = index.clamp(descriptor.offset, descriptor.end());
        descriptor.len = end - descriptor.offset;
        descriptor.pending = descriptor.len;
        descriptor.tracking = Tracking::Outstanding;
        index.insert(descriptor.offset, end, token);
        debug!(
            ?kind,
            offset = descriptor.offset,
            end,
            %token,
            "forwarding request"
        );
        self.inner.provider.send_async(ProviderRequest {
            token,
            kind,
            offset: descriptor.offset,
            length: descriptor.len,
        });
        self.inner.metrics.forwarded.inc();
        self.inner.metrics.outstanding[kind.index()].inc();
    }

    /// Apply a successful resolution to every outstanding request it overlaps.
    fn resolve(&self, kind: Kind, offset: u64, len: u64) {
        let end = offset.checked_add(len).expect("range overflow");
        let mut state = self.lock();
        if state.detached && kind != Kind::Writeback {
            return;
        }

        // The first request that could be resolved is the one with the smallest end greater
        // than offset. Keep going while requests start before the end of the resolution.
        let mut cursor = offset;
        while let Some(entry) = state.outstanding[kind.index()].upper_bound(cursor) {
            if entry.offset >= end {
                break;
            }
            cursor = entry.end;

            let fulfilled = end.min(entry.end) - offset.max(entry.offset);
            let descriptor = state
                .descriptors
                .get_mut(&entry.token)
                .expect("missing outstanding request");
            if fulfilled < descriptor.pending {
                descriptor.pending -= fulfilled;
                trace!(
                    ?kind,
                    offset = entry.offset,
                    pending = descriptor.pending,
                    "partially resolved request"
                );
                continue;
            }
            if fulfilled > descriptor.pending {
                // Part of the range was resolved more than once (e.g. decommitted and
                // supplied again)
                trace!(
                    ?kind,
                    offset = entry.offset,
                    fulfilled,
                    pending = descriptor.pending,
                    "excessive page count"
                );
            }
            state.outstanding[kind.index()].remove(entry.end);
            self.complete(&mut state, entry.token, Ok(()));
        }
    }

    /// Signal an outstanding request (already removed from its index) and everything
    /// piggybacked on it.
    fn complete(&self, state: &mut State, token: Token, result: Result<(), Error>) {
        let mut descriptor = state
            .descriptors
            .remove(&token)
            .expect("missing outstanding request");

        // Take the request back from the provider before waking anyone (a closed provider
        // receives no further calls)
        if !state.closed {
            self.inner.provider.clear_async(token);
        }
        self.inner.metrics.outstanding[descriptor.kind.index()].dec();

        for waiter in std::mem::take(&mut descriptor.piggyback) {
            let waiter = state
                .descriptors
                .remove(&waiter)
                .expect("missing piggybacked request");
            self.signal(waiter, result);
        }
        self.signal(descriptor, result);
    }

    fn signal(&self, descriptor: Descriptor, result: Result<(), Error>) {
        match result {
            Ok(()) => self.inner.metrics.completed.inc(),
            Err(_) => self.inner.metrics.failed.inc(),
        };

        // The owner may have stopped listening
        let _ = descriptor.sender.send(result);
    }

    /// Stop tracking the descriptor identified by `token`, if it is still tracked.
    pub(super) fn cancel_token(&self, token: Token) {
        let mut state = self.lock();
        let Some(descriptor) = state.descriptors.remove(&token) else {
            return;
        };
        self.inner.metrics.canceled.inc();

        let kind = descriptor.kind;
        match descriptor.tracking {
            Tracking::Accumulating => {
                trace!(%token, "canceling accumulating request");
            }
            Tracking::Piggybacked(host) => {
                trace!(%token, %host, "canceling piggybacked request");
                state
                    .descriptors
                    .get_mut(&host)
                    .expect("missing outstanding request")
                    .piggyback
                    .retain(|waiter| *waiter != token);
            }
            Tracking::Outstanding => {
                let (offset, len, pending) =
                    (descriptor.offset, descriptor.len, descriptor.pending);
                let end = descriptor.end();
                let mut piggyback = descriptor.piggyback;
                let State {
                    closed,
                    descriptors,
                    outstanding,
                    ..
                } = &mut *state;
                let closed = *closed;
                let index = &mut outstanding[kind.index()];

                let Some(promoted) = piggyback.pop_front() else {
                    trace!(%token, "canceling outstanding request");
                    index.remove(end);
                    if !closed {
                        self.inner.provider.clear_async(token);
                    }
                    self.inner.metrics.outstanding[kind.index()].dec();
                    return;
                };

                // Hand the provider-level request over to the first piggybacked request
                debug!(?kind, offset, end, %token, %promoted, "promoting piggybacked request");
                for waiter in &piggyback {
                    descriptors
                        .get_mut(waiter)
                        .expect("missing piggybacked request")
                        .tracking = Tracking::Piggybacked(promoted);
                }
                let next = descriptors
                    .get_mut(&promoted)
                    .expect("missing piggybacked request");
                next.offset = offset;
                next.len = len;
                next.pending = pending;
                next.tracking = Tracking::Outstanding;
                next.piggyback = piggyback;
                index.replace(end, promoted);
                if !closed {
                    self.inner.provider.swap_async(
                        token,
                        ProviderRequest {
                            token: promoted,
                            kind,
                            offset,
                            length: len,
                        },
                    );
                }
                self.inner.metrics.promoted.inc();
            }
        }
    }
}
