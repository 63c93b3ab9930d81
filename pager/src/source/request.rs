use super::Source;
use crate::{Error, Kind, Provider, Signal, Token};
use std::ops::Range;
use tracing::warn;

/// Where a request currently lives within its [Source].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Not known to any [Source]. The request may be reused.
    Untracked,
    /// A batch is being built and has not been forwarded yet.
    Accumulating,
    /// Forwarded to the provider and tracked as an outstanding request.
    Outstanding,
    /// Merged into the outstanding request identified by the token.
    Piggybacked(Token),
}

/// Association between a [Request] and the [Source] tracking it.
pub(super) struct Binding<P: Provider> {
    pub source: Source<P>,
    pub token: Token,
    pub signal: Signal,
}

/// A caller's interest in a range of pages.
///
/// Requests are owned by the caller and handed to a [Source] by mutable reference. A request
/// that is dropped while still tracked is canceled.
pub struct Request<P: Provider> {
    allow_batching: bool,
    pub(super) binding: Option<Binding<P>>,
}

impl<P: Provider> Request<P> {
    /// Create a new request.
    ///
    /// If `allow_batching` is set, contiguous pages requested through the same request are
    /// accumulated into a single provider request.
    pub fn new(allow_batching: bool) -> Self {
        Self {
            allow_batching,
            binding: None,
        }
    }

    /// Returns true if the request may be extended past the first page.
    pub fn allow_batching(&self) -> bool {
        self.allow_batching
    }

    /// Returns the token of the request, if it is bound to a [Source].
    pub fn token(&self) -> Option<Token> {
        self.binding.as_ref().map(|binding| binding.token)
    }

    /// Returns where the request currently lives.
    pub fn status(&self) -> Status {
        match &self.binding {
            Some(binding) => binding.source.status(binding.token),
            None => Status::Untracked,
        }
    }

    /// Returns the range covered by the request while it is tracked.
    pub fn range(&self) -> Option<Range<u64>> {
        let binding = self.binding.as_ref()?;
        binding.source.range(binding.token)
    }

    /// Returns the kind of the request while it is tracked.
    pub fn kind(&self) -> Option<Kind> {
        let binding = self.binding.as_ref()?;
        binding.source.kind(binding.token)
    }

    /// Wait for the request to be completed.
    ///
    /// If the wait fails for any reason other than the request being completed with an error,
    /// the request is canceled. Once this returns, the request is untracked and may be reused.
    /// Waiting on a request that is not bound returns immediately.
    ///
    /// Panics if the request is still accumulating (it must be finalized first, or it would
    /// never complete).
    pub async fn wait(&mut self) -> Result<(), Error> {
        let Some(Binding {
            source,
            signal,
            token,
        }) = self.binding.as_mut()
        else {
            return Ok(());
        };
        assert_ne!(
            source.status(*token),
            Status::Accumulating,
            "waiting on a request that was never forwarded"
        );
        let result = source.provider().wait(signal).await;
        let binding = self.binding.take().expect("binding vanished during wait");
        if let Err(err) = result {
            if !err.is_completion() {
                warn!(?err, token = %binding.token, "wait failed: canceling request");
                binding.source.cancel_token(binding.token);
            }
        }
        result
    }

    /// Stop waiting for the request.
    pub fn cancel(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.source.cancel_token(binding.token);
        }
    }
}

impl<P: Provider> Drop for Request<P> {
    fn drop(&mut self) {
        self.cancel();
    }
}
