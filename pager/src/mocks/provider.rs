use crate::{DebugInfo, Error, Kind, Properties, ProviderRequest, Signal, Token};
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::{Arc, Mutex},
};

/// A call made by a [crate::source::Source] into the [Provider].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Sent(ProviderRequest),
    Cleared(Token),
    Swapped(Token, ProviderRequest),
    Detached,
    Closed,
}

/// A page handed out by the fast path. Holds the offset it was supplied for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page(pub u64);

struct State {
    supported: [bool; Kind::COUNT],
    properties: Properties,
    pages: HashMap<u64, Page>,
    inflight: BTreeMap<Token, ProviderRequest>,
    events: Vec<Event>,
    wait_error: Option<Error>,
}

/// A provider that records every call and never resolves anything on its own.
///
/// Tests resolve requests by calling `on_pages_*` on the source with the ranges returned by
/// [Provider::inflight].
#[derive(Clone)]
pub struct Provider {
    state: Arc<Mutex<State>>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    /// Create a provider that supports every request kind.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                supported: [true; Kind::COUNT],
                properties: Properties::default(),
                pages: HashMap::new(),
                inflight: BTreeMap::new(),
                events: Vec::new(),
                wait_error: None,
            })),
        }
    }

    /// Stop supporting a request kind.
    pub fn without(self, kind: Kind) -> Self {
        self.state.lock().unwrap().supported[kind.index()] = false;
        self
    }

    /// Report the given properties.
    pub fn with_properties(self, properties: Properties) -> Self {
        self.state.lock().unwrap().properties = properties;
        self
    }

    /// Make a page available to the synchronous fast path.
    pub fn insert_page(&self, offset: u64, page: Page) {
        self.state.lock().unwrap().pages.insert(offset, page);
    }

    /// Fail every subsequent wait with `error` (or stop failing them).
    pub fn fail_waits(&self, error: Option<Error>) {
        self.state.lock().unwrap().wait_error = error;
    }

    /// Returns every call made so far.
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Returns every request sent so far.
    pub fn sent(&self) -> Vec<ProviderRequest> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Sent(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Returns the requests that have been sent (or swapped in) and not yet cleared.
    pub fn inflight(&self) -> Vec<ProviderRequest> {
        self.state.lock().unwrap().inflight.values().copied().collect()
    }
}

impl crate::Provider for Provider {
    type Page = Page;

    fn properties(&self) -> Properties {
        self.state.lock().unwrap().properties
    }

    fn supports(&self, kind: Kind) -> bool {
        self.state.lock().unwrap().supported[kind.index()]
    }

    fn get_page_sync(&self, offset: u64, _debug: &DebugInfo) -> Option<Page> {
        self.state.lock().unwrap().pages.get(&offset).copied()
    }

    fn send_async(&self, request: ProviderRequest) {
        let mut state = self.state.lock().unwrap();

        // A source must never ask for the same page twice
        for other in state.inflight.values() {
            assert!(
                other.kind != request.kind
                    || other.end() <= request.offset
                    || request.end() <= other.offset,
                "duplicate request: {request:?} overlaps {other:?}"
            );
        }
        assert!(state.inflight.insert(request.token, request).is_none());
        state.events.push(Event::Sent(request));
    }

    fn clear_async(&self, token: Token) {
        let mut state = self.state.lock().unwrap();
        state.inflight.remove(&token);
        state.events.push(Event::Cleared(token));
    }

    fn swap_async(&self, old: Token, new: ProviderRequest) {
        let mut state = self.state.lock().unwrap();
        let previous = state.inflight.remove(&old).expect("swapping unknown request");
        assert_eq!(previous.offset, new.offset);
        assert_eq!(previous.length, new.length);
        state.inflight.insert(new.token, new);
        state.events.push(Event::Swapped(old, new));
    }

    fn on_detach(&self) {
        self.state.lock().unwrap().events.push(Event::Detached);
    }

    fn on_close(&self) {
        self.state.lock().unwrap().events.push(Event::Closed);
    }

    fn wait<'a>(
        &'a self,
        signal: &'a mut Signal,
    ) -> impl Future<Output = Result<(), Error>> + Send + 'a {
        let error = self.state.lock().unwrap().wait_error;
        async move {
            match error {
                Some(err) => Err(err),
                None => signal.await,
            }
        }
    }

    fn is_page_ok(&self, page: &Page, offset: u64) -> bool {
        page.0 == offset
    }

    fn dump(&self) -> String {
        let state = self.state.lock().unwrap();
        format!("mock provider inflight {}", state.inflight.len())
    }
}
