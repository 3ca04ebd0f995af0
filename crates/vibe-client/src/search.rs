//! Semantic search over the embedded library.
//!
//! Overlapping searches are allowed; only the most recently issued one may
//! publish its results.  Each call takes a sequence number up front and its
//! response is applied only if no later call has been issued since.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};
use vibe_proto::protocol::SearchResult;

use crate::api::ApiClient;

pub const SEARCH_FAILED: &str = "Search failed";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchState {
    /// Query of the most recently issued search.
    pub query: String,
    pub searching: bool,
    pub results: Vec<SearchResult>,
    /// False until the first search completes, so an empty result list can
    /// be told apart from "nothing searched yet".
    pub has_searched: bool,
    pub error: Option<String>,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Results (or the failure) were published.
    Applied { count: usize },
    /// A newer search was issued while this one was in flight.
    Superseded,
    /// Blank query; nothing was sent.
    Ignored,
}

#[derive(Clone)]
pub struct SearchController {
    api: ApiClient,
    n_results: u32,
    issued: Arc<AtomicU64>,
    state: Arc<watch::Sender<SearchState>>,
}

impl SearchController {
    pub fn new(api: ApiClient, n_results: u32) -> Self {
        let (tx, _) = watch::channel(SearchState::default());
        Self {
            api,
            n_results,
            issued: Arc::new(AtomicU64::new(0)),
            state: Arc::new(tx),
        }
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    pub async fn search(&self, query: &str) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return SearchOutcome::Ignored;
        }

        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|st| {
            if seq > st.seq {
                st.seq = seq;
                st.query = query.to_string();
                st.searching = true;
                st.error = None;
            }
        });

        let outcome = self.api.search(query, self.n_results).await;

        let mut applied = None;
        self.state.send_if_modified(|st| {
            if st.seq != seq {
                return false;
            }
            st.searching = false;
            st.has_searched = true;
            match outcome {
                Ok(results) => {
                    applied = Some(results.len());
                    st.results = results;
                    st.error = None;
                }
                Err(e) => {
                    warn!("Search for {:?} failed: {}", query, e);
                    applied = Some(0);
                    st.results.clear();
                    st.error = Some(SEARCH_FAILED.to_string());
                }
            }
            true
        });

        match applied {
            Some(count) => SearchOutcome::Applied { count },
            None => {
                debug!("Discarding superseded results for {:?}", query);
                SearchOutcome::Superseded
            }
        }
    }

    /// Forget results and the query.  In-flight searches are superseded.
    pub fn clear(&self) {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|st| {
            *st = SearchState {
                seq,
                ..SearchState::default()
            }
        });
    }
}
