//! Search against an in-process server.

mod common;

use serde_json::json;
use vibe_client::search::SEARCH_FAILED;
use vibe_client::{SearchController, SearchOutcome};

use common::{song, MockServer};

#[tokio::test]
async fn results_keep_server_order() {
    let server = MockServer::start().await;
    let query = "driving deeply into the night";
    server.search_results(
        query,
        json!([
            song("a", "Nightcall", 0.91),
            song("b", "Midnight City", 0.84),
            song("c", "Tenebre Rosso Sangue", 0.62),
        ]),
        0,
    );
    let search = SearchController::new(server.client(), 20);

    let outcome = search.search(query).await;
    assert_eq!(outcome, SearchOutcome::Applied { count: 3 });

    let st = search.state();
    assert!(!st.searching);
    assert!(st.has_searched);
    assert_eq!(st.error, None);
    assert_eq!(st.query, query);
    let titles: Vec<_> = st.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Nightcall", "Midnight City", "Tenebre Rosso Sangue"]);
    let scores: Vec<_> = st.results.iter().map(|r| r.similarity_score).collect();
    assert_eq!(scores, [0.91, 0.84, 0.62]);
}

#[tokio::test]
async fn later_query_wins_over_slower_earlier_one() {
    let server = MockServer::start().await;
    server.search_results("slow", json!([song("s", "Slow", 0.5)]), 300);
    server.search_results("fast", json!([song("f", "Fast", 0.9)]), 0);
    let search = SearchController::new(server.client(), 20);

    let earlier = {
        let search = search.clone();
        tokio::spawn(async move { search.search("slow").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(search.state().searching);

    assert_eq!(
        search.search("fast").await,
        SearchOutcome::Applied { count: 1 }
    );
    assert_eq!(earlier.await.unwrap(), SearchOutcome::Superseded);

    let st = search.state();
    assert_eq!(st.query, "fast");
    assert_eq!(st.results[0].title, "Fast");
    assert!(!st.searching);
}

#[tokio::test]
async fn failure_clears_results() {
    let server = MockServer::start().await;
    server.search_results("ok", json!([song("a", "One", 0.7)]), 0);
    let search = SearchController::new(server.client(), 20);

    search.search("ok").await;
    assert_eq!(search.state().results.len(), 1);

    // No results configured for this query: the server answers 500.
    let outcome = search.search("unknown").await;
    assert_eq!(outcome, SearchOutcome::Applied { count: 0 });
    let st = search.state();
    assert!(st.results.is_empty());
    assert_eq!(st.error.as_deref(), Some(SEARCH_FAILED));
    assert!(!st.searching);
}

#[tokio::test]
async fn blank_query_is_not_sent() {
    let server = MockServer::start().await;
    let search = SearchController::new(server.client(), 20);
    let mut rx = search.subscribe();

    assert_eq!(search.search("   ").await, SearchOutcome::Ignored);
    assert!(!rx.has_changed().unwrap());
    assert!(!search.state().has_searched);
}

#[tokio::test]
async fn clear_supersedes_in_flight_search() {
    let server = MockServer::start().await;
    server.search_results("slow", json!([song("s", "Slow", 0.5)]), 200);
    let search = SearchController::new(server.client(), 20);

    let pending = {
        let search = search.clone();
        tokio::spawn(async move { search.search("slow").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    search.clear();

    assert_eq!(pending.await.unwrap(), SearchOutcome::Superseded);
    let st = search.state();
    assert!(st.results.is_empty());
    assert!(!st.searching);
    assert_eq!(st.query, "");
}
