use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use frameworks_client::table::{
    FetchOutcome, MemoryQueryStore, QueryStore, TableConfig, TableController, TableFetcher,
};
use frameworks_shared::{FetchError, FetchResponse, QueryParams};
use tokio::sync::{mpsc, oneshot};

type Reply = Result<FetchResponse<String>, FetchError>;

/// Each fetch waits for the test to release it.
struct Gated {
    gates: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
}

impl Gated {
    fn new(gates: Vec<oneshot::Receiver<Reply>>) -> Self {
        Self {
            gates: Mutex::new(gates.into()),
        }
    }
}

#[async_trait]
impl TableFetcher<String> for Gated {
    async fn fetch(&self, _params: QueryParams) -> Reply {
        let gate = self
            .gates
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected fetch");
        gate.await.unwrap_or_else(|_| Err(FetchError::message("gate dropped")))
    }
}

struct Hung;

#[async_trait]
impl TableFetcher<String> for Hung {
    async fn fetch(&self, _params: QueryParams) -> Reply {
        std::future::pending().await
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn rows(items: &[&str]) -> Reply {
    Ok(FetchResponse::new(items.iter().map(|s| s.to_string()).collect()))
}

#[tokio::test]
async fn late_response_from_an_older_query_is_discarded() {
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    let table = Arc::new(TableController::new(
        Gated::new(vec![first_rx, second_rx]),
        Arc::new(MemoryQueryStore::new()),
        TableConfig::default(),
    ));

    let first = tokio::spawn({
        let table = table.clone();
        async move { table.fetch_data().await }
    });
    settle().await;

    table.handle_search("iso");
    let second = tokio::spawn({
        let table = table.clone();
        async move { table.fetch_data().await }
    });
    settle().await;

    second_tx.send(rows(&["ISO 27001"])).unwrap();
    assert_eq!(second.await.unwrap(), FetchOutcome::Applied);

    first_tx.send(rows(&["SOC 2", "NIST CSF"])).unwrap();
    assert_eq!(first.await.unwrap(), FetchOutcome::Stale);

    let snapshot = table.snapshot();
    assert_eq!(snapshot.data, vec!["ISO 27001".to_string()]);
    assert_eq!(snapshot.query.search, "iso");
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn stale_completion_does_not_clear_loading() {
    let (first_tx, first_rx) = oneshot::channel();
    let (_second_tx, second_rx) = oneshot::channel::<Reply>();
    let table = Arc::new(TableController::new(
        Gated::new(vec![first_rx, second_rx]),
        Arc::new(MemoryQueryStore::new()),
        TableConfig::default(),
    ));

    let first = tokio::spawn({
        let table = table.clone();
        async move { table.fetch_data().await }
    });
    settle().await;
    let _second = tokio::spawn({
        let table = table.clone();
        async move { table.fetch_data().await }
    });
    settle().await;

    first_tx.send(rows(&["old"])).unwrap();
    assert_eq!(first.await.unwrap(), FetchOutcome::Stale);
    assert!(table.snapshot().loading);
    assert!(table.snapshot().data.is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_fetch_times_out() {
    let config = TableConfig {
        fetch_timeout: Duration::from_secs(5),
        ..TableConfig::default()
    };
    let table = TableController::new(Hung, Arc::new(MemoryQueryStore::new()), config);

    assert_eq!(table.fetch_data().await, FetchOutcome::Failed);

    let snapshot = table.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.error, Some(FetchError::Timeout(Duration::from_secs(5))));
    assert_eq!(snapshot.empty_message, "Request timed out after 5s");
}

#[tokio::test]
async fn problem_details_become_the_empty_message() {
    let (tx, rx) = oneshot::channel();
    let table = TableController::new(
        Gated::new(vec![rx]),
        Arc::new(MemoryQueryStore::new()),
        TableConfig::default(),
    );
    tx.send(Err(FetchError::Http {
        status: 403,
        body: r#"{"title":"Forbidden","detail":"Admins only"}"#.to_string(),
    }))
    .unwrap();

    assert_eq!(table.fetch_data().await, FetchOutcome::Failed);
    assert_eq!(table.snapshot().empty_message, "Admins only");
}

#[tokio::test]
async fn query_watchers_see_every_change_once() {
    let store = Arc::new(MemoryQueryStore::with_query("page=5&status=pending"));
    let table: TableController<String, Hung> =
        TableController::new(Hung, store.clone(), TableConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watch = table.watch_query(move |params| {
        let _ = tx.send(params.to_query_string());
    });

    table.handle_page_change(2);
    assert_eq!(rx.try_recv().unwrap(), "page=2&status=pending");

    // Same URL again: nothing to react to.
    table.handle_page_change(2);
    assert!(rx.try_recv().is_err());

    // Changes made by someone else (browser history) are reported too.
    store.replace(QueryParams::parse("page=1"));
    assert_eq!(rx.try_recv().unwrap(), "page=1");
    assert_eq!(table.query().page, 1);
}
