//! Reactive tracker
//!
//! One actor task per page view owns all mutable state. It receives
//! navigation requests, template loads, input changes and query completions
//! over a single channel and publishes a [`PageSnapshot`] after each one.
//!
//! Race policy: each query key has at most one run in flight. Starting a
//! new run aborts the previous one, and any completion whose generation or
//! sequence number is no longer current is dropped. A completion therefore
//! never overwrites a result produced for newer inputs, and navigating away
//! discards everything from the old page.
//!
//! The dependency map is built once per navigation. After the page's
//! queries change on the server, [`ReactiveTracker::reload`] fetches the new
//! list and rebuilds it.

use crate::client::{QueryClient, QuerySpec};
use crate::dependency::DependencyMap;
use crate::inputs::{InputChange, InputStore, Subscription};
use lence_core::{ExecError, ExecutionResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Where the current page is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageStatus {
    /// No page loaded
    #[default]
    Idle,

    /// Waiting for the page's query list
    Loading,

    /// Query list known; queries run as inputs change
    Ready,
}

/// Observable state of the current page
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub document: Option<String>,

    /// Bumped on every navigation
    pub generation: u64,

    pub status: PageStatus,

    /// Latest successful result per query
    pub results: BTreeMap<String, ExecutionResult>,

    /// Latest failure per query; cleared by the next success
    pub errors: BTreeMap<String, ExecError>,

    /// Queries with a run in flight
    pub running: BTreeSet<String>,

    /// Set when the page's query list could not be loaded
    pub page_error: Option<ExecError>,
}

impl PageSnapshot {
    /// Page ready with nothing in flight
    pub fn is_settled(&self) -> bool {
        self.status == PageStatus::Ready && self.running.is_empty()
    }

    pub fn result(&self, query: &str) -> Option<&ExecutionResult> {
        self.results.get(query)
    }

    pub fn error(&self, query: &str) -> Option<&ExecError> {
        self.errors.get(query)
    }
}

#[derive(Debug)]
enum TrackerEvent {
    Navigate {
        document: String,
        rendered: Option<BTreeSet<String>>,
    },
    Reload,
    TemplatesLoaded {
        generation: u64,
        result: Result<Vec<QuerySpec>, ExecError>,
    },
    QueryCompleted {
        generation: u64,
        query: String,
        seq: u64,
        result: Result<ExecutionResult, ExecError>,
    },
    Shutdown,
}

/// Handle to a running tracker
///
/// Dropping the handle stops the actor and aborts its in-flight queries.
pub struct ReactiveTracker {
    events: mpsc::UnboundedSender<TrackerEvent>,
    snapshots: watch::Receiver<PageSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ReactiveTracker {
    /// Spawn the actor on the current runtime
    pub fn spawn<C: QueryClient>(client: Arc<C>, inputs: Arc<InputStore>) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let (publisher, snapshots) = watch::channel(PageSnapshot::default());
        let subscription = inputs.subscribe();

        let state = TrackerState {
            client,
            inputs,
            events: events.clone(),
            publisher,
            document: None,
            generation: 0,
            status: PageStatus::Idle,
            rendered: None,
            deps: DependencyMap::default(),
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            in_flight: HashMap::new(),
            loader: None,
            page_error: None,
            next_seq: 0,
        };
        let task = tokio::spawn(state.run(receiver, subscription));

        Self {
            events,
            snapshots,
            task: Some(task),
        }
    }

    /// Show a document and run all of its queries
    pub fn navigate(&self, document: impl Into<String>) {
        self.send(TrackerEvent::Navigate {
            document: document.into(),
            rendered: None,
        });
    }

    /// Show a document, running only the queries its rendered components use
    pub fn navigate_rendering(&self, document: impl Into<String>, rendered: impl IntoIterator<Item = String>) {
        self.send(TrackerEvent::Navigate {
            document: document.into(),
            rendered: Some(rendered.into_iter().collect()),
        });
    }

    /// Re-read the current document's query list, keeping the rendered set
    ///
    /// Starts a new generation: results of the old list are discarded and
    /// every query runs again. Does nothing before the first navigation.
    pub fn reload(&self) {
        self.send(TrackerEvent::Reload);
    }

    pub fn snapshot(&self) -> PageSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<PageSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&PageSnapshot) -> bool) -> PageSnapshot {
        let mut snapshots = self.snapshots.clone();
        if let Ok(snapshot) = snapshots.wait_for(predicate).await {
            return snapshot.clone();
        }

        // Actor gone; report the last state it published
        let last = snapshots.borrow().clone();
        last
    }

    /// Stop the actor and wait for it to exit
    pub async fn shutdown(mut self) {
        self.send(TrackerEvent::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "reactive tracker exited abnormally");
            }
        }
    }

    fn send(&self, event: TrackerEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("reactive tracker is not running");
        }
    }
}

impl Drop for ReactiveTracker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A query run in flight; aborted when replaced or dropped
struct InFlight {
    seq: u64,
    handle: JoinHandle<()>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct TrackerState<C> {
    client: Arc<C>,
    inputs: Arc<InputStore>,
    events: mpsc::UnboundedSender<TrackerEvent>,
    publisher: watch::Sender<PageSnapshot>,

    document: Option<String>,
    generation: u64,
    status: PageStatus,

    /// `None` runs every query on the page
    rendered: Option<BTreeSet<String>>,

    deps: DependencyMap,
    results: BTreeMap<String, ExecutionResult>,
    errors: BTreeMap<String, ExecError>,
    in_flight: HashMap<String, InFlight>,
    loader: Option<JoinHandle<()>>,
    page_error: Option<ExecError>,
    next_seq: u64,
}

impl<C: QueryClient> TrackerState<C> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<TrackerEvent>, mut inputs: Subscription) {
        let mut inputs_open = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(TrackerEvent::Shutdown) | None => break,
                    Some(event) => self.handle(event),
                },
                change = inputs.recv(), if inputs_open => match change {
                    Some(change) => self.on_input_change(change),
                    None => inputs_open = false,
                },
            }
        }

        self.reset();
        tracing::debug!("reactive tracker stopped");
    }

    fn handle(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Navigate { document, rendered } => self.on_navigate(document, rendered),
            TrackerEvent::Reload => self.on_reload(),
            TrackerEvent::TemplatesLoaded { generation, result } => self.on_templates_loaded(generation, result),
            TrackerEvent::QueryCompleted {
                generation,
                query,
                seq,
                result,
            } => self.on_query_completed(generation, query, seq, result),
            TrackerEvent::Shutdown => {}
        }
    }

    fn on_navigate(&mut self, document: String, rendered: Option<BTreeSet<String>>) {
        self.reset();
        self.generation += 1;
        self.status = PageStatus::Loading;
        self.rendered = rendered;
        self.document = Some(document.clone());

        tracing::debug!(document = %document, generation = self.generation, "navigating");

        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        let generation = self.generation;
        self.loader = Some(tokio::spawn(async move {
            let result = client.page_queries(&document).await;
            let _ = events.send(TrackerEvent::TemplatesLoaded { generation, result });
        }));

        self.publish();
    }

    fn on_reload(&mut self) {
        let Some(document) = self.document.clone() else {
            tracing::debug!("reload before any navigation");
            return;
        };
        let rendered = self.rendered.take();
        self.on_navigate(document, rendered);
    }

    fn on_templates_loaded(&mut self, generation: u64, result: Result<Vec<QuerySpec>, ExecError>) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping query list for old page");
            return;
        }
        self.loader = None;
        self.status = PageStatus::Ready;

        match result {
            Ok(specs) => {
                self.deps = DependencyMap::build(&specs);
                let queries: Vec<String> = self
                    .deps
                    .queries()
                    .filter(|query| self.is_rendered(query))
                    .map(str::to_string)
                    .collect();

                tracing::debug!(
                    document = self.document.as_deref().unwrap_or_default(),
                    queries = queries.len(),
                    "page queries loaded"
                );
                for query in queries {
                    self.start(query);
                }
            }
            Err(err) => {
                tracing::warn!(
                    document = self.document.as_deref().unwrap_or_default(),
                    error = %err,
                    "failed to load page queries"
                );
                self.page_error = Some(err);
            }
        }

        self.publish();
    }

    fn on_input_change(&mut self, change: InputChange) {
        // Loading pages read the latest input values once their queries start
        if self.status != PageStatus::Ready {
            return;
        }

        let queries: Vec<String> = self
            .deps
            .dependents(&change.name)
            .filter(|query| self.is_rendered(query))
            .map(str::to_string)
            .collect();
        if queries.is_empty() {
            return;
        }

        tracing::debug!(input = %change.name, dependents = queries.len(), "input changed");
        for query in queries {
            self.start(query);
        }
        self.publish();
    }

    fn on_query_completed(
        &mut self,
        generation: u64,
        query: String,
        seq: u64,
        result: Result<ExecutionResult, ExecError>,
    ) {
        if generation != self.generation {
            tracing::debug!(query = %query, generation, "dropping result for old page");
            return;
        }
        if self.in_flight.get(&query).map(|run| run.seq) != Some(seq) {
            tracing::debug!(query = %query, seq, "dropping superseded result");
            return;
        }
        self.in_flight.remove(&query);

        match result {
            Ok(result) => {
                self.errors.remove(&query);
                self.results.insert(query, result);
            }
            Err(err) => {
                tracing::warn!(query = %query, kind = err.kind.as_str(), error = %err.message, "query failed");
                self.errors.insert(query, err);
            }
        }
        self.publish();
    }

    /// Run `query` with the current input values, superseding any earlier run
    fn start(&mut self, query: String) {
        let Some(document) = self.document.clone() else {
            return;
        };
        let params = match self.deps.params_of(&query) {
            Some(names) => self.inputs.params_for(names),
            None => return,
        };

        self.next_seq += 1;
        let seq = self.next_seq;
        let generation = self.generation;
        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        let key = query.clone();

        let handle = tokio::spawn(async move {
            let result = client.execute(&document, &query, params).await;
            let _ = events.send(TrackerEvent::QueryCompleted {
                generation,
                query,
                seq,
                result,
            });
        });

        // Replacing the entry aborts the superseded run
        self.in_flight.insert(key, InFlight { seq, handle });
    }

    fn is_rendered(&self, query: &str) -> bool {
        self.rendered.as_ref().map_or(true, |rendered| rendered.contains(query))
    }

    fn reset(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
        self.in_flight.clear();
        self.deps = DependencyMap::default();
        self.results.clear();
        self.errors.clear();
        self.page_error = None;
    }

    fn publish(&self) {
        self.publisher.send_replace(PageSnapshot {
            document: self.document.clone(),
            generation: self.generation,
            status: self.status,
            results: self.results.clone(),
            errors: self.errors.clone(),
            running: self.in_flight.keys().cloned().collect(),
            page_error: self.page_error.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lence_core::{ColumnInfo, ErrorKind, Params};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes each query's params back as its single row
    #[derive(Default)]
    struct EchoClient {
        specs: Mutex<Vec<QuerySpec>>,
        calls: Mutex<Vec<String>>,
    }

    impl EchoClient {
        fn new(specs: Vec<QuerySpec>) -> Self {
            Self {
                specs: Mutex::new(specs),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn replace_specs(&self, specs: Vec<QuerySpec>) {
            *self.specs.lock().unwrap() = specs;
        }

        fn calls(&self, query: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|q| *q == query).count()
        }
    }

    #[async_trait::async_trait]
    impl QueryClient for EchoClient {
        async fn page_queries(&self, document: &str) -> Result<Vec<QuerySpec>, ExecError> {
            if document == "/missing.md" {
                return Err(ExecError::not_found());
            }
            Ok(self.specs.lock().unwrap().clone())
        }

        async fn execute(&self, _document: &str, query: &str, params: Params) -> Result<ExecutionResult, ExecError> {
            self.calls.lock().unwrap().push(query.to_string());
            let row = serde_json::to_value(&params).unwrap();
            Ok(ExecutionResult::new(vec![ColumnInfo::new("params", "JSON")], vec![vec![row]]).unwrap())
        }
    }

    fn echoed(snapshot: &PageSnapshot, query: &str) -> Option<serde_json::Value> {
        snapshot.result(query).and_then(|r| r.value(0, "params")).cloned()
    }

    async fn settled(tracker: &ReactiveTracker) -> PageSnapshot {
        tokio::time::timeout(Duration::from_secs(5), tracker.wait_for(PageSnapshot::is_settled))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn navigation_runs_every_query_with_null_for_unset_inputs() {
        let client = Arc::new(EchoClient::new(vec![
            QuerySpec::from_sql("by_year", "SELECT * FROM o WHERE y = ${inputs.year.value}"),
            QuerySpec::from_sql("total", "SELECT count(*) FROM o"),
        ]));
        let tracker = ReactiveTracker::spawn(Arc::clone(&client), Arc::new(InputStore::new()));

        tracker.navigate("/sales.md");
        let page = settled(&tracker).await;

        assert_eq!(page.document.as_deref(), Some("/sales.md"));
        assert_eq!(echoed(&page, "by_year"), Some(serde_json::json!({"year": null})));
        assert_eq!(echoed(&page, "total"), Some(serde_json::json!({})));
    }

    #[tokio::test]
    async fn only_rendered_queries_run() {
        let client = Arc::new(EchoClient::new(vec![
            QuerySpec::from_sql("shown", "SELECT 1"),
            QuerySpec::from_sql("hidden", "SELECT 2"),
        ]));
        let tracker = ReactiveTracker::spawn(Arc::clone(&client), Arc::new(InputStore::new()));

        tracker.navigate_rendering("/sales.md", ["shown".to_string()]);
        let page = settled(&tracker).await;

        assert!(page.result("shown").is_some());
        assert!(page.result("hidden").is_none());
        assert_eq!(client.calls("hidden"), 0);
    }

    #[tokio::test]
    async fn page_list_failure_is_recorded() {
        let client = Arc::new(EchoClient::default());
        let tracker = ReactiveTracker::spawn(client, Arc::new(InputStore::new()));

        tracker.navigate("/missing.md");
        let page = settled(&tracker).await;

        assert_eq!(page.page_error.map(|e| e.kind), Some(ErrorKind::NotFound));
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn reload_rebuilds_dependencies_for_current_page() {
        let client = Arc::new(EchoClient::new(vec![
            QuerySpec::from_sql("shown", "SELECT ${inputs.year.value}"),
            QuerySpec::from_sql("hidden", "SELECT 2"),
        ]));
        let inputs = Arc::new(InputStore::new());
        let tracker = ReactiveTracker::spawn(Arc::clone(&client), Arc::clone(&inputs));

        tracker.navigate_rendering("/sales.md", ["shown".to_string()]);
        settled(&tracker).await;

        client.replace_specs(vec![
            QuerySpec::from_sql("shown", "SELECT ${inputs.region.value}"),
            QuerySpec::from_sql("hidden", "SELECT 2"),
        ]);
        tracker.reload();
        let page = tokio::time::timeout(
            Duration::from_secs(5),
            tracker.wait_for(|s| s.generation == 2 && s.is_settled()),
        )
        .await
        .unwrap();
        assert_eq!(page.document.as_deref(), Some("/sales.md"));
        assert_eq!(echoed(&page, "shown"), Some(serde_json::json!({"region": null})));
        assert_eq!(client.calls("hidden"), 0);

        inputs.set("region", "EU", None);
        let page = tokio::time::timeout(
            Duration::from_secs(5),
            tracker.wait_for(|s| s.running.is_empty() && echoed(s, "shown") == Some(serde_json::json!({"region": "EU"}))),
        )
        .await
        .unwrap();
        assert_eq!(page.generation, 2);
    }

    #[tokio::test]
    async fn reload_before_navigation_does_nothing() {
        let client = Arc::new(EchoClient::default());
        let tracker = ReactiveTracker::spawn(client, Arc::new(InputStore::new()));

        tracker.reload();
        tracker.navigate("/sales.md");
        let page = settled(&tracker).await;
        assert_eq!(page.generation, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_actor() {
        let tracker = ReactiveTracker::spawn(Arc::new(EchoClient::default()), Arc::new(InputStore::new()));
        tokio::time::timeout(Duration::from_secs(5), tracker.shutdown())
            .await
            .unwrap();
    }
}
