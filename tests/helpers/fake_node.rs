#![allow(dead_code)]
//! An in-memory PhishDetect Node for driving the poller and sync logic.

use async_trait::async_trait;
use pdtools::{
    core::{FetchRequest, IndicatorSet, IndicatorSubmission, NodeApi, Record, RecordKind},
    node::NodeError,
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
};

/// Serves scripted responses per record kind. Once a kind's queue is
/// exhausted the node keeps answering with that kind's standing records,
/// windowed by `limit`/`offset` for paged requests.
#[derive(Default)]
pub struct FakeNode {
    scripted: Mutex<HashMap<RecordKind, VecDeque<Result<Vec<Record>, NodeError>>>>,
    standing: Mutex<HashMap<RecordKind, Vec<Record>>>,
    fetches: Mutex<Vec<FetchRequest>>,
    indicators: Mutex<HashMap<bool, IndicatorSet>>,
    indicator_fetches: Mutex<Vec<bool>>,
    submissions: Mutex<Vec<IndicatorSubmission>>,
    failing_submissions: Mutex<HashSet<usize>>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, kind: RecordKind, records: Vec<Record>) -> Self {
        self.standing.lock().unwrap().insert(kind, records);
        self
    }

    pub fn push_response(&self, kind: RecordKind, response: Result<Vec<Record>, NodeError>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(response);
    }

    /// Sets what `fetch_indicators(recent)` returns.
    pub fn with_indicators(self, recent: bool, set: IndicatorSet) -> Self {
        self.indicators.lock().unwrap().insert(recent, set);
        self
    }

    /// Makes the `n`th call (zero-based) to `add_indicators` fail.
    pub fn fail_submission(self, n: usize) -> Self {
        self.failing_submissions.lock().unwrap().insert(n);
        self
    }

    pub fn fetches(&self) -> Vec<FetchRequest> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, kind: RecordKind) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub fn indicator_fetches(&self) -> Vec<bool> {
        self.indicator_fetches.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<IndicatorSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeApi for FakeNode {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>, NodeError> {
        self.fetches.lock().unwrap().push(request.clone());
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => response,
            None => {
                let standing = self
                    .standing
                    .lock()
                    .unwrap()
                    .get(&request.kind)
                    .cloned()
                    .unwrap_or_default();
                Ok(match request.page {
                    Some(page) => standing
                        .into_iter()
                        .skip(page.offset)
                        .take(page.limit)
                        .collect(),
                    None => standing,
                })
            }
        }
    }

    async fn fetch_indicators(&self, recent: bool) -> Result<IndicatorSet, NodeError> {
        self.indicator_fetches.lock().unwrap().push(recent);
        Ok(self
            .indicators
            .lock()
            .unwrap()
            .get(&recent)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_indicators(&self, submission: &IndicatorSubmission) -> Result<String, NodeError> {
        let mut submissions = self.submissions.lock().unwrap();
        let n = submissions.len();
        submissions.push(submission.clone());
        if self.failing_submissions.lock().unwrap().contains(&n) {
            return Err(NodeError::Status {
                status: 500,
                body: "database unavailable".to_string(),
            });
        }
        Ok(format!("Added {} indicators", submission.indicators.len()))
    }
}

/// A real transport failure, obtained by connecting to a port nothing
/// listens on.
pub async fn transport_error() -> NodeError {
    let err = reqwest::Client::new()
        .get("http://127.0.0.1:1/")
        .send()
        .await
        .expect_err("nothing should listen on port 1");
    NodeError::Transport(err)
}
