//! Mock paper server for testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{ApiError, ApiFuture, PaperApi};
use crate::query::PaperQuery;
use crate::{CustomTag, Paper, PaperId, PaperPage, StatusKind, TagRef};

/// A configurable reply to a mutating call (status toggle, tag assign/remove).
#[derive(Clone, Debug)]
pub enum MockResponse {
    Ok,
    /// `success: false` with this error message.
    Rejected(String),
    /// Non-2xx without an envelope.
    HttpStatus(u16),
    /// Wait before producing the inner reply.
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        MockResponse::Delayed(delay, Box::new(inner))
    }
}

/// A mutating request as the mock received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    SetStatus {
        kind: StatusKind,
        paper_id: PaperId,
        value: bool,
    },
    AssignTag {
        paper_id: PaperId,
        tag_id: i64,
    },
    RemoveTag {
        paper_id: PaperId,
        tag_id: i64,
    },
}

/// A hand-rolled mock implementing [`PaperApi`] for tests.
///
/// Read-only endpoints serve fixed data. Mutating endpoints consume a
/// sequence of [`MockResponse`]s, one per call, and fall back to a fixed
/// response once the sequence is exhausted. Every mutating call is recorded.
pub struct MockApi {
    papers: Vec<Paper>,
    taxonomy: Vec<CustomTag>,
    paper_tags: HashMap<PaperId, Vec<TagRef>>,
    read: Vec<PaperId>,
    favorites: Vec<PaperId>,
    categories: Vec<String>,
    /// Status-set fetches fail with this status when set.
    status_set_failure: Option<u16>,
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    calls: Mutex<Vec<MockCall>>,
    paper_queries: Mutex<Vec<PaperQuery>>,
    taxonomy_fetches: Mutex<usize>,
    paper_tag_fetches: Mutex<Vec<PaperId>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockApi {
    /// A mock with no data whose mutations all succeed.
    pub fn new() -> Self {
        Self {
            papers: Vec::new(),
            taxonomy: Vec::new(),
            paper_tags: HashMap::new(),
            read: Vec::new(),
            favorites: Vec::new(),
            categories: Vec::new(),
            status_set_failure: None,
            responses: Mutex::new(Vec::new()),
            fallback: MockResponse::Ok,
            calls: Mutex::new(Vec::new()),
            paper_queries: Mutex::new(Vec::new()),
            taxonomy_fetches: Mutex::new(0),
            paper_tag_fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_papers(mut self, papers: Vec<Paper>) -> Self {
        self.papers = papers;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: Vec<CustomTag>) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn with_paper_tags(mut self, paper_id: impl Into<PaperId>, tags: Vec<TagRef>) -> Self {
        self.paper_tags.insert(paper_id.into(), tags);
        self
    }

    pub fn with_status_set(mut self, kind: StatusKind, ids: Vec<PaperId>) -> Self {
        match kind {
            StatusKind::Read => self.read = ids,
            StatusKind::Favorite => self.favorites = ids,
        }
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_status_set_failure(mut self, status: u16) -> Self {
        self.status_set_failure = Some(status);
        self
    }

    /// Replies for successive mutating calls, in order.
    pub fn with_sequence(self, responses: Vec<MockResponse>) -> Self {
        let mut responses = responses;
        // Reverse so we can pop() the next one.
        responses.reverse();
        *self.responses.lock().unwrap() = responses;
        self
    }

    /// Reply used once the sequence is exhausted.
    pub fn with_fallback(mut self, response: MockResponse) -> Self {
        self.fallback = response;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn paper_queries(&self) -> Vec<PaperQuery> {
        self.paper_queries.lock().unwrap().clone()
    }

    pub fn taxonomy_fetches(&self) -> usize {
        *self.taxonomy_fetches.lock().unwrap()
    }

    pub fn paper_tag_fetches(&self) -> Vec<PaperId> {
        self.paper_tag_fetches.lock().unwrap().clone()
    }

    fn mutate(&self, call: MockCall) -> ApiFuture<'_, ()> {
        self.calls.lock().unwrap().push(call);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(resolve(response))
    }
}

async fn resolve(mut response: MockResponse) -> Result<(), ApiError> {
    loop {
        match response {
            MockResponse::Ok => return Ok(()),
            MockResponse::Rejected(msg) => return Err(ApiError::Rejected(msg)),
            MockResponse::HttpStatus(code) => return Err(ApiError::Status(code)),
            MockResponse::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                response = *inner;
            }
        }
    }
}

impl PaperApi for MockApi {
    fn fetch_papers<'a>(&'a self, query: &'a PaperQuery) -> ApiFuture<'a, PaperPage> {
        self.paper_queries.lock().unwrap().push(query.clone());
        let papers = self.papers.clone();
        Box::pin(async move {
            Ok(PaperPage {
                papers,
                pagination: None,
            })
        })
    }

    fn set_status<'a>(
        &'a self,
        kind: StatusKind,
        paper_id: &'a PaperId,
        value: bool,
    ) -> ApiFuture<'a, ()> {
        self.mutate(MockCall::SetStatus {
            kind,
            paper_id: paper_id.clone(),
            value,
        })
    }

    fn fetch_status_set(&self, kind: StatusKind) -> ApiFuture<'_, Vec<PaperId>> {
        let result = match self.status_set_failure {
            Some(code) => Err(ApiError::Status(code)),
            None => Ok(match kind {
                StatusKind::Read => self.read.clone(),
                StatusKind::Favorite => self.favorites.clone(),
            }),
        };
        Box::pin(async move { result })
    }

    fn fetch_taxonomy(&self) -> ApiFuture<'_, Vec<CustomTag>> {
        *self.taxonomy_fetches.lock().unwrap() += 1;
        let taxonomy = self.taxonomy.clone();
        Box::pin(async move { Ok(taxonomy) })
    }

    fn fetch_paper_tags<'a>(&'a self, paper_id: &'a PaperId) -> ApiFuture<'a, Vec<TagRef>> {
        self.paper_tag_fetches.lock().unwrap().push(paper_id.clone());
        let tags = self.paper_tags.get(paper_id).cloned().unwrap_or_default();
        Box::pin(async move { Ok(tags) })
    }

    fn assign_tag<'a>(&'a self, paper_id: &'a PaperId, tag_id: i64) -> ApiFuture<'a, ()> {
        self.mutate(MockCall::AssignTag {
            paper_id: paper_id.clone(),
            tag_id,
        })
    }

    fn remove_tag<'a>(&'a self, paper_id: &'a PaperId, tag_id: i64) -> ApiFuture<'a, ()> {
        self.mutate(MockCall::RemoveTag {
            paper_id: paper_id.clone(),
            tag_id,
        })
    }

    fn fetch_categories(&self) -> ApiFuture<'_, Vec<String>> {
        let categories = self.categories.clone();
        Box::pin(async move { Ok(categories) })
    }

    fn fetch_fulltext<'a>(&'a self, paper_id: &'a PaperId) -> ApiFuture<'a, String> {
        Box::pin(async move { Ok(format!("full text of {}", paper_id)) })
    }
}
