//! Status sync controller: the optimistic read/favorite protocol and the
//! tag-cache consistency protocol.
//!
//! Read and favorite toggles are applied to the in-memory set and announced
//! to observers before the request is sent, written through to the local
//! cache, and rolled back if the server does not confirm them. Every toggle
//! takes a sequence number for its (kind, paper). Only the newest toggle still
//! in flight owns the optimistic value: a failure of an older one, or of one
//! already overtaken by a confirmed newer toggle, is stale and dropped. When
//! the owner fails and rolls back, ownership passes to the next older toggle
//! still in flight.
//!
//! Tag assignments are the opposite: nothing is applied until the server has
//! accepted the change, so failures need no rollback.
//!
//! The controller never renders anything. Front-ends subscribe to
//! [`SyncEvent`]s and redraw from [`SyncController::card`].

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{ApiError, PaperApi};
use crate::store::LocalStore;
use crate::tags::{PaperTagCache, TagTaxonomy};
use crate::{CustomTag, Paper, PaperId, PaperPage, StatusKind, SyncError, TagRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message meant for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// State changes announced to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A flag changed in memory (optimistic apply or rollback).
    StatusChanged {
        kind: StatusKind,
        paper_id: PaperId,
        value: bool,
    },
    /// A whole set was replaced from the server.
    StatusReloaded { kind: StatusKind },
    /// A paper's tag list changed after a confirmed assign/remove.
    TagsChanged {
        paper_id: PaperId,
        tags: Vec<TagRef>,
    },
    Notice(Notice),
}

/// How a toggle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The server accepted the new value.
    Confirmed,
    /// The server refused or was unreachable; the old value was restored.
    RolledBack(String),
    /// The request failed, but a newer toggle of the same flag was still in
    /// flight or already confirmed, so the failure was ignored.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The user declined; nothing was sent.
    Cancelled,
}

/// Gate for destructive actions.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Everything a renderer needs for one paper.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperCard {
    pub paper: Paper,
    pub is_read: bool,
    pub is_favorite: bool,
    pub tags: Vec<TagRef>,
}

type Observer = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// One boolean flag across all papers, plus the toggles still in flight.
#[derive(Debug, Default)]
struct FlagSet {
    members: BTreeSet<PaperId>,
    /// Sequence numbers of unsettled toggles per paper, oldest first. The
    /// last entry owns the paper's optimistic value.
    in_flight: HashMap<PaperId, Vec<u64>>,
    next_seq: u64,
}

impl FlagSet {
    fn from_ids(ids: Vec<PaperId>) -> Self {
        Self {
            members: ids.into_iter().collect(),
            ..Default::default()
        }
    }

    fn set(&mut self, paper_id: &PaperId, value: bool) {
        if value {
            self.members.insert(paper_id.clone());
        } else {
            self.members.remove(paper_id);
        }
    }

    fn begin(&mut self, paper_id: &PaperId) -> u64 {
        self.next_seq += 1;
        self.in_flight
            .entry(paper_id.clone())
            .or_default()
            .push(self.next_seq);
        self.next_seq
    }

    /// The server accepted request `seq`. Older requests for the paper can
    /// no longer affect its value, so they are dropped with it.
    fn confirm(&mut self, paper_id: &PaperId, seq: u64) {
        if let Some(pending) = self.in_flight.get_mut(paper_id) {
            pending.retain(|&s| s > seq);
            if pending.is_empty() {
                self.in_flight.remove(paper_id);
            }
        }
    }

    /// Request `seq` failed. Returns whether it owned the optimistic value,
    /// i.e. was the newest request still in flight. Removing it hands
    /// ownership back to the next older one, whose own failure then rolls
    /// back again.
    fn fail(&mut self, paper_id: &PaperId, seq: u64) -> bool {
        let Some(pending) = self.in_flight.get_mut(paper_id) else {
            return false;
        };
        let Some(pos) = pending.iter().position(|&s| s == seq) else {
            return false;
        };
        let newest = pos + 1 == pending.len();
        pending.remove(pos);
        if pending.is_empty() {
            self.in_flight.remove(paper_id);
        }
        newest
    }

    fn has_in_flight(&self, paper_id: &PaperId) -> bool {
        self.in_flight.contains_key(paper_id)
    }

    /// Replace membership with the server's, except for papers whose toggle
    /// is still in flight: those keep their optimistic value.
    fn replace(&mut self, ids: Vec<PaperId>) {
        let mut members: BTreeSet<PaperId> = ids
            .into_iter()
            .filter(|id| !self.has_in_flight(id))
            .collect();
        for id in self.in_flight.keys() {
            if self.members.contains(id) {
                members.insert(id.clone());
            }
        }
        self.members = members;
    }

    fn snapshot(&self) -> Vec<PaperId> {
        self.members.iter().cloned().collect()
    }
}

#[derive(Debug, Default)]
struct SyncState {
    read: FlagSet,
    favorite: FlagSet,
    tags: PaperTagCache,
    taxonomy: TagTaxonomy,
}

impl SyncState {
    fn flags(&self, kind: StatusKind) -> &FlagSet {
        match kind {
            StatusKind::Read => &self.read,
            StatusKind::Favorite => &self.favorite,
        }
    }

    fn flags_mut(&mut self, kind: StatusKind) -> &mut FlagSet {
        match kind {
            StatusKind::Read => &mut self.read,
            StatusKind::Favorite => &mut self.favorite,
        }
    }
}

/// Owns the read/favorite sets, the tag cache and the taxonomy for one session.
pub struct SyncController {
    api: Arc<dyn PaperApi>,
    store: Arc<dyn LocalStore>,
    state: Mutex<SyncState>,
    observers: Mutex<Vec<Observer>>,
}

impl SyncController {
    /// Create a controller whose sets start from the local cache.
    pub fn new(api: Arc<dyn PaperApi>, store: Arc<dyn LocalStore>) -> Self {
        let state = SyncState {
            read: FlagSet::from_ids(store.load(StatusKind::Read.storage_key())),
            favorite: FlagSet::from_ids(store.load(StatusKind::Favorite.storage_key())),
            ..Default::default()
        };
        tracing::debug!(
            read = state.read.members.len(),
            favorite = state.favorite.members.len(),
            "seeded status sets from local cache"
        );
        Self {
            api,
            store,
            state: Mutex::new(state),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn api(&self) -> &dyn PaperApi {
        self.api.as_ref()
    }

    /// Register a callback for every subsequent [`SyncEvent`].
    pub fn subscribe(&self, observer: impl Fn(&SyncEvent) + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(observer));
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SyncEvent) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            observer(&event);
        }
    }

    // ── Status flags ───────────────────────────────────────────────────

    pub fn is_set(&self, kind: StatusKind, paper_id: &PaperId) -> bool {
        self.state().flags(kind).members.contains(paper_id)
    }

    pub fn is_read(&self, paper_id: &PaperId) -> bool {
        self.is_set(StatusKind::Read, paper_id)
    }

    pub fn is_favorite(&self, paper_id: &PaperId) -> bool {
        self.is_set(StatusKind::Favorite, paper_id)
    }

    /// Current members of one set, in id order.
    pub fn status_set(&self, kind: StatusKind) -> Vec<PaperId> {
        self.state().flags(kind).snapshot()
    }

    /// Flip one flag, given the value the user currently sees.
    pub async fn toggle_status(
        &self,
        kind: StatusKind,
        paper_id: &PaperId,
        current: bool,
    ) -> ToggleOutcome {
        let target = !current;

        let (seq, snapshot) = {
            let mut state = self.state();
            let flags = state.flags_mut(kind);
            flags.set(paper_id, target);
            let seq = flags.begin(paper_id);
            (seq, flags.snapshot())
        };
        tracing::debug!(%kind, paper_id = %paper_id, value = target, seq, "applied toggle");
        self.emit(SyncEvent::StatusChanged {
            kind,
            paper_id: paper_id.clone(),
            value: target,
        });
        self.store.save(kind.storage_key(), &snapshot);

        let result = self.api.set_status(kind, paper_id, target).await;

        let e = match result {
            Ok(()) => {
                self.state().flags_mut(kind).confirm(paper_id, seq);
                return ToggleOutcome::Confirmed;
            }
            Err(e) => e,
        };

        let owned = {
            let mut state = self.state();
            let flags = state.flags_mut(kind);
            let owned = flags.fail(paper_id, seq);
            if owned {
                flags.set(paper_id, current);
            }
            owned
        };
        if !owned {
            tracing::debug!(%kind, paper_id = %paper_id, seq, error = %e, "ignoring stale toggle failure");
            return ToggleOutcome::Superseded;
        }

        tracing::warn!(%kind, paper_id = %paper_id, error = %e, "toggle failed, rolling back");
        self.emit(SyncEvent::StatusChanged {
            kind,
            paper_id: paper_id.clone(),
            value: current,
        });
        let message = failure_message(&format!("Failed to save {} status", kind), &e);
        self.emit(SyncEvent::Notice(Notice::error(message.clone())));
        ToggleOutcome::RolledBack(message)
    }

    /// Flip one flag from the controller's own view of it.
    pub async fn toggle(&self, kind: StatusKind, paper_id: &PaperId) -> ToggleOutcome {
        let current = self.is_set(kind, paper_id);
        self.toggle_status(kind, paper_id, current).await
    }

    /// Opening a paper marks it read. Returns `None` if it already was.
    pub async fn mark_opened(&self, paper_id: &PaperId) -> Option<ToggleOutcome> {
        if self.is_read(paper_id) {
            return None;
        }
        Some(self.toggle_status(StatusKind::Read, paper_id, false).await)
    }

    /// Replace both sets with the server's copy and rewrite the local cache.
    ///
    /// Each set is loaded independently; one that fails to load keeps its
    /// cached value. Returns the last failure, if any.
    pub async fn load_preferences(&self) -> Result<(), SyncError> {
        let mut failure = None;
        for kind in [StatusKind::Read, StatusKind::Favorite] {
            match self.api.fetch_status_set(kind).await {
                Ok(ids) => {
                    let snapshot = {
                        let mut state = self.state();
                        let flags = state.flags_mut(kind);
                        flags.replace(ids);
                        flags.snapshot()
                    };
                    tracing::debug!(%kind, count = snapshot.len(), "loaded status set from server");
                    self.store.save(kind.storage_key(), &snapshot);
                    self.emit(SyncEvent::StatusReloaded { kind });
                }
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "failed to load status set from server");
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // ── Tags ───────────────────────────────────────────────────────────

    /// Seed state embedded in a fetched page: tag assignments, and the
    /// read/favorite flags of papers with no toggle in flight.
    pub fn absorb_page(&self, page: &PaperPage) {
        let mut reloaded = Vec::new();
        {
            let mut state = self.state();
            for paper in &page.papers {
                if let Some(tags) = &paper.custom_tags {
                    state.tags.seed(paper.paper_url.clone(), tags.clone());
                }
            }
            for kind in [StatusKind::Read, StatusKind::Favorite] {
                let flags = state.flags_mut(kind);
                let mut changed = false;
                for paper in &page.papers {
                    let id = &paper.paper_url;
                    if let Some(value) = paper.status(kind)
                        && !flags.has_in_flight(id)
                        && flags.members.contains(id) != value
                    {
                        flags.set(id, value);
                        changed = true;
                    }
                }
                if changed {
                    reloaded.push((kind, flags.snapshot()));
                }
            }
        }
        for (kind, snapshot) in reloaded {
            tracing::debug!(%kind, count = snapshot.len(), "absorbed status flags from listing");
            self.store.save(kind.storage_key(), &snapshot);
            self.emit(SyncEvent::StatusReloaded { kind });
        }
    }

    /// Cached tags of a paper; empty if none are known.
    pub fn paper_tags(&self, paper_id: &PaperId) -> Vec<TagRef> {
        self.state().tags.get(paper_id).to_vec()
    }

    /// Fetch a paper's assignments from the server unless already cached.
    pub async fn ensure_paper_tags_loaded(
        &self,
        paper_id: &PaperId,
    ) -> Result<Vec<TagRef>, SyncError> {
        if self.state().tags.contains(paper_id) {
            return Ok(self.paper_tags(paper_id));
        }
        let tags = self.api.fetch_paper_tags(paper_id).await?;
        let mut state = self.state();
        // An assignment may have landed while the request was out.
        if !state.tags.contains(paper_id) {
            state.tags.seed(paper_id.clone(), tags);
        }
        Ok(state.tags.get(paper_id).to_vec())
    }

    /// Fetch the tag taxonomy once per session.
    pub async fn ensure_taxonomy_loaded(&self) -> Result<(), SyncError> {
        if !self.state().taxonomy.is_empty() {
            return Ok(());
        }
        let roots = self.api.fetch_taxonomy().await.inspect_err(|e| {
            tracing::warn!(error = %e, "failed to load tag taxonomy");
        })?;
        tracing::debug!(roots = roots.len(), "loaded tag taxonomy");
        self.state().taxonomy = TagTaxonomy::new(roots);
        Ok(())
    }

    pub fn taxonomy(&self) -> TagTaxonomy {
        self.state().taxonomy.clone()
    }

    /// Resolve a tag id through the taxonomy, loading it if needed.
    pub async fn resolve_tag(&self, tag_id: i64) -> Result<TagRef, SyncError> {
        self.ensure_taxonomy_loaded().await?;
        self.state()
            .taxonomy
            .find(tag_id)
            .map(CustomTag::to_tag_ref)
            .ok_or(SyncError::UnknownTag(tag_id))
    }

    /// Assign a tag. The cache only changes once the server accepts it.
    pub async fn assign_tag(
        &self,
        paper_id: &PaperId,
        tag_id: i64,
        tag_name: &str,
    ) -> Result<(), SyncError> {
        match self.api.assign_tag(paper_id, tag_id).await {
            Ok(()) => {
                let tags = {
                    let mut state = self.state();
                    state.tags.insert(paper_id, TagRef::new(tag_id, tag_name));
                    state.tags.get(paper_id).to_vec()
                };
                tracing::debug!(paper_id = %paper_id, tag_id, "tag assigned");
                self.emit(SyncEvent::TagsChanged {
                    paper_id: paper_id.clone(),
                    tags,
                });
                self.emit(SyncEvent::Notice(Notice::info(format!(
                    "Added tag \"{}\"",
                    tag_name
                ))));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(paper_id = %paper_id, tag_id, error = %e, "tag assignment failed");
                let message = failure_message(&format!("Failed to add tag \"{}\"", tag_name), &e);
                self.emit(SyncEvent::Notice(Notice::error(message)));
                Err(e.into())
            }
        }
    }

    /// Remove a tag after the user confirms.
    pub async fn remove_tag(
        &self,
        paper_id: &PaperId,
        tag_id: i64,
        tag_name: &str,
        confirm: &dyn Confirm,
    ) -> Result<RemoveOutcome, SyncError> {
        if !confirm.confirm(&format!("Remove tag \"{}\"?", tag_name)) {
            tracing::debug!(paper_id = %paper_id, tag_id, "tag removal cancelled");
            return Ok(RemoveOutcome::Cancelled);
        }

        match self.api.remove_tag(paper_id, tag_id).await {
            Ok(()) => {
                let tags = {
                    let mut state = self.state();
                    state.tags.remove(paper_id, tag_id);
                    state.tags.get(paper_id).to_vec()
                };
                tracing::debug!(paper_id = %paper_id, tag_id, "tag removed");
                self.emit(SyncEvent::TagsChanged {
                    paper_id: paper_id.clone(),
                    tags,
                });
                self.emit(SyncEvent::Notice(Notice::info(format!(
                    "Removed tag \"{}\"",
                    tag_name
                ))));
                Ok(RemoveOutcome::Removed)
            }
            Err(e) => {
                tracing::warn!(paper_id = %paper_id, tag_id, error = %e, "tag removal failed");
                let message =
                    failure_message(&format!("Failed to remove tag \"{}\"", tag_name), &e);
                self.emit(SyncEvent::Notice(Notice::error(message)));
                Err(e.into())
            }
        }
    }

    // ── Views ──────────────────────────────────────────────────────────

    pub fn card(&self, paper: &Paper) -> PaperCard {
        let state = self.state();
        PaperCard {
            paper: paper.clone(),
            is_read: state.read.members.contains(&paper.paper_url),
            is_favorite: state.favorite.members.contains(&paper.paper_url),
            tags: state.tags.get(&paper.paper_url).to_vec(),
        }
    }

    pub fn cards(&self, papers: &[Paper]) -> Vec<PaperCard> {
        papers.iter().map(|p| self.card(p)).collect()
    }
}

/// Server rejections are shown verbatim; anything else gets context.
fn failure_message(context: &str, err: &ApiError) -> String {
    match err {
        ApiError::Rejected(message) => message.clone(),
        other => format!("{}: {}", context, other),
    }
}
