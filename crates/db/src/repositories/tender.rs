//! Tender collection persisted as one JSON document under [`TENDERS_KEY`].
//!
//! Every read loads a fresh snapshot from storage; every mutation rewrites the
//! whole collection and then publishes it to subscribers. Mutations through one
//! store are serialized, so concurrent writers in a process never drop each
//! other's changes. Writers in other processes should use
//! [`TenderStore::update_if_unmodified`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use tenderdesk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use tenderdesk_core::domain::chat::chat_storage_key;
use tenderdesk_core::domain::identity::{generate_unique_id, next_timestamp};
use tenderdesk_core::domain::tender::{
    NewTender, ProviderRef, Tender, TenderCategory, TenderId, TenderPatch, TenderState,
};
use tenderdesk_core::errors::DomainError;
use tenderdesk_core::flows::{TenderAction, TenderEvent, TenderFlow};

use super::collection::{load_collection, store_collection};
use super::{KeyValueStore, RepositoryError};

pub const TENDERS_KEY: &str = "tenders";
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(100);
const ID_PREFIX: &str = "tender";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LaunchOutcome {
    pub parent: Tender,
    pub children: Vec<Tender>,
}

pub struct TenderStore {
    storage: Arc<dyn KeyValueStore>,
    latency: Duration,
    flow: TenderFlow,
    write_lock: Mutex<()>,
    snapshots: watch::Sender<Vec<Tender>>,
    audit: Arc<dyn AuditSink>,
    context: AuditContext,
}

impl TenderStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            storage,
            latency: DEFAULT_LATENCY,
            flow: TenderFlow,
            write_lock: Mutex::new(()),
            snapshots,
            audit: Arc::new(NoopAuditSink),
            context: AuditContext::system(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }

    /// Receiver of the full collection as it stood after the latest successful
    /// mutation. Starts out empty; reads never publish.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Tender>> {
        self.snapshots.subscribe()
    }

    pub async fn list(&self) -> Result<Vec<Tender>, RepositoryError> {
        self.pause().await;
        self.load().await
    }

    /// Top-level tenders only; children are reached through their parent.
    pub async fn list_coordinators(&self) -> Result<Vec<Tender>, RepositoryError> {
        self.pause().await;
        let tenders = self.load().await?;
        Ok(tenders
            .into_iter()
            .filter(|tender| tender.category == TenderCategory::Coordinator)
            .collect())
    }

    pub async fn list_by_parent(&self, parent: &TenderId) -> Result<Vec<Tender>, RepositoryError> {
        self.pause().await;
        let tenders = self.load().await?;
        Ok(tenders.into_iter().filter(|tender| tender.is_child_of(parent)).collect())
    }

    pub async fn get_by_id(&self, id: &TenderId) -> Result<Tender, RepositoryError> {
        self.pause().await;
        self.load()
            .await?
            .into_iter()
            .find(|tender| &tender.id == id)
            .ok_or_else(|| RepositoryError::tender_not_found(id.0.clone()))
    }

    pub async fn create(&self, data: NewTender) -> Result<Tender, RepositoryError> {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut tenders = self.load().await?;
        let created = insert(&mut tenders, data, Utc::now())?;
        self.persist(tenders).await?;

        tracing::info!(
            event_name = "tender.created",
            correlation_id = %self.context.correlation_id,
            tender_id = %created.id,
            category = %created.category,
            state = %created.state,
            "tender created"
        );
        self.record(&created.id, "tender.created", AuditOutcome::Success, &[(
            "state",
            created.state.as_str().to_owned(),
        )]);

        Ok(created)
    }

    /// Creates every record in one persisted write. Either all of them are
    /// stored, in input order, or none are.
    pub async fn create_many(&self, batch: Vec<NewTender>) -> Result<Vec<Tender>, RepositoryError> {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut tenders = self.load().await?;
        let now = Utc::now();
        let mut created = Vec::with_capacity(batch.len());
        for data in batch {
            created.push(insert(&mut tenders, data, now)?);
        }
        self.persist(tenders).await?;

        tracing::info!(
            event_name = "tender.created_batch",
            correlation_id = %self.context.correlation_id,
            count = created.len(),
            "tender batch created"
        );
        for tender in &created {
            self.record(&tender.id, "tender.created", AuditOutcome::Success, &[]);
        }

        Ok(created)
    }

    pub async fn update(&self, id: &TenderId, patch: TenderPatch) -> Result<Tender, RepositoryError> {
        self.update_with(id, None, patch).await
    }

    /// Like [`TenderStore::update`], but fails with a conflict when the stored
    /// record's `updatedAt` is no longer `expected_updated_at`.
    pub async fn update_if_unmodified(
        &self,
        id: &TenderId,
        expected_updated_at: DateTime<Utc>,
        patch: TenderPatch,
    ) -> Result<Tender, RepositoryError> {
        self.update_with(id, Some(expected_updated_at), patch).await
    }

    /// Removes the tender, its children and their chat transcripts. Unknown ids
    /// are a no-op. Returns how many records were removed.
    pub async fn delete(&self, id: &TenderId) -> Result<usize, RepositoryError> {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let tenders = self.load().await?;
        let (removed, kept): (Vec<Tender>, Vec<Tender>) = tenders
            .into_iter()
            .partition(|tender| &tender.id == id || tender.is_child_of(id));

        if removed.is_empty() {
            tracing::debug!(
                event_name = "tender.delete_skipped",
                correlation_id = %self.context.correlation_id,
                tender_id = %id,
                "no tender to delete"
            );
            return Ok(0);
        }

        self.persist(kept).await?;
        for tender in &removed {
            self.storage.remove(&chat_storage_key(&tender.id)).await?;
        }

        tracing::info!(
            event_name = "tender.deleted",
            correlation_id = %self.context.correlation_id,
            tender_id = %id,
            removed = removed.len(),
            "tender deleted"
        );
        self.record(id, "tender.deleted", AuditOutcome::Success, &[(
            "removed",
            removed.len().to_string(),
        )]);

        Ok(removed.len())
    }

    /// Moves a tender along its lifecycle. This is the only way `state` changes.
    pub async fn transition(&self, id: &TenderId, event: TenderEvent) -> Result<Tender, RepositoryError> {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut tenders = self.load().await?;
        let index = position(&tenders, id)?;
        let tender = &mut tenders[index];

        let transition = match self.flow.transition(tender.category, tender.state, event) {
            Ok(transition) => transition,
            Err(error) => {
                self.record(id, "tender.transition_rejected", AuditOutcome::Rejected, &[(
                    "event",
                    event.as_str().to_owned(),
                )]);
                return Err(DomainError::from(error).into());
            }
        };

        tender.state = transition.to;
        tender.updated_at = next_timestamp(tender.updated_at);
        let updated = tender.clone();
        self.persist(tenders).await?;

        tracing::info!(
            event_name = "tender.transitioned",
            correlation_id = %self.context.correlation_id,
            tender_id = %id,
            from = %transition.from,
            to = %transition.to,
            event = %event,
            "tender transitioned"
        );
        self.record(id, "tender.transitioned", AuditOutcome::Success, &[
            ("from", transition.from.as_str().to_owned()),
            ("to", transition.to.as_str().to_owned()),
        ]);

        Ok(updated)
    }

    /// Launches a coordinator draft: it becomes pre-launched and one pending
    /// child is created per distinct provider id, all in the same write. When
    /// `providers` is empty the parent's selected provider ids are used as display
    /// names.
    pub async fn launch(
        &self,
        parent_id: &TenderId,
        providers: &[ProviderRef],
    ) -> Result<LaunchOutcome, RepositoryError> {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut tenders = self.load().await?;
        let index = position(&tenders, parent_id)?;

        let providers: Vec<ProviderRef> = if providers.is_empty() {
            tenders[index]
                .selected_providers
                .iter()
                .map(|provider| ProviderRef::new(provider.clone(), provider.clone()))
                .collect()
        } else {
            let mut unique: Vec<ProviderRef> = Vec::with_capacity(providers.len());
            for provider in providers {
                if !unique.iter().any(|seen| seen.id == provider.id) {
                    unique.push(provider.clone());
                }
            }
            unique
        };
        if providers.is_empty() {
            return Err(DomainError::InvariantViolation(
                "a tender needs at least one selected provider before launch".to_owned(),
            )
            .into());
        }

        let parent = &mut tenders[index];
        let transition = self
            .flow
            .transition(parent.category, parent.state, TenderEvent::Launch)
            .map_err(DomainError::from)?;
        parent.state = transition.to;
        parent.updated_at = next_timestamp(parent.updated_at);
        let parent = parent.clone();

        let now = Utc::now();
        let mut children = Vec::with_capacity(providers.len());
        for provider in providers {
            let data = NewTender {
                category: TenderCategory::Tendering,
                state: TenderState::Pending,
                response_deadline: parent.response_deadline,
                tender_note: parent.tender_note.clone(),
                attachment: parent.attachment.clone(),
                selected_providers: vec![provider.id],
                external_id: Some(parent.id.clone()),
                provider: Some(provider.name),
            };
            let id = generate_unique_id(ID_PREFIX, |candidate| {
                tenders.iter().any(|tender| tender.id.0 == candidate)
            });
            let child = Tender::from_new(TenderId(id), data, now);
            tenders.push(child.clone());
            children.push(child);
        }
        self.persist(tenders).await?;

        tracing::info!(
            event_name = "tender.launched",
            correlation_id = %self.context.correlation_id,
            tender_id = %parent.id,
            children = children.len(),
            "tender launched"
        );
        self.record(&parent.id, "tender.launched", AuditOutcome::Success, &[(
            "children",
            children.len().to_string(),
        )]);

        Ok(LaunchOutcome { parent, children })
    }

    /// Children of a launched tender. Only pre-launched parents reveal them.
    pub async fn expand_children(&self, parent_id: &TenderId) -> Result<Vec<Tender>, RepositoryError> {
        self.pause().await;
        let tenders = self.load().await?;
        let index = position(&tenders, parent_id)?;
        self.flow
            .ensure_permitted(TenderAction::ExpandChildren, tenders[index].state)
            .map_err(DomainError::from)?;

        Ok(tenders.into_iter().filter(|tender| tender.is_child_of(parent_id)).collect())
    }

    async fn update_with(
        &self,
        id: &TenderId,
        expected_updated_at: Option<DateTime<Utc>>,
        patch: TenderPatch,
    ) -> Result<Tender, RepositoryError> {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut tenders = self.load().await?;
        let index = position(&tenders, id)?;

        if let Some(expected) = expected_updated_at {
            let stored = tenders[index].updated_at;
            if stored != expected {
                self.record(id, "tender.update_conflict", AuditOutcome::Rejected, &[]);
                return Err(RepositoryError::Conflict(format!(
                    "tender `{id}` was modified at {} (expected {})",
                    stored.to_rfc3339(),
                    expected.to_rfc3339()
                )));
            }
        }

        self.flow
            .ensure_permitted(TenderAction::Edit, tenders[index].state)
            .map_err(DomainError::from)?;
        patch.validate(Utc::now())?;
        if let Some(parent) = &patch.external_id {
            if parent == id {
                return Err(DomainError::InvariantViolation(
                    "a tender cannot be its own parent".to_owned(),
                )
                .into());
            }
            if !tenders.iter().any(|tender| &tender.id == parent) {
                return Err(RepositoryError::tender_not_found(parent.0.clone()));
            }
        }

        let tender = &mut tenders[index];
        patch.apply_to(tender);
        tender.updated_at = next_timestamp(tender.updated_at);
        let updated = tender.clone();
        self.persist(tenders).await?;

        tracing::info!(
            event_name = "tender.updated",
            correlation_id = %self.context.correlation_id,
            tender_id = %id,
            "tender updated"
        );
        self.record(id, "tender.updated", AuditOutcome::Success, &[]);

        Ok(updated)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn load(&self) -> Result<Vec<Tender>, RepositoryError> {
        load_collection(self.storage.as_ref(), TENDERS_KEY).await
    }

    async fn persist(&self, tenders: Vec<Tender>) -> Result<(), RepositoryError> {
        store_collection(self.storage.as_ref(), TENDERS_KEY, &tenders).await?;
        self.snapshots.send_replace(tenders);
        Ok(())
    }

    fn record(
        &self,
        id: &TenderId,
        event_type: &str,
        outcome: AuditOutcome,
        metadata: &[(&str, String)],
    ) {
        let event = metadata.iter().fold(
            AuditEvent::new(
                Some(id.0.clone()),
                &self.context,
                event_type,
                AuditCategory::Tender,
                outcome,
            ),
            |event, (key, value)| event.with_metadata(*key, value.clone()),
        );
        self.audit.emit(event);
    }
}

fn position(tenders: &[Tender], id: &TenderId) -> Result<usize, RepositoryError> {
    tenders
        .iter()
        .position(|tender| &tender.id == id)
        .ok_or_else(|| RepositoryError::tender_not_found(id.0.clone()))
}

fn insert(
    tenders: &mut Vec<Tender>,
    data: NewTender,
    now: DateTime<Utc>,
) -> Result<Tender, RepositoryError> {
    data.validate(now)?;
    if let Some(parent) = &data.external_id {
        if !tenders.iter().any(|tender| &tender.id == parent) {
            return Err(RepositoryError::tender_not_found(parent.0.clone()));
        }
    }

    let id =
        generate_unique_id(ID_PREFIX, |candidate| tenders.iter().any(|tender| tender.id.0 == candidate));
    let tender = Tender::from_new(TenderId(id), data, now);
    tenders.push(tender.clone());
    Ok(tender)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tenderdesk_core::domain::tender::{NewTender, ResponseDeadline, TenderState};

    use super::{TenderStore, TENDERS_KEY};
    use crate::repositories::{InMemoryKeyValueStore, KeyValueStore};

    fn draft(providers: &[&str]) -> NewTender {
        NewTender::coordinator_draft(
            ResponseDeadline::parse("2099-01-01T10:00").expect("deadline"),
            providers.iter().map(|provider| (*provider).to_owned()).collect(),
        )
    }

    #[tokio::test]
    async fn subscribers_see_snapshots_after_mutations_only() {
        let store = TenderStore::new(Arc::new(InMemoryKeyValueStore::default()))
            .with_latency(Duration::ZERO);
        let mut receiver = store.subscribe();

        store.list().await.expect("list");
        assert!(!receiver.has_changed().expect("sender alive"));

        let created = store.create(draft(&["p1"])).await.expect("create");
        assert!(receiver.has_changed().expect("sender alive"));
        let snapshot = receiver.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, created.id);
    }

    #[tokio::test]
    async fn failed_mutation_publishes_nothing() {
        let store = TenderStore::new(Arc::new(InMemoryKeyValueStore::default()))
            .with_latency(Duration::ZERO);
        let created = store.create(draft(&["p1"])).await.expect("create");
        store.transition(&created.id, tenderdesk_core::flows::TenderEvent::Send).await.expect("send");

        let receiver = store.subscribe();
        let error = store
            .transition(&created.id, tenderdesk_core::flows::TenderEvent::Launch)
            .await
            .expect_err("sent tenders cannot launch");
        assert!(error.to_string().contains("does not accept event launch"));
        assert!(!receiver.has_changed().expect("sender alive"));
        assert_eq!(store.get_by_id(&created.id).await.expect("get").state, TenderState::Sent);
    }

    #[tokio::test]
    async fn latency_is_applied_to_reads() {
        let store = TenderStore::new(Arc::new(InMemoryKeyValueStore::default()))
            .with_latency(Duration::from_millis(20));
        let started = tokio::time::Instant::now();
        store.list().await.expect("list");
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn corrupt_collection_is_overwritten_by_next_write() {
        let storage = Arc::new(InMemoryKeyValueStore::with_entries([(TENDERS_KEY, "[{broken")]));
        let store = TenderStore::new(storage.clone()).with_latency(Duration::ZERO);

        assert!(store.list().await.expect("list").is_empty());
        store.create(draft(&["p1"])).await.expect("create");

        let raw = storage.get(TENDERS_KEY).await.expect("get").expect("stored");
        assert!(raw.starts_with('['));
        assert_eq!(store.list().await.expect("list").len(), 1);
    }
}
