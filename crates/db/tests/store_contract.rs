use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tenderdesk_core::attachment::{encode_file, Attachment};
use tenderdesk_core::domain::quote::{NewQuote, QuoteItemState};
use tenderdesk_core::domain::tender::{
    NewTender, ProviderRef, ResponseDeadline, TenderCategory, TenderId, TenderPatch, TenderState,
};
use tenderdesk_core::flows::{QuoteAction, QuoteFlow, TenderEvent};
use tenderdesk_db::repositories::tender::TENDERS_KEY;
use tenderdesk_db::{
    connect_with_settings, migrations, ChatTranscripts, InMemoryKeyValueStore, KeyValueStore,
    QuoteStore, RepositoryError, SqlKeyValueStore, TenderStore,
};

fn deadline() -> ResponseDeadline {
    ResponseDeadline::parse("2099-01-01T10:00").expect("deadline")
}

fn draft(providers: &[&str]) -> NewTender {
    NewTender::coordinator_draft(
        deadline(),
        providers.iter().map(|provider| (*provider).to_owned()).collect(),
    )
}

fn child_of(parent: &TenderId, provider: &str) -> NewTender {
    NewTender {
        category: TenderCategory::Tendering,
        state: TenderState::Pending,
        provider: Some(provider.to_owned()),
        ..draft(&[provider]).with_parent(parent.clone())
    }
}

fn memory_store() -> TenderStore {
    TenderStore::new(Arc::new(InMemoryKeyValueStore::default())).with_latency(Duration::ZERO)
}

#[tokio::test]
async fn create_stores_exactly_the_given_record() {
    let store = memory_store();
    assert!(store.list().await.expect("empty list").is_empty());

    let created = store.create(draft(&["p1"])).await.expect("create");
    let all = store.list().await.expect("list");

    assert_eq!(all.len(), 1);
    assert_eq!(all[0], created);
    assert_eq!(created.category, TenderCategory::Coordinator);
    assert_eq!(created.state, TenderState::Draft);
    assert_eq!(created.response_deadline.to_string(), "2099-01-01T10:00");
    assert_eq!(created.selected_providers, vec!["p1".to_owned()]);
    assert_eq!(created.created_at, created.updated_at);
    assert!(created.id.0.starts_with("tender_"));
}

#[tokio::test]
async fn create_many_appends_in_call_then_array_order() {
    let store = memory_store();

    let first = store.create_many(vec![draft(&["a"]), draft(&["b"])]).await.expect("first batch");
    let second = store.create_many(vec![draft(&["c"])]).await.expect("second batch");

    let all = store.list().await.expect("list");
    assert_eq!(all.len(), 3);

    let ids: HashSet<_> = all.iter().map(|tender| tender.id.clone()).collect();
    assert_eq!(ids.len(), 3);

    let order: Vec<_> = all.iter().map(|tender| tender.selected_providers[0].as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(all[0].id, first[0].id);
    assert_eq!(all[2].id, second[0].id);
    assert!(all.iter().all(|tender| tender.created_at == tender.updated_at));
}

#[tokio::test]
async fn create_many_is_all_or_nothing() {
    let store = memory_store();
    let past = NewTender::coordinator_draft(
        ResponseDeadline::parse("2001-01-01T10:00").expect("deadline"),
        vec!["p1".to_owned()],
    );

    let error = store.create_many(vec![draft(&["ok"]), past]).await.expect_err("past deadline");
    assert!(matches!(error, RepositoryError::Domain(_)));
    assert!(store.list().await.expect("list").is_empty());
}

#[tokio::test]
async fn update_merges_fields_and_bumps_updated_at() {
    let store = memory_store();
    let created = store.create(draft(&["p1", "p2"]).with_note("original")).await.expect("create");

    let first = store
        .update(&created.id, TenderPatch { tender_note: Some("revised".to_owned()), ..TenderPatch::default() })
        .await
        .expect("first update");
    let second = store
        .update(&created.id, TenderPatch { selected_providers: Some(vec!["p3".to_owned()]), ..TenderPatch::default() })
        .await
        .expect("second update");

    assert_eq!(second.id, created.id);
    assert_eq!(second.created_at, created.created_at);
    assert_eq!(second.response_deadline, created.response_deadline);
    assert_eq!(second.tender_note.as_deref(), Some("revised"));
    assert_eq!(second.selected_providers, vec!["p3".to_owned()]);
    assert!(first.updated_at > created.updated_at);
    assert!(second.updated_at > first.updated_at);
}

#[tokio::test]
async fn update_of_missing_id_is_not_found_and_delete_is_a_no_op() {
    let store = memory_store();
    store.create(draft(&["p1"])).await.expect("create");
    let missing = TenderId("tender_0_missing00".to_owned());

    let error = store.update(&missing, TenderPatch::default()).await.expect_err("missing");
    assert!(matches!(error, RepositoryError::NotFound { entity: "tender", .. }));

    let receiver = store.subscribe();
    assert_eq!(store.delete(&missing).await.expect("delete missing"), 0);
    assert!(!receiver.has_changed().expect("sender alive"));
    assert_eq!(store.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn list_by_parent_returns_only_that_parents_children() {
    let store = memory_store();
    let t1 = store.create(draft(&["p1", "p2"])).await.expect("t1");
    let other = store.create(draft(&["p9"])).await.expect("other");

    store
        .create_many(vec![child_of(&t1.id, "p1"), child_of(&t1.id, "p2"), child_of(&other.id, "p9")])
        .await
        .expect("children");

    let children = store.list_by_parent(&t1.id).await.expect("children of t1");
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|child| child.external_id.as_ref() == Some(&t1.id)));

    let coordinators = store.list_coordinators().await.expect("coordinators");
    assert_eq!(coordinators.len(), 2);
}

#[tokio::test]
async fn children_must_reference_an_existing_parent() {
    let store = memory_store();
    let error = store
        .create(child_of(&TenderId("tender_0_ghost0000".to_owned()), "p1"))
        .await
        .expect_err("unknown parent");
    assert!(matches!(error, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn only_draft_tenders_accept_edits() {
    let store = memory_store();
    let created = store.create(draft(&["p1"])).await.expect("create");
    store.transition(&created.id, TenderEvent::Send).await.expect("send");

    let error = store
        .update(&created.id, TenderPatch { tender_note: Some("late".to_owned()), ..TenderPatch::default() })
        .await
        .expect_err("sent tenders are read-only");
    assert_eq!(error.to_string(), "action edit is not permitted while tender is sent");
}

#[tokio::test]
async fn launch_fans_out_and_expand_requires_pre_launched() {
    let store = memory_store();
    let parent = store.create(draft(&["org-a", "org-b"]).with_note("backbone")).await.expect("create");

    let blocked = store.expand_children(&parent.id).await.expect_err("drafts have no children");
    assert!(matches!(blocked, RepositoryError::Domain(_)));

    let outcome = store
        .launch(&parent.id, &[ProviderRef::new("org-a", "Aurora"), ProviderRef::new("org-b", "Bluefin")])
        .await
        .expect("launch");
    assert_eq!(outcome.parent.state, TenderState::PreLaunched);
    assert_eq!(outcome.children.len(), 2);
    for child in &outcome.children {
        assert_eq!(child.category, TenderCategory::Tendering);
        assert_eq!(child.state, TenderState::Pending);
        assert_eq!(child.external_id.as_ref(), Some(&parent.id));
        assert_eq!(child.tender_note.as_deref(), Some("backbone"));
        assert_eq!(child.response_deadline, parent.response_deadline);
    }
    assert_eq!(outcome.children[1].provider.as_deref(), Some("Bluefin"));

    let expanded = store.expand_children(&parent.id).await.expect("expand");
    assert_eq!(expanded, outcome.children);

    let responded = store.transition(&expanded[0].id, TenderEvent::Respond).await.expect("respond");
    assert_eq!(responded.state, TenderState::Sent);

    store.transition(&parent.id, TenderEvent::Close).await.expect("close");
    assert!(store.expand_children(&parent.id).await.is_err());
}

#[tokio::test]
async fn launch_without_providers_is_rejected() {
    let store = memory_store();
    let parent = store.create(draft(&[])).await.expect("create");
    assert!(store.launch(&parent.id, &[]).await.is_err());
    assert_eq!(store.get_by_id(&parent.id).await.expect("get").state, TenderState::Draft);
}

#[tokio::test]
async fn delete_cascades_to_children_and_transcripts() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::default());
    let store = TenderStore::new(storage.clone()).with_latency(Duration::ZERO);
    let chat = ChatTranscripts::new(storage.clone()).with_latency(Duration::ZERO);

    let parent = store.create(draft(&["p1", "p2"])).await.expect("create");
    let keep = store.create(draft(&["p3"])).await.expect("keep");
    let outcome = store.launch(&parent.id, &[]).await.expect("launch");
    chat.append(&parent.id, "user", "hello").await.expect("chat");

    assert_eq!(store.delete(&parent.id).await.expect("delete"), 1 + outcome.children.len());

    let remaining = store.list().await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);
    assert!(chat.load(&parent.id).await.expect("chat").is_empty());
}

#[tokio::test]
async fn stale_writer_gets_a_conflict() {
    let store = memory_store();
    let created = store.create(draft(&["p1"])).await.expect("create");

    store
        .update_if_unmodified(
            &created.id,
            created.updated_at,
            TenderPatch { tender_note: Some("first writer".to_owned()), ..TenderPatch::default() },
        )
        .await
        .expect("fresh write");

    let error = store
        .update_if_unmodified(
            &created.id,
            created.updated_at,
            TenderPatch { tender_note: Some("second writer".to_owned()), ..TenderPatch::default() },
        )
        .await
        .expect_err("stale write");
    assert!(matches!(error, RepositoryError::Conflict(_)));
    assert_eq!(
        store.get_by_id(&created.id).await.expect("get").tender_note.as_deref(),
        Some("first writer")
    );
}

#[tokio::test]
async fn concurrent_writers_do_not_lose_updates() {
    let store = Arc::new(
        TenderStore::new(Arc::new(InMemoryKeyValueStore::default()))
            .with_latency(Duration::from_millis(5)),
    );
    let created = store.create(draft(&["p1"])).await.expect("create");

    let note_writer = {
        let store = Arc::clone(&store);
        let id = created.id.clone();
        tokio::spawn(async move {
            store
                .update(&id, TenderPatch { tender_note: Some("note".to_owned()), ..TenderPatch::default() })
                .await
        })
    };
    let provider_writer = {
        let store = Arc::clone(&store);
        let id = created.id.clone();
        tokio::spawn(async move {
            store
                .update(&id, TenderPatch { selected_providers: Some(vec!["p2".to_owned()]), ..TenderPatch::default() })
                .await
        })
    };

    note_writer.await.expect("join").expect("note update");
    provider_writer.await.expect("join").expect("provider update");

    let stored = store.get_by_id(&created.id).await.expect("get");
    assert_eq!(stored.tender_note.as_deref(), Some("note"));
    assert_eq!(stored.selected_providers, vec!["p2".to_owned()]);
}

#[tokio::test]
async fn sqlite_backend_survives_store_restarts() {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("desk.db").display());

    let created = {
        let pool = connect_with_settings(&url, 2, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let store = TenderStore::new(Arc::new(SqlKeyValueStore::new(pool.clone())))
            .with_latency(Duration::ZERO);
        let created = store.create(draft(&["p1"])).await.expect("create");
        pool.close().await;
        created
    };

    let pool = connect_with_settings(&url, 2, 30).await.expect("reconnect");
    let storage = SqlKeyValueStore::new(pool);
    let store = TenderStore::new(Arc::new(storage)).with_latency(Duration::ZERO);
    assert_eq!(store.list().await.expect("list"), vec![created]);
}

#[tokio::test]
async fn stored_json_uses_the_wire_field_names() {
    let storage = Arc::new(InMemoryKeyValueStore::default());
    let store = TenderStore::new(storage.clone()).with_latency(Duration::ZERO);
    let parent = store.create(draft(&["p1"])).await.expect("parent");
    store.create(child_of(&parent.id, "p1")).await.expect("child");

    let raw = storage.get(TENDERS_KEY).await.expect("get").expect("stored");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let child = &value[1];
    assert_eq!(child["category"], "tendering");
    assert_eq!(child["state"], "pending");
    assert_eq!(child["responseDeadline"], "2099-01-01T10:00");
    assert_eq!(child["external_id"], serde_json::Value::String(parent.id.0.clone()));
    assert!(child.get("createdAt").is_some());
    assert!(child.get("updatedAt").is_some());
}

#[tokio::test]
async fn tender_attachment_round_trips_through_the_store() {
    let dir = TempDir::new().expect("tempdir");
    let source = dir.path().join("brief.pdf");
    let payload = b"%PDF-1.4 tender brief".to_vec();
    std::fs::write(&source, &payload).expect("write source");

    let store = memory_store();
    let attachment = encode_file(&source, None).expect("encode");
    let created = store.create(draft(&["p1"]).with_attachment(attachment)).await.expect("create");

    let stored = store.get_by_id(&created.id).await.expect("get");
    let decoded = tenderdesk_core::attachment::download(stored.attachment.as_ref()).expect("decode");
    assert_eq!(decoded.name, "brief.pdf");
    assert_eq!(decoded.mime_type, "application/pdf");
    assert_eq!(decoded.bytes, payload);

    let out = TempDir::new().expect("out dir");
    let written = decoded.write_to(out.path()).expect("write");
    assert_eq!(std::fs::read(written).expect("read back"), payload);
}

#[tokio::test]
async fn non_pdf_tender_attachment_is_rejected() {
    let store = memory_store();
    let image = Attachment::from_bytes("photo.png", "image/png", b"png");
    assert!(store.create(draft(&["p1"]).with_attachment(image)).await.is_err());
}

#[tokio::test]
async fn cancelled_quote_blocks_attachment_changes() {
    let quotes =
        QuoteStore::new(Arc::new(InMemoryKeyValueStore::default())).with_latency(Duration::ZERO);
    let quote = quotes
        .create(NewQuote { external_id: Some("tender_1_x".to_owned()), ..NewQuote::default() })
        .await
        .expect("create");
    let quote = quotes.apply_action(&quote.id, QuoteAction::Cancel).await.expect("cancel");
    assert_eq!(quote.primary_state(), Some(QuoteItemState::Cancelled));

    let flow = QuoteFlow;
    assert!(flow.is_action_disabled(&quote, QuoteAction::AddAttachment));
    assert!(flow.is_action_disabled(&quote, QuoteAction::DownloadAttachment));

    let error = quotes
        .add_attachment(&quote.id, Attachment::from_bytes("q.pdf", "application/pdf", b"q"))
        .await
        .expect_err("cancelled");
    assert!(matches!(error, RepositoryError::Domain(_)));
    assert_eq!(quotes.list_for_tender("tender_1_x").await.expect("list").len(), 1);
}

#[tokio::test]
async fn create_rejects_states_outside_the_category_entry_point() {
    let store = memory_store();
    let parent = store.create(draft(&["p1"])).await.expect("parent");

    let closed_coordinator = NewTender { state: TenderState::Closed, ..draft(&["p1"]) };
    let error = store.create(closed_coordinator).await.expect_err("closed at birth");
    assert!(matches!(error, RepositoryError::Domain(_)));

    let draft_child = NewTender { state: TenderState::Draft, ..child_of(&parent.id, "p1") };
    let error = store.create(draft_child).await.expect_err("draft child");
    assert!(matches!(error, RepositoryError::Domain(_)));

    let pending_child = store.create(child_of(&parent.id, "p1")).await.expect("pending child");
    assert_eq!(pending_child.state, TenderState::Pending);
    assert_eq!(store.list().await.expect("list").len(), 2);
}

#[tokio::test]
async fn fractional_deadline_is_stored_as_returned() {
    let store = memory_store();
    let data = NewTender::coordinator_draft(
        ResponseDeadline::parse("2099-01-01T10:00:00.500Z").expect("deadline"),
        vec!["p1".to_owned()],
    );

    let created = store.create(data).await.expect("create");
    let stored = store.get_by_id(&created.id).await.expect("get");
    assert_eq!(stored, created);
    assert_eq!(stored.response_deadline.to_string(), "2099-01-01T10:00");
}

#[tokio::test]
async fn launch_creates_one_child_per_distinct_provider_id() {
    let store = memory_store();
    let parent = store.create(draft(&["org-a"])).await.expect("create");

    let outcome = store
        .launch(&parent.id, &[
            ProviderRef::new("org-a", "Aurora Networks"),
            ProviderRef::new("org-a", "Aurora Networks (dup)"),
            ProviderRef::new("org-b", "Bluefin Telecom"),
        ])
        .await
        .expect("launch");

    let providers: Vec<_> =
        outcome.children.iter().map(|child| child.provider.as_deref().unwrap_or_default()).collect();
    assert_eq!(providers, vec!["Aurora Networks", "Bluefin Telecom"]);
}

#[tokio::test]
async fn deleting_a_tender_keeps_the_quotes_that_answered_it() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::default());
    let tenders = TenderStore::new(storage.clone()).with_latency(Duration::ZERO);
    let quotes = QuoteStore::new(storage).with_latency(Duration::ZERO);

    let parent = tenders.create(draft(&["p1"])).await.expect("create");
    let child = tenders.launch(&parent.id, &[]).await.expect("launch").children.remove(0);
    let quote = quotes
        .create(NewQuote {
            external_id: Some(child.id.0.clone()),
            description: Some("answer".to_owned()),
            item_prices: vec![None],
        })
        .await
        .expect("quote");

    assert_eq!(tenders.delete(&parent.id).await.expect("delete"), 2);

    let kept = quotes.list_for_tender(&child.id.0).await.expect("quotes");
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, quote.id);
}
