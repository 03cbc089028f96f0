//! End-to-end runs: scripted source → orchestrator → real Notion client
//! against a fake Notion API → libSQL ledger.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use recruiter_sync::pipeline::types::{ContactStatus, CreateFailurePolicy, DedupPolicy};
use recruiter_sync::pipeline::{Orchestrator, OrchestratorConfig};
use recruiter_sync::store::{Ledger, LibSqlBackend};
use recruiter_sync::tracker::{NotionClient, TrackingStore};

use common::{FakeNotion, OWNER, ScriptedSource, message, start_fake_notion};

async fn pipeline(policy: CreateFailurePolicy) -> (Orchestrator, Arc<LibSqlBackend>, FakeNotion) {
    let (notion_config, fake) = start_fake_notion().await;
    let ledger = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let tracker = Arc::new(NotionClient::new(&notion_config).unwrap());
    let orchestrator = Orchestrator::new(
        ledger.clone(),
        tracker,
        OrchestratorConfig {
            owner: OWNER.into(),
            own_domain: Some("gmail.com".into()),
            lookback_days: 3,
            dedup_policy: DedupPolicy::Company,
            create_failure_policy: policy,
            default_status: ContactStatus::Applied,
        },
    );
    (orchestrator, ledger, fake)
}

fn sarah() -> recruiter_sync::source::RawMessage {
    message(
        "m1@techcorp.com",
        "Sarah Johnson <sarah.johnson@techcorp.com>",
        "Senior Software Engineer Opportunity at TechCorp",
        "Hi! I came across your profile and think you would be a great fit.",
    )
}

#[tokio::test]
async fn new_recruiter_becomes_one_notion_page() {
    let (orchestrator, ledger, fake) = pipeline(CreateFailurePolicy::Drop).await;
    let source = ScriptedSource::new(vec![sarah()]);

    let result = orchestrator.run(&source).await;
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!((result.fetched, result.processed, result.created), (1, 1, 1));

    let pages = fake.pages.lock().unwrap().clone();
    assert_eq!(pages.len(), 1);
    let page = &pages[0];
    assert_eq!(page["parent"]["database_id"], "db-integration");
    let props = &page["properties"];
    assert_eq!(props["Recruiter Name"]["title"][0]["text"]["content"], "Sarah Johnson");
    assert_eq!(props["Company"]["rich_text"][0]["text"]["content"], "Techcorp");
    assert_eq!(props["Email"]["email"], "sarah.johnson@techcorp.com");
    assert_eq!(props["Status"]["select"]["name"], "Applied");
    assert_eq!(props["Date Received"]["date"]["start"], "2026-01-05");
    assert!(
        props["Position"]["rich_text"][0]["text"]["content"]
            .as_str()
            .unwrap()
            .contains("Senior Software Engineer")
    );

    assert_eq!(fake.auth_headers.lock().unwrap()[0], "Bearer secret_integration");
    assert_eq!(fake.version_headers.lock().unwrap()[0], "2022-06-28");

    let entry = ledger.get_entry("m1@techcorp.com").await.unwrap().unwrap();
    assert_eq!(entry.downstream_id.as_deref(), Some("page-1"));
    assert_eq!(source.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_runs_create_at_most_once() {
    let (orchestrator, _ledger, fake) = pipeline(CreateFailurePolicy::Drop).await;
    let source = ScriptedSource::new(vec![sarah()]);

    for _ in 0..3 {
        orchestrator.run(&source).await;
    }
    assert_eq!(fake.page_count(), 1);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn second_recruiter_at_same_company_is_throttled() {
    let (orchestrator, ledger, fake) = pipeline(CreateFailurePolicy::Drop).await;
    let source = ScriptedSource::new(vec![sarah()]);
    orchestrator.run(&source).await;

    source.push(message(
        "m2@techcorp.com",
        "Tom Baker <tom.baker@techcorp.com>",
        "Staff Engineer role",
        "Hello there, following up on an opening.",
    ));
    let result = orchestrator.run(&source).await;
    assert_eq!(result.processed, 1);
    assert_eq!(result.throttled, 1);
    assert_eq!(result.created, 0);
    assert_eq!(fake.page_count(), 1);

    let throttled = ledger.get_entry("m2@techcorp.com").await.unwrap().unwrap();
    assert!(throttled.downstream_id.is_none());
    assert_eq!(throttled.recruiter_name, "Tom Baker");
}

#[tokio::test]
async fn reply_subject_never_reaches_notion_or_ledger() {
    let (orchestrator, ledger, fake) = pipeline(CreateFailurePolicy::Drop).await;
    let source = ScriptedSource::new(vec![message(
        "r1@techcorp.com",
        "Sarah Johnson <sarah.johnson@techcorp.com>",
        "Re: Senior Software Engineer",
        "Thanks for getting back to me!",
    )]);

    let result = orchestrator.run(&source).await;
    assert_eq!((result.fetched, result.processed), (1, 0));
    assert_eq!(fake.page_count(), 0);
    assert!(!ledger.has_message("r1@techcorp.com").await.unwrap());
}

#[tokio::test]
async fn notion_error_is_dropped_by_default() {
    let (orchestrator, ledger, fake) = pipeline(CreateFailurePolicy::Drop).await;
    fake.set_failing(true);
    let source = ScriptedSource::new(vec![sarah()]);

    let result = orchestrator.run(&source).await;
    assert!(result.success);
    assert_eq!(result.created, 0);
    assert_eq!(result.errors.len(), 1);

    fake.set_failing(false);
    orchestrator.run(&source).await;
    assert_eq!(fake.page_count(), 0);
    let entry = ledger.get_entry("m1@techcorp.com").await.unwrap().unwrap();
    assert!(entry.downstream_id.is_none());
}

#[tokio::test]
async fn notion_error_is_retried_next_run_under_retry_policy() {
    let (orchestrator, ledger, fake) = pipeline(CreateFailurePolicy::Retry).await;
    fake.set_failing(true);
    let source = ScriptedSource::new(vec![sarah()]);

    let first = orchestrator.run(&source).await;
    assert_eq!(first.errors.len(), 1);
    assert!(!ledger.has_message("m1@techcorp.com").await.unwrap());

    fake.set_failing(false);
    let second = orchestrator.run(&source).await;
    assert_eq!(second.created, 1);
    assert_eq!(fake.page_count(), 1);
    assert!(ledger.has_message("m1@techcorp.com").await.unwrap());
}

#[tokio::test]
async fn checkpoint_advances_on_every_run() {
    let (orchestrator, ledger, _fake) = pipeline(CreateFailurePolicy::Drop).await;
    let source = ScriptedSource::new(Vec::new());

    orchestrator.run(&source).await;
    let first = ledger.get_checkpoint(&source.key).await.unwrap().unwrap();
    orchestrator.run(&source).await;
    let second = ledger.get_checkpoint(&source.key).await.unwrap().unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn notion_health_check_hits_users_me() {
    let (notion_config, _fake) = start_fake_notion().await;
    let client = NotionClient::new(&notion_config).unwrap();
    client.health_check().await.unwrap();
}
