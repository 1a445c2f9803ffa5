//! Router-level tests: every endpoint exercised through tower against
//! in-memory stores.

mod support;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sha2::Sha256;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use diramo::application::channels::ChannelPublisher;
use diramo::application::policy;
use diramo::application::processor::QueueProcessor;
use diramo::application::repos::{
    ActivityRepo, NewActivityRecord, NewQueueRecord, NewScheduledJob, QueueRepo,
    ScheduledJobsRepo,
};
use diramo::application::runner::BroadcastRunner;
use diramo::application::sync::SyncController;
use diramo::application::webhook::SIGNATURE_HEADER;
use diramo::domain::entities::{BroadcastPayload, ChannelTarget};
use diramo::domain::types::{ActivityKind, Channel, JobStatus, Priority};
use diramo::infra::http::{self, HttpState};
use diramo::infra::http::cron::CRON_SECRET_HEADER;

use support::{
    ManualScheduler, MemoryActivityRepo, MemoryContentRepo, MemoryJobsRepo, MemoryQueueRepo,
    ScriptedPublisher, registry_of, sample_content,
};

const WEBHOOK_SECRET: &str = "hook-s3cret";
const CRON_SECRET: &str = "cron-s3cret";

struct TestApp {
    router: Router,
    queue: Arc<MemoryQueueRepo>,
    jobs: Arc<MemoryJobsRepo>,
    content: Arc<MemoryContentRepo>,
    activity: Arc<MemoryActivityRepo>,
}

fn build_app(webhook_secret: Option<&str>, cron_secret: Option<&str>) -> TestApp {
    let queue = Arc::new(MemoryQueueRepo::default());
    let jobs = Arc::new(MemoryJobsRepo::default());
    let content = Arc::new(MemoryContentRepo::default());
    let activity = Arc::new(MemoryActivityRepo::default());

    let publishers: Vec<Arc<dyn ChannelPublisher>> = Channel::ALL
        .into_iter()
        .map(|channel| Arc::new(ScriptedPublisher::succeeding(channel)) as Arc<dyn ChannelPublisher>)
        .collect();
    let registry = registry_of(publishers);

    let processor = Arc::new(QueueProcessor::new(
        queue.clone(),
        content.clone(),
        activity.clone(),
        registry.clone(),
        policy::any_succeeded,
        Arc::new(ManualScheduler::default()),
    ));
    let runner = Arc::new(BroadcastRunner::new(
        jobs.clone(),
        activity.clone(),
        registry,
    ));
    let sync = Arc::new(SyncController::new(
        content.clone(),
        activity.clone(),
        webhook_secret.map(str::to_string),
    ));

    let state = HttpState {
        queue: queue.clone(),
        activity: activity.clone(),
        processor,
        runner,
        sync,
        cron_secret: cron_secret.map(str::to_string),
    };

    TestApp {
        router: http::router(state),
        queue,
        jobs,
        content,
        activity,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

// ============ Queue management ============

#[tokio::test]
async fn enqueue_creates_a_pending_record() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/distribution/queue",
            json!({
                "contentId": Uuid::new_v4(),
                "platforms": ["devto", "twitter"],
                "priority": "high"
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["priority"], "high");
    assert_eq!(body["channels"].as_array().map(Vec::len), Some(2));

    let stats = app.queue.stats().await.expect("stats");
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn enqueue_rejects_bad_platform_input() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let empty = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/distribution/queue",
            json!({ "contentId": Uuid::new_v4(), "platforms": [] }),
        ))
        .await
        .expect("response");
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/distribution/queue",
            json!({ "contentId": Uuid::new_v4(), "platforms": ["myspace"] }),
        ))
        .await
        .expect("response");
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    // Nothing entered the queue.
    assert_eq!(app.queue.stats().await.expect("stats").total(), 0);
}

#[tokio::test]
async fn list_filters_by_status_and_rejects_unknown_filters() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let created = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/distribution/queue",
            json!({ "contentId": Uuid::new_v4(), "platforms": ["linkedin"] }),
        ))
        .await
        .expect("response");
    assert_eq!(created.status(), StatusCode::CREATED);

    let listed = app
        .router
        .clone()
        .oneshot(get("/api/distribution/queue?status=pending"))
        .await
        .expect("response");
    assert_eq!(listed.status(), StatusCode::OK);
    let body = body_json(listed).await;
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));

    let none = app
        .router
        .clone()
        .oneshot(get("/api/distribution/queue?status=completed"))
        .await
        .expect("response");
    let body = body_json(none).await;
    assert_eq!(body["items"].as_array().map(Vec::len), Some(0));

    let bad = app
        .router
        .clone()
        .oneshot(get("/api/distribution/queue?status=exploded"))
        .await
        .expect("response");
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

fn queue_request(priority: Priority, scheduled_for: Option<OffsetDateTime>) -> NewQueueRecord {
    NewQueueRecord {
        content_id: Uuid::new_v4(),
        channels: vec![ChannelTarget::enabled(Channel::Hashnode)],
        priority,
        scheduled_for,
        max_retries: 3,
    }
}

#[tokio::test]
async fn combined_filters_return_matches_ordered_by_schedule() {
    let app = build_app(None, None);
    let now = OffsetDateTime::now_utc();

    // A completed high-priority record the status filter must drop.
    let done = app
        .queue
        .enqueue(queue_request(Priority::High, None))
        .await
        .expect("enqueue");
    app.queue.claim_due(now, 10).await.expect("claim");
    app.queue.mark_completed(done.id).await.expect("complete");

    let low = app
        .queue
        .enqueue(queue_request(Priority::Low, None))
        .await
        .expect("enqueue");
    let later = app
        .queue
        .enqueue(queue_request(
            Priority::High,
            Some(now + time::Duration::minutes(30)),
        ))
        .await
        .expect("enqueue");
    let soon = app
        .queue
        .enqueue(queue_request(
            Priority::High,
            Some(now + time::Duration::minutes(10)),
        ))
        .await
        .expect("enqueue");
    let unscheduled = app
        .queue
        .enqueue(queue_request(Priority::High, None))
        .await
        .expect("enqueue");

    let response = app
        .router
        .clone()
        .oneshot(get("/api/distribution/queue?status=pending&priority=high"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let ids: Vec<String> = body["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|item| item["id"].as_str().expect("id").to_string())
        .collect();

    // Only pending + high survive; unscheduled first, then by scheduledFor.
    assert_eq!(
        ids,
        [
            unscheduled.id.to_string(),
            soon.id.to_string(),
            later.id.to_string(),
        ]
    );
    assert!(!ids.contains(&low.id.to_string()));
    assert!(!ids.contains(&done.id.to_string()));
}

#[tokio::test]
async fn delete_removes_a_record_and_404s_on_unknown_ids() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let created = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/distribution/queue",
            json!({ "contentId": Uuid::new_v4(), "platforms": ["devto"] }),
        ))
        .await
        .expect("response");
    let body = body_json(created).await;
    let id = body["id"].as_str().expect("id").to_string();

    let deleted = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/distribution/queue?id={id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(deleted.status(), StatusCode::OK);

    let missing = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/distribution/queue?id={}", Uuid::new_v4()))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_endpoint_reports_per_status_counts() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    for _ in 0..3 {
        let created = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/distribution/queue",
                json!({ "contentId": Uuid::new_v4(), "platforms": ["twitter"] }),
            ))
            .await
            .expect("response");
        assert_eq!(created.status(), StatusCode::CREATED);
    }

    let response = app
        .router
        .clone()
        .oneshot(get("/api/distribution/queue/stats"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pending"], 3);
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn activity_endpoint_lists_recent_entries() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    app.activity
        .append(NewActivityRecord {
            kind: ActivityKind::PostPublished,
            channel: Channel::Hashnode,
            external_id: Some("abc".to_string()),
            metadata: json!({}),
        })
        .await
        .expect("append");

    let response = app
        .router
        .clone()
        .oneshot(get("/api/distribution/activity?limit=10"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["items"][0]["kind"], "POST_PUBLISHED");
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let response = app
        .router
        .clone()
        .oneshot(get("/healthz"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

// ============ Webhook receiver ============

fn webhook_request(body: &'static [u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/hashnode")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).expect("request")
}

#[tokio::test]
async fn webhook_with_valid_signature_updates_content() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let id = Uuid::new_v4();
    let mut item = sample_content(id, "before");
    item.external_id = Some("remote-9".to_string());
    item.updated_at = OffsetDateTime::UNIX_EPOCH;
    app.content.insert(item).await;

    let body: &[u8] = br#"{
        "event": "POST_UPDATED",
        "data": {"postId": "remote-9", "slug": "after", "title": "After", "publishedAt": "2026-03-01T09:00:00Z"}
    }"#;
    let sig = sign(WEBHOOK_SECRET, body);
    let response = app
        .router
        .clone()
        .oneshot(webhook_request(body, Some(&sig)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["success"], true);

    assert_eq!(app.content.get(id).await.expect("content").slug, "after");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_without_mutation() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let id = Uuid::new_v4();
    let mut item = sample_content(id, "before");
    item.external_id = Some("remote-10".to_string());
    app.content.insert(item).await;

    let body: &[u8] = br#"{
        "event": "POST_DELETED",
        "data": {"postId": "remote-10", "slug": "before", "title": "T"}
    }"#;
    let response = app
        .router
        .clone()
        .oneshot(webhook_request(body, Some("deadbeef")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(app.content.get(id).await.expect("content").deleted_at.is_none());
    assert_eq!(app.activity.count().await, 0);
}

#[tokio::test]
async fn webhook_without_configured_secret_accepts_unsigned_payloads() {
    let app = build_app(None, Some(CRON_SECRET));

    let id = Uuid::new_v4();
    let mut item = sample_content(id, "unsigned");
    item.external_id = Some("remote-11".to_string());
    app.content.insert(item).await;

    let body: &[u8] = br#"{
        "event": "POST_DELETED",
        "data": {"postId": "remote-11", "slug": "unsigned", "title": "T"}
    }"#;
    let response = app
        .router
        .clone()
        .oneshot(webhook_request(body, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.content.get(id).await.expect("content").deleted_at.is_some());
}

#[tokio::test]
async fn webhook_describe_has_no_side_effects() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));

    let response = app
        .router
        .clone()
        .oneshot(get("/webhooks/hashnode"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_running"], false);
    assert_eq!(app.activity.count().await, 0);
}

// ============ Cron trigger ============

async fn seed_due_job(jobs: &MemoryJobsRepo) -> Uuid {
    let job = jobs
        .enqueue_job(NewScheduledJob {
            job_type: "social_broadcast".to_string(),
            payload: BroadcastPayload {
                channels: vec![Channel::Twitter],
                message: "Fresh off the press".to_string(),
                media_url: None,
            },
            run_at: OffsetDateTime::now_utc() - std::time::Duration::from_secs(60),
        })
        .await
        .expect("enqueue job");
    job.id
}

#[tokio::test]
async fn cron_trigger_requires_the_shared_secret() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));
    seed_due_job(&app.jobs).await;

    let unauthenticated = app
        .router
        .clone()
        .oneshot(get("/api/cron/social"))
        .await
        .expect("response");
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/api/cron/social")
                .header(CRON_SECRET_HEADER, "nope")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cron_trigger_runs_due_jobs() {
    let app = build_app(Some(WEBHOOK_SECRET), Some(CRON_SECRET));
    let id = seed_due_job(&app.jobs).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/cron/social")
                .header(CRON_SECRET_HEADER, CRON_SECRET)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["results"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["results"][0]["status"], "SUCCESS");

    let job = app.jobs.get(id).await.expect("job");
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(app.activity.count().await, 1);
}

#[tokio::test]
async fn cron_trigger_is_refused_when_no_secret_is_configured() {
    let app = build_app(Some(WEBHOOK_SECRET), None);
    seed_due_job(&app.jobs).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/api/cron/social")
                .header(CRON_SECRET_HEADER, CRON_SECRET)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
