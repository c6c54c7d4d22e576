// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send pipeline behaviour: status recording, retries, redelivery and FIFO order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_config::model::HttpConfig;
use courier_core::{
    Backend, ChannelHandler, HandlerRegistry, Lease, MsgId, MsgStatus, OutgoingMsg, RetryPolicy,
    TaskEnvelope,
};
use courier_handlers::{ExternalHandler, HttpClient};
use courier_sender::{Foreman, SendOutcome, Sender};
use courier_storage::{Database, SqliteBackend, SqliteQueue};
use courier_test_utils::{MemoryBackend, MockHandler, MockSend, fixtures};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sender_for(backend: Arc<dyn Backend>, handlers: Vec<Arc<dyn ChannelHandler>>) -> Sender {
    let mut builder = HandlerRegistry::builder();
    for handler in handlers {
        builder.register(handler).unwrap();
    }
    Sender::new(backend, Arc::new(builder.build().unwrap()), Duration::from_secs(5))
}

async fn next_lease(backend: &dyn Backend, queue: &str) -> Lease {
    backend
        .queue()
        .dequeue(queue, Duration::ZERO)
        .await
        .unwrap()
        .expect("a task is ready")
}

async fn enqueue(backend: &MemoryBackend, channel: &courier_core::Channel, text: &str) -> MsgId {
    backend
        .enqueue_outgoing(&OutgoingMsg::new(channel, fixtures::tel_urn(), text))
        .await
        .unwrap()
}

#[tokio::test]
async fn accepted_send_is_wired_and_logged() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    handler.script([MockSend::Accept(Some("ext-42".into()))]).await;
    let sender = sender_for(backend.clone(), vec![handler.clone()]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    let outcome = sender.process(&queue, lease).await.unwrap();

    assert!(matches!(outcome, SendOutcome::Attempted { status: MsgStatus::Wired, .. }));
    let msg = backend.outgoing_msg(id).await.unwrap();
    assert_eq!(msg.status, MsgStatus::Wired);
    assert_eq!(msg.external_id.as_deref(), Some("ext-42"));
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);

    let logs = backend.channel_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].msg_id, Some(id));
    assert_eq!(logs[0].http_logs.len(), 1);
    assert!(!logs[0].is_error());
    let updates = backend.status_updates().await;
    assert_eq!(updates[0].log_uuid, Some(logs[0].uuid));
}

#[tokio::test]
async fn provider_confirmation_marks_sent() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    handler.script([MockSend::Sent("ext-7".into())]).await;
    let sender = sender_for(backend.clone(), vec![handler]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    sender.process(&queue, lease).await.unwrap();

    assert_eq!(backend.outgoing_msg(id).await.unwrap().status, MsgStatus::Sent);
}

#[tokio::test]
async fn connection_failure_schedules_a_retry() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    handler.script([MockSend::ConnectionFailure]).await;
    let sender = sender_for(backend.clone(), vec![handler]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    let original_id = lease.envelope.id();
    let outcome = sender.process(&queue, lease).await.unwrap();

    let SendOutcome::Attempted { status, transition } = outcome else {
        panic!("expected an attempt");
    };
    assert_eq!(status, MsgStatus::Errored);
    let transition = transition.unwrap();
    assert_eq!(transition.retry_in, Some(RetryPolicy::default().base_backoff));

    let msg = backend.outgoing_msg(id).await.unwrap();
    assert_eq!(msg.status, MsgStatus::Errored);
    assert_eq!(msg.error_count, 1);

    // The retry is stored but not due yet.
    let queue_impl = backend.queue();
    assert_eq!(queue_impl.size(&queue).await.unwrap(), 1);
    assert!(queue_impl.dequeue(&queue, Duration::ZERO).await.unwrap().is_none());

    let later = Utc::now() + chrono::Duration::hours(2);
    let raw = queue_impl.pop_raw(&queue, later).await.unwrap().unwrap();
    let retry = TaskEnvelope::decode(&raw.payload).unwrap();
    assert_eq!(retry.id(), original_id);
    assert_eq!(retry.retries(), 1);
    assert_eq!(retry.msg_id(), Some(id));

    let logs = backend.channel_logs().await;
    assert!(logs[0].is_error());
    assert_eq!(logs[0].errors[0].code, "connection_failed");
}

#[tokio::test]
async fn errors_past_the_retry_limit_fail_the_message() {
    let policy = RetryPolicy {
        max_retries: 0,
        ..RetryPolicy::default()
    };
    let backend = Arc::new(MemoryBackend::new().with_policy(policy));
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    handler.script([MockSend::ConnectionFailure]).await;
    let sender = sender_for(backend.clone(), vec![handler]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    sender.process(&queue, lease).await.unwrap();

    let msg = backend.outgoing_msg(id).await.unwrap();
    assert_eq!(msg.status, MsgStatus::Failed);
    assert_eq!(msg.error_count, 1);
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);
}

#[tokio::test]
async fn permanent_rejection_fails_without_retry() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    handler.script([MockSend::Reject("21610".into())]).await;
    let sender = sender_for(backend.clone(), vec![handler]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    sender.process(&queue, lease).await.unwrap();

    assert_eq!(backend.outgoing_msg(id).await.unwrap().status, MsgStatus::Failed);
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);
    let logs = backend.channel_logs().await;
    assert_eq!(logs[0].errors[0].ext_code.as_deref(), Some("21610"));
}

#[tokio::test]
async fn redelivered_task_is_not_sent_twice() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    let sender = sender_for(backend.clone(), vec![handler.clone()]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    // A second copy of the same task, as after a crash before acknowledgement.
    backend
        .queue()
        .push(&TaskEnvelope::send_msg(&channel.uuid, id))
        .await
        .unwrap();

    for _ in 0..2 {
        let lease = next_lease(backend.as_ref(), &queue).await;
        let outcome = sender.process(&queue, lease).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Attempted { status: MsgStatus::Wired, .. }));
    }

    assert_eq!(handler.sent_count().await, 1);
    assert_eq!(backend.outgoing_msg(id).await.unwrap().status, MsgStatus::Wired);
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);
}

#[tokio::test]
async fn final_messages_are_skipped() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    let sender = sender_for(backend.clone(), vec![handler.clone()]);

    let id = enqueue(&backend, &channel, "hello").await;
    let delivered = backend.new_status_update(&channel, id, MsgStatus::Delivered);
    backend.write_status_update(&delivered).await.unwrap();

    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    let outcome = sender.process(&queue, lease).await.unwrap();

    assert!(matches!(outcome, SendOutcome::Skipped(_)));
    assert_eq!(handler.sent_count().await, 0);
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_message_is_dropped() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    let sender = sender_for(backend.clone(), vec![Arc::new(MockHandler::new("MK"))]);

    backend
        .queue()
        .push(&TaskEnvelope::send_msg(&channel.uuid, MsgId(999)))
        .await
        .unwrap();
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;

    let outcome = sender.process(&queue, lease).await.unwrap();
    assert_eq!(outcome, SendOutcome::Skipped("message not found"));
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);
}

#[tokio::test]
async fn missing_handler_fails_the_message() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("ZZ");
    backend.add_channel(channel.clone()).await;
    let sender = sender_for(backend.clone(), vec![Arc::new(MockHandler::new("MK"))]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    sender.process(&queue, lease).await.unwrap();

    assert_eq!(backend.outgoing_msg(id).await.unwrap().status, MsgStatus::Failed);
    let logs = backend.channel_logs().await;
    assert_eq!(logs[0].errors[0].code, "handler_not_found");
}

#[tokio::test]
async fn deleted_channel_fails_the_message() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    let sender = sender_for(backend.clone(), vec![Arc::new(MockHandler::new("MK"))]);

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    let outcome = sender.process(&queue, lease).await.unwrap();

    assert!(matches!(outcome, SendOutcome::Attempted { status: MsgStatus::Failed, .. }));
    assert_eq!(backend.outgoing_msg(id).await.unwrap().status, MsgStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn slow_handler_times_out_as_errored() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = fixtures::channel("MK");
    backend.add_channel(channel.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    handler.script([MockSend::Slow(Duration::from_secs(60))]).await;
    let mut builder = HandlerRegistry::builder();
    builder.register(handler).unwrap();
    let sender = Sender::new(
        backend.clone(),
        Arc::new(builder.build().unwrap()),
        Duration::from_secs(1),
    );

    let id = enqueue(&backend, &channel, "hello").await;
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    sender.process(&queue, lease).await.unwrap();

    assert_eq!(backend.outgoing_msg(id).await.unwrap().status, MsgStatus::Errored);
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 1);
}

#[tokio::test]
async fn foreman_sends_each_queue_in_order() {
    let backend = Arc::new(MemoryBackend::new());
    let first = fixtures::channel("MK");
    let second = fixtures::channel("MK");
    backend.add_channel(first.clone()).await;
    backend.add_channel(second.clone()).await;
    let handler = Arc::new(MockHandler::new("MK"));
    let sender = Arc::new(sender_for(backend.clone(), vec![handler.clone()]));

    for text in ["one", "two", "three"] {
        enqueue(&backend, &first, text).await;
    }
    enqueue(&backend, &second, "other").await;

    let foreman = Foreman::new(sender, backend.queue())
        .with_max_workers(2)
        .with_poll_interval(Duration::from_millis(10))
        .with_dequeue_timeout(Duration::from_millis(20));
    let cancel = CancellationToken::new();
    let running = tokio::spawn(foreman.run(cancel.clone()));

    for _ in 0..300 {
        if handler.sent_count().await == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    running.await.unwrap().unwrap();

    let sent = handler.sent_messages().await;
    assert_eq!(sent.len(), 4);
    let first_texts: Vec<_> = sent
        .iter()
        .filter(|m| m.channel_uuid == first.uuid)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(first_texts, ["one", "two", "three"]);
    for queue in [&first, &second].map(|c| TaskEnvelope::queue_for_channel(&c.uuid)) {
        assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn foreman_stops_when_cancelled() {
    let backend = Arc::new(MemoryBackend::new());
    let sender = Arc::new(sender_for(backend.clone(), Vec::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    Foreman::new(sender, backend.queue())
        .with_poll_interval(Duration::from_millis(10))
        .run(cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn sqlite_backend_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("courier.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    let backend = Arc::new(SqliteBackend::with_sqlite_queue(
        SqliteQueue::new(db),
        RetryPolicy::default(),
    ));
    let channel = fixtures::channel("EX").with_config("send_url", format!("{}/send", server.uri()));
    backend.save_channel(&channel).await.unwrap();

    let http = HttpClient::new(&HttpConfig::default()).unwrap();
    let sender = sender_for(backend.clone(), vec![Arc::new(ExternalHandler::new(http))]);

    let id = backend
        .enqueue_outgoing(&OutgoingMsg::new(&channel, fixtures::tel_urn(), "hi"))
        .await
        .unwrap();
    let queue = TaskEnvelope::queue_for_channel(&channel.uuid);
    let lease = next_lease(backend.as_ref(), &queue).await;
    sender.process(&queue, lease).await.unwrap();

    let msg = backend.get_outgoing_msg(id).await.unwrap().unwrap();
    assert_eq!(msg.status, MsgStatus::Wired);
    assert!(backend.was_msg_sent(id).await.unwrap());
    assert_eq!(backend.queue().size(&queue).await.unwrap(), 0);
}
