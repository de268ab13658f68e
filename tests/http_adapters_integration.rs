use autotune::domain::errors::PropagationError;
use autotune::domain::notification::{Notification, Severity};
use autotune::domain::optimization::parameter_set::ParameterSet;
use autotune::domain::ports::{Notifier, ParameterPropagator};
use autotune::infrastructure::observability::Metrics;
use autotune::infrastructure::{HttpPropagationClient, WebhookNotifier};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn client(server: &MockServer) -> HttpPropagationClient {
    HttpPropagationClient::new(&server.uri(), "/api/update-parameters", "/health", TIMEOUT)
}

fn accepted_set() -> ParameterSet {
    ParameterSet::default().with_provenance("weekly_auto_optimization", 2.75, chrono::Utc::now())
}

#[tokio::test]
async fn test_webhook_payload_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .and(body_partial_json(json!({
            "embeds": [{
                "title": "✅ Weekly optimization accepted",
                "color": 0x00FF00,
                "footer": {"text": "Automated Optimization Pipeline"}
            }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(Some(format!("{}/webhook", server.uri())), TIMEOUT);
    notifier
        .notify(Notification::new(
            "✅ Weekly optimization accepted",
            "6/6 constraints passed",
            Severity::Success,
        ))
        .await;

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["embeds"][0]["timestamp"].is_string());
}

#[tokio::test]
async fn test_webhook_failure_is_counted_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let metrics = Metrics::new().unwrap();
    let notifier =
        WebhookNotifier::new(Some(server.uri()), TIMEOUT).with_metrics(metrics.clone());
    notifier
        .notify(Notification::new("❌ Pipeline run failed", "boom", Severity::Error))
        .await;

    assert_eq!(metrics.notification_failures_total.get() as u64, 1);
}

#[tokio::test]
async fn test_notifier_without_url_is_log_only() {
    let metrics = Metrics::new().unwrap();
    let notifier = WebhookNotifier::new(None, TIMEOUT).with_metrics(metrics.clone());
    assert!(!notifier.is_enabled());

    notifier
        .notify(Notification::new("title", "logged only", Severity::Info))
        .await;

    assert_eq!(metrics.notification_failures_total.get() as u64, 0);
}

#[tokio::test]
async fn test_notifier_posts_once_per_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(Some(server.uri()), TIMEOUT);
    assert!(notifier.is_enabled());
    for title in ["first", "second"] {
        notifier
            .notify(Notification::new(title, "body", Severity::Info))
            .await;
    }

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_propagation_posts_payload() {
    let server = MockServer::start().await;
    let params = accepted_set();
    Mock::given(method("POST"))
        .and(path("/api/update-parameters"))
        .and(body_partial_json(json!({
            "source": "weekly_auto_optimization",
            "score": 2.75
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    tokio_test::assert_ok!(client(&server).propagate(&params).await);
}

#[tokio::test]
async fn test_propagation_non_200_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/update-parameters"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = tokio_test::assert_err!(client(&server).propagate(&accepted_set()).await);
    assert!(matches!(err, PropagationError::Rejected { status: 500 }));
}

#[tokio::test]
async fn test_liveness_requires_active_bot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "degraded",
            "timestamp": "2025-06-01T03:00:00Z",
            "bot_active": false
        })))
        .mount(&server)
        .await;

    let err = tokio_test::assert_err!(client(&server).check_liveness().await);
    assert!(matches!(err, PropagationError::NotLive { .. }));
}

#[tokio::test]
async fn test_liveness_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "bot_active": true
        })))
        .mount(&server)
        .await;

    let status = tokio_test::assert_ok!(client(&server).check_liveness().await);
    assert_eq!(status.status, "ok");
    assert!(status.bot_active);
}

#[tokio::test]
async fn test_unreachable_service() {
    // Nothing listens on the discard port.
    let client = HttpPropagationClient::new("http://127.0.0.1:9", "/update", "/health", Duration::from_secs(1));
    let err = tokio_test::assert_err!(client.propagate(&accepted_set()).await);
    assert!(matches!(err, PropagationError::Unreachable { .. }));
}
