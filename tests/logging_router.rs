use std::sync::{Arc, Mutex};

use cloud_infra::contract::{
    Environment, EventLogger, LogEvent, LogSeverity, LoggingError, MockEventLogger,
};
use cloud_infra::logging::{EventRouter, LogEngine};

/// Collects every event dispatched through a mock cloud logger.
fn capturing_logger(events: Arc<Mutex<Vec<(String, LogEvent)>>>) -> MockEventLogger {
    let mut logger = MockEventLogger::new();
    logger.expect_log_event().returning(move |log_id, event| {
        events
            .lock()
            .expect("event sink lock")
            .push((log_id.to_string(), event));
        Ok(())
    });
    logger
}

#[tokio::test]
async fn google_engine_forwards_to_the_cloud_logger() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let logger: Arc<dyn EventLogger> = Arc::new(capturing_logger(events.clone()));
    let router = EventRouter::new("infra-test", Environment::Dev, LogEngine::Google, Some(logger));

    router
        .dispatch(
            LogEvent::new("Model Trained", "Training finished")
                .with_severity(LogSeverity::Warning)
                .with_label("modelName", "churn-v2"),
        )
        .await
        .expect("dispatch succeeds");

    let captured = events.lock().expect("event sink lock");
    assert_eq!(captured.len(), 1);
    let (log_id, event) = &captured[0];
    assert_eq!(log_id, "infra-test");
    assert_eq!(event.name, "Model Trained");
    assert_eq!(event.severity, LogSeverity::Warning);
    // The router fills the default environment and stamps the run id.
    assert_eq!(event.environment, Some(Environment::Dev));
    assert!(event.labels.contains_key("invocationId"));
    assert_eq!(event.labels["modelName"], "churn-v2");
}

#[tokio::test]
async fn dispatch_surfaces_backend_failures() {
    let mut logger = MockEventLogger::new();
    logger.expect_log_event().returning(|_, _| {
        Err(LoggingError::Unexpected {
            status: 503,
            body: "unavailable".to_string(),
        })
    });
    let logger: Arc<dyn EventLogger> = Arc::new(logger);
    let router = EventRouter::new("infra-test", Environment::Dev, LogEngine::Google, Some(logger));

    let result = router.dispatch(LogEvent::new("Event", "message")).await;
    assert!(matches!(
        result,
        Err(LoggingError::Unexpected { status: 503, .. })
    ));
}

#[tokio::test]
async fn emit_swallows_backend_failures() {
    let mut logger = MockEventLogger::new();
    logger.expect_log_event().returning(|_, _| {
        Err(LoggingError::Unexpected {
            status: 500,
            body: "boom".to_string(),
        })
    });
    let logger: Arc<dyn EventLogger> = Arc::new(logger);
    let router = EventRouter::new("infra-test", Environment::Dev, LogEngine::Google, Some(logger));

    // Must not panic or propagate: audit logging is best-effort here.
    router.emit(LogEvent::new("Event", "message")).await;
}

#[tokio::test]
async fn local_engine_never_touches_the_cloud_logger() {
    let mut logger = MockEventLogger::new();
    logger.expect_log_event().times(0);
    let logger: Arc<dyn EventLogger> = Arc::new(logger);
    let router = EventRouter::new("infra-test", Environment::Dev, LogEngine::Local, Some(logger));

    router
        .dispatch(LogEvent::new("Event", "message"))
        .await
        .expect("local dispatch succeeds");
}
