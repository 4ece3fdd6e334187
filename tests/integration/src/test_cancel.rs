//! Client-disconnect integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fetchbridge_core::Mode;
    use fetchbridge_http::FetchAdapter;

    use crate::{TestHandler, TestServer, client};

    const ABORT_DEADLINE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_should_abort_handler_when_client_disconnects() {
        let handler = Arc::new(TestHandler::direct());
        let adapter = FetchAdapter::builder(Arc::clone(&handler))
            .mode(Mode::Test)
            .build();
        let server = TestServer::start(adapter).await;

        let result = client()
            .get(server.url("/wait"))
            .timeout(Duration::from_millis(200))
            .send()
            .await;
        assert!(result.is_err());

        tokio::time::timeout(ABORT_DEADLINE, handler.wait_for_abort())
            .await
            .expect("handler never observed the abort");
        assert_eq!(handler.aborts(), 1);
    }

    #[tokio::test]
    async fn test_should_flush_event_stream_before_first_write_completes() {
        let adapter = FetchAdapter::builder(Arc::new(TestHandler::direct()))
            .mode(Mode::Test)
            .build();
        let server = TestServer::start(adapter).await;

        let mut resp = tokio::time::timeout(
            ABORT_DEADLINE,
            client().get(server.url("/events")).send(),
        )
        .await
        .expect("event stream headers never arrived")
        .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");

        let first = tokio::time::timeout(ABORT_DEADLINE, resp.chunk())
            .await
            .expect("first event never arrived")
            .unwrap();
        assert_eq!(first.as_deref(), Some(&b"data: one\n\n"[..]));
        drop(resp);
    }

    #[tokio::test]
    async fn test_should_keep_serving_after_disconnect() {
        let handler = Arc::new(TestHandler::direct());
        let adapter = FetchAdapter::builder(Arc::clone(&handler))
            .mode(Mode::Test)
            .build();
        let server = TestServer::start(adapter).await;

        let _ = client()
            .get(server.url("/wait"))
            .timeout(Duration::from_millis(100))
            .send()
            .await;
        tokio::time::timeout(ABORT_DEADLINE, handler.wait_for_abort())
            .await
            .expect("handler never observed the abort");

        let resp = client().get(server.url("/hello")).send().await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");
    }
}
