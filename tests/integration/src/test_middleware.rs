//! Middleware-interception integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use fetchbridge_core::{BoxError, FetchBody, FetchResponse, Mode};
    use fetchbridge_http::{FetchAdapter, Interceptor, MiddlewareContext};
    use futures::future::BoxFuture;
    use http::header::{HeaderName, HeaderValue};
    use http::StatusCode;

    use crate::{Label, TestHandler, TestServer, client};

    /// Rejects requests without a token by writing the response itself.
    struct RequireToken;

    impl Interceptor for RequireToken {
        fn intercept<'a>(
            &'a self,
            cx: &'a mut MiddlewareContext<'_>,
        ) -> BoxFuture<'a, Result<Option<FetchResponse>, BoxError>> {
            Box::pin(async move {
                if cx.request().headers().first("authorization").is_none() {
                    let res = cx.response_mut();
                    res.set_status(StatusCode::UNAUTHORIZED);
                    res.append_header(
                        HeaderName::from_static("www-authenticate"),
                        HeaderValue::from_static("Bearer"),
                    );
                    res.write(Bytes::from_static(b"nope")).await?;
                    res.end().await?;
                }
                Ok(None)
            })
        }
    }

    /// Only stores a label; the adapter advances on its behalf.
    struct LabelOnly;

    impl Interceptor for LabelOnly {
        fn intercept<'a>(
            &'a self,
            cx: &'a mut MiddlewareContext<'_>,
        ) -> BoxFuture<'a, Result<Option<FetchResponse>, BoxError>> {
            Box::pin(async move {
                cx.values_mut().insert(Label("from-interceptor".to_owned()));
                Ok(None)
            })
        }
    }

    /// Advances and adds a header to the recorded response.
    struct Stamp;

    impl Interceptor for Stamp {
        fn intercept<'a>(
            &'a self,
            cx: &'a mut MiddlewareContext<'_>,
        ) -> BoxFuture<'a, Result<Option<FetchResponse>, BoxError>> {
            Box::pin(async move {
                let response = cx.advance().await?;
                response.headers_mut().insert(
                    HeaderName::from_static("x-stamped"),
                    HeaderValue::from_static("1"),
                );
                cx.advance().await?;
                Ok(None)
            })
        }
    }

    /// Replaces every response during maintenance.
    struct Maintenance;

    impl Interceptor for Maintenance {
        fn intercept<'a>(
            &'a self,
            _cx: &'a mut MiddlewareContext<'_>,
        ) -> BoxFuture<'a, Result<Option<FetchResponse>, BoxError>> {
            Box::pin(async {
                let response = http::Response::builder()
                    .status(StatusCode::SERVICE_UNAVAILABLE)
                    .header("retry-after", "120")
                    .body(FetchBody::from("down for maintenance"))?;
                Ok(Some(response))
            })
        }
    }

    async fn intercepted(
        handler: TestHandler,
        interceptor: impl Interceptor,
    ) -> (TestServer, Arc<TestHandler>) {
        let handler = Arc::new(handler);
        let adapter = FetchAdapter::builder(Arc::clone(&handler))
            .interceptor(interceptor)
            .mode(Mode::Test)
            .build();
        (TestServer::start(adapter).await, handler)
    }

    #[tokio::test]
    async fn test_should_not_relay_after_interceptor_short_circuit() {
        let (server, handler) = intercepted(TestHandler::with_middleware(), RequireToken).await;

        let resp = client().get(server.url("/hello")).send().await.unwrap();
        assert_eq!(resp.status(), 401);
        assert_eq!(resp.headers()["www-authenticate"], "Bearer");
        assert!(resp.headers().get("set-cookie").is_none());
        assert_eq!(resp.text().await.unwrap(), "nope");
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_should_run_continuation_when_interceptor_passes() {
        let (server, handler) = intercepted(TestHandler::with_middleware(), RequireToken).await;

        let resp = client()
            .get(server.url("/hello"))
            .header("authorization", "Bearer t")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(resp.text().await.unwrap(), "ok");
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_should_expose_interceptor_values_to_handler() {
        let (server, handler) = intercepted(TestHandler::with_middleware(), LabelOnly).await;

        let resp = client().get(server.url("/context")).send().await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "from-interceptor");
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_should_relay_modified_recorded_response_once() {
        let (server, handler) = intercepted(TestHandler::with_middleware(), Stamp).await;

        let resp = client().get(server.url("/hello")).send().await.unwrap();
        assert_eq!(resp.headers()["x-stamped"], "1");
        assert_eq!(resp.text().await.unwrap(), "ok");
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_should_relay_replacement_response() {
        let (server, handler) = intercepted(TestHandler::with_middleware(), Maintenance).await;

        let resp = client().get(server.url("/hello")).send().await.unwrap();
        assert_eq!(resp.status(), 503);
        assert_eq!(resp.headers()["retry-after"], "120");
        assert_eq!(resp.text().await.unwrap(), "down for maintenance");
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_should_answer_continuation_failure_with_server_error() {
        let (server, _handler) = intercepted(TestHandler::with_middleware(), Stamp).await;

        let resp = client().get(server.url("/fail")).send().await.unwrap();
        assert_eq!(resp.status(), 500);
        assert!(resp.headers().get("x-stamped").is_none());
    }

    #[tokio::test]
    async fn test_should_bypass_interceptor_for_plain_handler() {
        let (server, handler) = intercepted(TestHandler::direct(), RequireToken).await;

        let resp = client().get(server.url("/hello")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(handler.calls(), 1);
    }
}
