//! Direct-mode integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use fetchbridge_core::{BoxError, Mode};
    use fetchbridge_http::{
        ExchangeOptions, FetchAdapter, LoadContext, ServerRequest, ServerResponse,
    };

    use crate::{LARGE_CHUNKS, Label, TestHandler, TestServer, client};

    async fn direct_server() -> (TestServer, Arc<TestHandler>) {
        let handler = Arc::new(TestHandler::direct());
        let adapter = FetchAdapter::builder(Arc::clone(&handler))
            .mode(Mode::Test)
            .build();
        (TestServer::start(adapter).await, handler)
    }

    #[tokio::test]
    async fn test_should_relay_status_body_and_cookies() {
        let (server, handler) = direct_server().await;

        let resp = client().get(server.url("/hello")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let cookies: Vec<_> = resp
            .headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
        assert!(resp.headers().contains_key("x-request-id"));
        assert_eq!(resp.text().await.unwrap(), "ok");
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_should_build_url_from_host_header() {
        let (server, _handler) = direct_server().await;

        let resp = client()
            .get(server.url("/inspect/a/b?x=1"))
            .send()
            .await
            .unwrap();
        let seen = resp.headers()["x-seen-uri"].to_str().unwrap();
        assert_eq!(seen, server.url("/inspect/a/b?x=1"));
    }

    #[tokio::test]
    async fn test_should_honor_trusted_proxy_headers() {
        let handler = Arc::new(TestHandler::direct());
        let adapter = FetchAdapter::builder(handler).mode(Mode::Test).build();
        let options = ExchangeOptions {
            trust_proxy: true,
            ..ExchangeOptions::default()
        };
        let server = TestServer::start_with(adapter, options).await;

        let resp = client()
            .get(server.url("/inspect/a/b?x=1"))
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "example.com:8443")
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers()["x-seen-uri"],
            "https://example.com:8443/inspect/a/b?x=1"
        );
    }

    #[tokio::test]
    async fn test_should_not_forward_body_on_get() {
        let (server, _handler) = direct_server().await;

        let resp = client()
            .get(server.url("/inspect"))
            .body("unexpected payload")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.headers()["x-seen-body-len"], "0");

        let resp = client()
            .put(server.url("/inspect"))
            .body("expected payload")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.headers()["x-seen-body-len"], "16");
    }

    #[tokio::test]
    async fn test_should_stream_request_body_back() {
        let (server, _handler) = direct_server().await;

        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"first,")),
            Ok(Bytes::from_static(b"second,")),
            Ok(Bytes::from_static(b"third")),
        ]);
        let resp = client()
            .post(server.url("/echo"))
            .body(reqwest::Body::wrap_stream(chunks))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "first,second,third");
    }

    #[tokio::test]
    async fn test_should_answer_handler_failure_with_server_error() {
        let (server, _handler) = direct_server().await;

        let resp = client().get(server.url("/fail")).send().await.unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(
            resp.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let body = resp.text().await.unwrap();
        assert!(!body.contains("exploded"), "details leaked: {body}");
    }

    #[tokio::test]
    async fn test_should_pass_resolved_context_to_handler() {
        let resolver = |req: &dyn ServerRequest, _res: &dyn ServerResponse| {
            let mut values = LoadContext::new();
            if let Some(label) = req.headers().first("x-label") {
                values.insert(Label(label.to_owned()));
            }
            Ok::<_, BoxError>(values)
        };
        let adapter = FetchAdapter::builder(Arc::new(TestHandler::direct()))
            .resolver(resolver)
            .mode(Mode::Test)
            .build();
        let server = TestServer::start(adapter).await;

        let resp = client()
            .get(server.url("/context"))
            .header("x-label", "from-resolver")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), "from-resolver");
    }

    #[tokio::test]
    async fn test_should_serve_concurrent_exchanges() {
        let (server, handler) = direct_server().await;
        let client = client();

        let requests = (0..8).map(|_| {
            let client = client.clone();
            let url = server.url("/hello");
            async move { client.get(url).send().await?.text().await }
        });
        let bodies = futures::future::try_join_all(requests).await.unwrap();

        assert!(bodies.iter().all(|body| body == "ok"));
        assert_eq!(handler.calls(), 8);
    }

    #[tokio::test]
    async fn test_should_complete_head_request_without_body() {
        let (server, handler) = direct_server().await;

        let resp = client().head(server.url("/large")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.bytes().await.unwrap().is_empty());

        // The relay drains the whole body instead of failing on the dropped stream.
        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.streamed_chunks() < LARGE_CHUNKS {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("relay stopped before the end of the body");

        let resp = client().get(server.url("/large")).send().await.unwrap();
        assert_eq!(resp.bytes().await.unwrap().len(), LARGE_CHUNKS * 16 * 1024);
    }
}
