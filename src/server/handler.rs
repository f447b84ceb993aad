//! Request handlers and the routing table.

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// Response type produced by every handler.
pub type HttpResponse = Response<Full<Bytes>>;

/// Future returned by [`Handler::call`].
pub type HandlerFuture = BoxFuture<'static, HttpResponse>;

/// Something that turns a fully read request into a response.
///
/// Handlers never fail: errors are rendered as responses.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Bytes>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, req: Request<Bytes>) -> HandlerFuture {
        Box::pin(self(req))
    }
}

/// Exact-path routing table.
#[derive(Default, Clone)]
pub struct Router {
    routes: Vec<Route>,
}

#[derive(Clone)]
struct Route {
    method: Method,
    path: String,
    handler: Arc<dyn Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `GET path`.
    pub fn get(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.route(Method::GET, path, handler)
    }

    /// Register a handler for a method and path.
    pub fn route(mut self, method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        self.routes.push(Route {
            method,
            path: path.into(),
            handler: Arc::new(handler),
        });
        self
    }

    fn dispatch(&self, req: Request<Bytes>) -> HandlerFuture {
        let path = req.uri().path().to_owned();
        let mut allowed = Vec::new();

        for route in self.routes.iter().filter(|r| r.path == path) {
            if &route.method == req.method() {
                return route.handler.call(req);
            }
            allowed.push(route.method.as_str());
        }

        let response = if allowed.is_empty() {
            text_response(StatusCode::NOT_FOUND, "Not found\n")
        } else {
            let mut response =
                text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n");
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers_mut().insert(ALLOW, value);
            }
            response
        };
        Box::pin(async move { response })
    }
}

impl Handler for Router {
    fn call(&self, req: Request<Bytes>) -> HandlerFuture {
        self.dispatch(req)
    }
}

/// Build a plain-text response.
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Build a JSON response terminated by a newline.
///
/// Falls back to an opaque 500 when the payload cannot be encoded.
pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> HttpResponse {
    match serde_json::to_vec(data) {
        Ok(mut body) => {
            body.push(b'\n');
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "failed to encode JSON response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "something went wrong")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    fn router() -> Router {
        Router::new().get("/health", |_req: Request<Bytes>| async {
            text_response(StatusCode::OK, "OK")
        })
    }

    #[tokio::test]
    async fn test_router_dispatches_exact_path() {
        let response = router().call(request(Method::GET, "/health?verbose=1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");
    }

    #[tokio::test]
    async fn test_router_unknown_path() {
        let response = router().call(request(Method::GET, "/healthz")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_router_wrong_method() {
        let response = router().call(request(Method::POST, "/health")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET");
    }

    #[tokio::test]
    async fn test_json_response_appends_newline() {
        let response = json_response(StatusCode::OK, &serde_json::json!({"data": ["1"]}));
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_string(response).await, "{\"data\":[\"1\"]}\n");
    }
}
