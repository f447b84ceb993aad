//! Per-connection serving: timeouts, header limits and idle tracking.

use crate::config::ServerTimeouts;
use crate::server::handler::{Handler, HttpResponse, text_response};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bytes charged per header line on top of name and value (`": "` and CRLF).
const HEADER_LINE_OVERHEAD: usize = 4;

/// Serve one accepted connection until the client leaves, the connection
/// idles out, or `stop` asks it to drain.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn Handler>,
    timeouts: ServerTimeouts,
    stop: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!(error = %e, client = %peer, "failed to set TCP_NODELAY");
    }

    let activity = Activity::new();
    let io = TokioIo::new(TrackedIo::new(stream, activity.clone()));

    let service_activity = activity.clone();
    let service = service_fn(move |req| {
        let handler = Arc::clone(&handler);
        let activity = service_activity.clone();
        async move {
            let _in_flight = activity.begin_request();
            Ok::<_, Infallible>(dispatch(req, handler.as_ref(), &timeouts).await)
        }
    });

    // No hyper timer: its header deadline also runs while a keep-alive
    // connection waits for the next request, which belongs to `idle`.
    let conn = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(io, service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(error = %e, client = %peer, "connection error");
                }
                break;
            }
            _ = stop.cancelled(), if !draining => {
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
            _ = activity.idle_for(timeouts.idle), if !draining => {
                debug!(client = %peer, "closing idle connection");
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
            _ = activity.header_overdue(timeouts.read_header) => {
                debug!(
                    client = %peer,
                    timeout = ?timeouts.read_header,
                    "timed out reading request headers"
                );
                break;
            }
        }
    }
}

/// Read the request under the configured limits and hand it to the handler.
async fn dispatch(
    req: Request<Incoming>,
    handler: &dyn Handler,
    timeouts: &ServerTimeouts,
) -> HttpResponse {
    let header_bytes = request_header_bytes(&req);
    if header_bytes > timeouts.max_header_bytes {
        debug!(
            header_bytes,
            limit = timeouts.max_header_bytes,
            "request headers too large"
        );
        return text_response(
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "Request Header Fields Too Large\n",
        );
    }

    let (parts, body) = req.into_parts();
    let body = match tokio::time::timeout(timeouts.read, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) => {
            debug!(error = %e, "failed to read request body");
            return text_response(StatusCode::BAD_REQUEST, "Bad Request\n");
        }
        Err(_) => {
            warn!(timeout = ?timeouts.read, "timed out reading request");
            return text_response(StatusCode::REQUEST_TIMEOUT, "Request Timeout\n");
        }
    };

    let req = Request::from_parts(parts, body);
    match tokio::time::timeout(timeouts.write, handler.call(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(timeout = ?timeouts.write, "timed out producing response");
            text_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable\n")
        }
    }
}

/// Size of the request line plus every header line, as sent on the wire.
pub(crate) fn request_header_bytes<B>(req: &Request<B>) -> usize {
    let request_line = req.method().as_str().len()
        + req.uri().path_and_query().map_or(1, |pq| pq.as_str().len())
        + "HTTP/1.1".len()
        + HEADER_LINE_OVERHEAD;

    req.headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + HEADER_LINE_OVERHEAD)
        .sum::<usize>()
        + request_line
}

/// Tracks I/O recency and in-flight requests for one connection.
#[derive(Clone)]
struct Activity {
    inner: Arc<ActivityInner>,
}

struct ActivityInner {
    last_io: Mutex<Instant>,
    in_flight: AtomicUsize,
    /// When the first byte of a request head not yet handed to the service arrived.
    head_started: Mutex<Option<Instant>>,
    head_arrived: Notify,
}

impl Activity {
    fn new() -> Self {
        Self {
            inner: Arc::new(ActivityInner {
                last_io: Mutex::new(Instant::now()),
                in_flight: AtomicUsize::new(0),
                head_started: Mutex::new(None),
                head_arrived: Notify::new(),
            }),
        }
    }

    fn touch(&self) {
        *self.inner.last_io.lock() = Instant::now();
    }

    /// Bytes were read from the client. Between requests they start the
    /// header deadline of the next one.
    fn record_read(&self) {
        self.touch();
        if self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            return;
        }

        let mut head_started = self.inner.head_started.lock();
        if head_started.is_none() {
            *head_started = Some(Instant::now());
            self.inner.head_arrived.notify_one();
        }
    }

    fn begin_request(&self) -> InFlight {
        *self.inner.head_started.lock() = None;
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            activity: self.clone(),
        }
    }

    /// Resolves once the connection has had no traffic and no request in
    /// flight for `idle`.
    async fn idle_for(&self, idle: Duration) {
        loop {
            let deadline = *self.inner.last_io.lock() + idle;
            tokio::time::sleep_until(deadline).await;

            let quiet = self.inner.last_io.lock().elapsed() >= idle;
            if quiet && self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            if quiet {
                // A request is still being handled; check again after another window.
                self.touch();
            }
        }
    }

    /// Resolves once a request head has been arriving for longer than `limit`.
    /// Never resolves while the connection sits between requests.
    async fn header_overdue(&self, limit: Duration) {
        loop {
            let started = *self.inner.head_started.lock();
            match started {
                Some(started) => {
                    tokio::time::sleep_until(started + limit).await;
                    let overdue = self
                        .inner
                        .head_started
                        .lock()
                        .is_some_and(|started| started.elapsed() >= limit);
                    if overdue {
                        return;
                    }
                }
                None => self.inner.head_arrived.notified().await,
            }
        }
    }
}

struct InFlight {
    activity: Activity,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.activity.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.activity.touch();
    }
}

pin_project! {
    /// Stream wrapper that records the time of the last successful read or write.
    struct TrackedIo<T> {
        #[pin]
        inner: T,
        activity: Activity,
    }
}

impl<T> TrackedIo<T> {
    fn new(inner: T, activity: Activity) -> Self {
        Self { inner, activity }
    }
}

impl<T: AsyncRead> AsyncRead for TrackedIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        if matches!(result, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.activity.record_read();
        }
        result
    }
}

impl<T: AsyncWrite> AsyncWrite for TrackedIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let result = this.inner.poll_write(cx, buf);
        if matches!(result, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_request_header_bytes() {
        let req = Request::builder()
            .uri("/fizzbuzz?limit=3")
            .header("authorization", "secret")
            .body(())
            .unwrap();

        // "GET" + "/fizzbuzz?limit=3" + "HTTP/1.1" + 4, then "authorization" + "secret" + 4
        assert_eq!(request_header_bytes(&req), 3 + 17 + 8 + 4 + 13 + 6 + 4);
    }

    #[test]
    fn test_large_header_exceeds_default_cap() {
        let req = Request::builder()
            .uri("/")
            .header("x-padding", "a".repeat(2048))
            .body(())
            .unwrap();
        assert!(request_header_bytes(&req) > ServerTimeouts::default().max_header_bytes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_waits_for_in_flight_requests() {
        let activity = Activity::new();
        let guard = activity.begin_request();

        let idle = tokio::time::timeout(
            Duration::from_secs(10),
            activity.idle_for(Duration::from_secs(1)),
        )
        .await;
        assert!(idle.is_err(), "connection with a request in flight is not idle");

        drop(guard);
        tokio::time::timeout(
            Duration::from_secs(3),
            activity.idle_for(Duration::from_secs(1)),
        )
        .await
        .expect("connection becomes idle once the request finishes");
    }

    #[tokio::test]
    async fn test_only_reads_between_requests_start_header_deadline() {
        let activity = Activity::new();
        let mock = tokio_test::io::Builder::new()
            .read(b"GET / HTTP/1.1\r\n")
            .read(b"body bytes")
            .build();
        let mut io = TrackedIo::new(mock, activity.clone());
        let mut buf = [0u8; 64];

        io.read(&mut buf).await.unwrap();
        assert!(activity.inner.head_started.lock().is_some());

        let in_flight = activity.begin_request();
        assert!(activity.inner.head_started.lock().is_none());

        io.read(&mut buf).await.unwrap();
        assert!(activity.inner.head_started.lock().is_none());
        drop(in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_deadline_ignores_time_between_requests() {
        let activity = Activity::new();
        let mut overdue = tokio_test::task::spawn(activity.header_overdue(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_pending!(overdue.poll());

        activity.record_read();
        assert!(overdue.is_woken());
        assert_pending!(overdue.poll());

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_ready!(overdue.poll());
    }
}
