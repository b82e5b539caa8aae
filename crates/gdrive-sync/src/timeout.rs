//! Idle-timeout watchdog for transfer streams.
//!
//! [`TimeoutReader`] wraps a byte source and cancels the associated request
//! context when no byte has arrived for the configured idle window. The
//! watchdog task is armed lazily on the first read and stands down when the
//! stream reaches EOF, fails, or the reader is dropped.
//!
//! The cancellation token is created *before* the request is issued so the
//! transfer is interrupted at the transport layer, not merely on the reader.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval between idle checks. Shorter idle windows are checked at the
/// window itself so small timeouts still fire promptly.
pub const TIMEOUT_TIMER_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct Activity {
    last: Instant,
    done: bool,
}

/// Byte-stream wrapper that cancels a token when the stream goes idle.
pub struct TimeoutReader<R> {
    inner: R,
    activity: Arc<Mutex<Activity>>,
    cancel: CancellationToken,
    max_idle: Duration,
    started: bool,
}

impl<R> TimeoutReader<R> {
    /// Wraps `inner`. `cancel` is triggered once `max_idle` passes without a
    /// successful read.
    pub fn new(inner: R, cancel: CancellationToken, max_idle: Duration) -> Self {
        Self {
            inner,
            activity: Arc::new(Mutex::new(Activity {
                last: Instant::now(),
                done: false,
            })),
            cancel,
            max_idle,
            started: false,
        }
    }

    fn spawn_watchdog(&self) {
        let activity = Arc::clone(&self.activity);
        let cancel = self.cancel.clone();
        let max_idle = self.max_idle;
        let tick = max_idle.min(TIMEOUT_TIMER_INTERVAL).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let idle = {
                    let activity = activity.lock().unwrap();
                    if activity.done {
                        return;
                    }
                    activity.last.elapsed()
                };
                if idle > max_idle {
                    debug!(idle_ms = idle.as_millis() as u64, "transfer idle, cancelling request");
                    cancel.cancel();
                    return;
                }
            }
        });
    }
}

impl<R> Drop for TimeoutReader<R> {
    fn drop(&mut self) {
        self.activity.lock().unwrap().done = true;
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TimeoutReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.started {
            this.started = true;
            this.spawn_watchdog();
        }

        let filled_before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let mut activity = this.activity.lock().unwrap();
                activity.last = Instant::now();
                if buf.filled().len() == filled_before {
                    // EOF: the watchdog stands down.
                    activity.done = true;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => {
                this.activity.lock().unwrap().done = true;
                Poll::Ready(Err(err))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wraps `reader` with a fresh cancellation context. A zero timeout returns
/// the reader untouched together with a token that never fires.
pub fn with_timeout<R>(reader: R, timeout: Duration) -> (Box<dyn AsyncRead + Send + Unpin>, CancellationToken)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let cancel = CancellationToken::new();
    let reader = wrap_with(reader, cancel.clone(), timeout);
    (reader, cancel)
}

/// Wraps `reader` against an existing cancellation context (used for
/// downloads, where the context must exist before the request is issued).
pub fn wrap_with<R>(
    reader: R,
    cancel: CancellationToken,
    timeout: Duration,
) -> Box<dyn AsyncRead + Send + Unpin>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    if timeout.is_zero() {
        Box::new(reader)
    } else {
        Box::new(TimeoutReader::new(reader, cancel, timeout))
    }
}
