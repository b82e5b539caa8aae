//! Transfer progress reporting.
//!
//! [`ProgressReader`] wraps a byte source and periodically writes the byte
//! count and a windowed transfer rate to a sink. Two cadences bound the
//! output: the line is redrawn at most once per second (to avoid TTY
//! flicker) and the rate window is recomputed every three seconds.
//! Reporting is suppressed entirely for transfers below 1 MiB and when no
//! sink is configured.

use std::io::{self, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, ReadBuf};

use crate::format::format_size;

/// Minimum interval between redraws.
pub const MAX_DRAW_INTERVAL: Duration = Duration::from_secs(1);

/// Interval at which the rate window is recomputed.
pub const MAX_RATE_INTERVAL: Duration = Duration::from_secs(3);

/// Transfers smaller than this are not reported.
pub const MIN_PROGRESS_SIZE: u64 = 1024 * 1024;

/// Shared sink progress lines are written to.
pub type ProgressSink = Arc<Mutex<dyn Write + Send>>;

/// Byte-stream wrapper that reports progress to a sink.
pub struct ProgressReader<R> {
    inner: R,
    sink: ProgressSink,
    size: u64,
    progress: u64,
    rate: u64,
    rate_progress: u64,
    rate_updated: Option<Instant>,
    drawn: Option<Instant>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, sink: ProgressSink, size: u64) -> Self {
        Self {
            inner,
            sink,
            size,
            progress: 0,
            rate: 0,
            rate_progress: 0,
            rate_updated: None,
            drawn: None,
        }
    }

    fn update(&mut self, read: usize, eof: bool) {
        let now = Instant::now();
        self.progress += read as u64;

        match self.rate_updated {
            None => {
                self.rate_updated = Some(now);
                self.rate_progress = self.progress;
            }
            Some(since) if now.duration_since(since) >= MAX_RATE_INTERVAL => {
                let window = now.duration_since(since).as_secs_f64();
                self.rate = ((self.progress - self.rate_progress) as f64 / window) as u64;
                self.rate_updated = Some(now);
                self.rate_progress = self.progress;
            }
            Some(_) => {}
        }

        let due = match self.drawn {
            None => true,
            Some(last) => now.duration_since(last) >= MAX_DRAW_INTERVAL,
        };
        if due || eof {
            self.draw(eof);
            self.drawn = Some(now);
        }
    }

    fn draw(&mut self, eof: bool) {
        let mut sink = self.sink.lock().unwrap();
        let _ = write!(sink, "\r{:50}\r", "");
        if eof {
            // Leave a clean line behind once the transfer ends.
            let _ = sink.flush();
            return;
        }

        let _ = write!(sink, "{}", format_size(self.progress, false));
        if self.size > 0 {
            let _ = write!(sink, "/{}", format_size(self.size, false));
        }
        if self.rate > 0 {
            let _ = write!(sink, ", Rate: {}/s", format_size(self.rate, false));
        }
        let _ = sink.flush();
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let filled_before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let read = buf.filled().len() - filled_before;
                this.update(read, read == 0);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Wraps `reader` in a progress reporter unless reporting is suppressed:
/// no sink configured, or a known size below [`MIN_PROGRESS_SIZE`].
pub fn with_progress<R>(
    reader: R,
    sink: Option<ProgressSink>,
    size: u64,
) -> Box<dyn AsyncRead + Send + Unpin>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    match sink {
        Some(sink) if size == 0 || size >= MIN_PROGRESS_SIZE => {
            Box::new(ProgressReader::new(reader, sink, size))
        }
        _ => Box::new(reader),
    }
}
