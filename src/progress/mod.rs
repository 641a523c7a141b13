use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use pin_project_lite::pin_project;

/// Progress snapshot surfaced on every chunk that hits the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// `round(bytes_sent / total_bytes * 100)`, clamped so it never
    /// decreases within one transfer.
    pub percent: u8,
}

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Accumulates transmitted bytes and reports a monotonic percentage.
pub struct ProgressTracker {
    total_bytes: u64,
    bytes_sent: Mutex<u64>,
    last_percent: Mutex<u8>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            bytes_sent: Mutex::new(0),
            last_percent: Mutex::new(0),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Accumulate bytes and fire the callback.
    pub fn record_bytes(&self, bytes: u64) {
        let sent = {
            let mut bytes_sent = self.bytes_sent.lock();
            *bytes_sent += bytes;
            *bytes_sent
        };

        let computed = if self.total_bytes == 0 {
            100
        } else {
            ((sent as f64 / self.total_bytes as f64) * 100.0).round().min(100.0) as u8
        };

        let percent = {
            let mut last = self.last_percent.lock();
            // A retried or reordered chunk must never walk the bar backwards.
            *last = (*last).max(computed);
            *last
        };

        if let Some(ref callback) = self.callback {
            callback(UploadProgress {
                bytes_sent: sent,
                total_bytes: self.total_bytes,
                percent,
            });
        }
    }
}

pin_project! {
    /// Wraps a body stream and counts every chunk that passes through.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        tracker: Arc<ProgressTracker>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, tracker: Arc<ProgressTracker>) -> Self {
        Self { inner, tracker }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let bytes_len = chunk.len();
                if bytes_len > 0 {
                    this.tracker.record_bytes(bytes_len as u64);
                }

                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn percent_is_rounded_and_capped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = ProgressTracker::new(300).with_callback(Arc::new(move |p: UploadProgress| {
            sink.lock().push(p.percent);
        }));

        tracker.record_bytes(100); // 33.3 -> 33
        tracker.record_bytes(100); // 66.7 -> 67
        tracker.record_bytes(100); // 100
        tracker.record_bytes(50); // over-count still capped

        assert_eq!(*seen.lock(), vec![33, 67, 100, 100]);
    }

    #[test]
    fn percent_never_decreases() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = ProgressTracker::new(1000).with_callback(Arc::new(move |p: UploadProgress| {
            sink.lock().push(p.percent);
        }));

        for _ in 0..10 {
            tracker.record_bytes(100);
        }

        let percents = seen.lock().clone();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[test]
    fn zero_length_body_reports_complete() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = ProgressTracker::new(0).with_callback(Arc::new(move |p: UploadProgress| {
            sink.lock().push(p.percent);
        }));

        tracker.record_bytes(1);
        assert_eq!(*seen.lock(), vec![100]);
    }

    #[tokio::test]
    async fn stream_counts_every_chunk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = Arc::new(ProgressTracker::new(6).with_callback(Arc::new(
            move |p: UploadProgress| {
                sink.lock().push((p.bytes_sent, p.percent));
            },
        )));

        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
            Ok(Bytes::from_static(b"ef")),
        ];
        let mut stream = ProgressStream::new(futures::stream::iter(chunks), tracker);

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.push(chunk.unwrap());
        }

        assert_eq!(collected.len(), 3);
        assert_eq!(*seen.lock(), vec![(2, 33), (4, 67), (6, 100)]);
    }
}
