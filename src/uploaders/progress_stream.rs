use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::core::{ProgressFn, UploadProgress};

pin_project! {
    /// Request body wrapper reporting bytes handed to the connection
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        total: u64,
        loaded: u64,
        last_reported: Option<u64>,
        on_progress: ProgressFn,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total: u64, on_progress: ProgressFn) -> Self {
        Self {
            inner,
            total,
            loaded: 0,
            last_reported: None,
            on_progress,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.loaded = (*this.loaded + chunk.len() as u64).min(*this.total);
                    *this.last_reported = Some(*this.loaded);
                    (this.on_progress)(UploadProgress::new(*this.loaded, *this.total));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                // 流结束时，发送最终更新
                if *this.last_reported != Some(*this.loaded) {
                    *this.last_reported = Some(*this.loaded);
                    (this.on_progress)(UploadProgress::new(*this.loaded, *this.total));
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use super::*;

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_total() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abcd")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"efgh")),
            Ok(Bytes::from_static(b"ij")),
        ];

        let stream = ProgressStream::new(
            futures::stream::iter(chunks),
            10,
            Arc::new(move |progress: UploadProgress| sink.lock().push(progress)),
        );
        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 4);

        let events = events.lock();
        let loaded: Vec<_> = events.iter().map(|p| p.loaded).collect();
        assert_eq!(loaded, vec![4, 8, 10]);
        assert_eq!(events.last().unwrap().percentage, 100);
    }

    #[tokio::test]
    async fn test_empty_body_reports_once() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let stream = ProgressStream::new(
            futures::stream::iter(Vec::<std::io::Result<Bytes>>::new()),
            0,
            Arc::new(move |progress: UploadProgress| sink.lock().push(progress)),
        );
        let _: Vec<_> = stream.collect().await;
        assert_eq!(events.lock().len(), 1);
    }
}
