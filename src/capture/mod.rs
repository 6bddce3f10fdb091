//! Capture session resource guard
//!
//! Device tracks handed to a [`CaptureSession`] are stopped exactly once,
//! whichever way the session ends: finished, abandoned, or dropped mid-way.

use std::time::Duration;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use crate::core::MediaPayload;

/// Hard limit on a single recording
pub const RECORDING_CEILING: Duration = Duration::from_secs(10 * 60);

#[derive(Error, Debug)]
#[error("failed to stop {kind} track: {reason}")]
pub struct TrackStopError {
    pub kind: String,
    pub reason: String,
}

/// A live capture device track (microphone, camera, ...)
pub trait MediaTrack: Send {
    fn kind(&self) -> &str;

    fn stop(&mut self) -> Result<(), TrackStopError>;
}

pub struct CaptureSession {
    mime_type: String,
    tracks: Vec<Box<dyn MediaTrack>>,
    chunks: Vec<Bytes>,
    started_at: Instant,
}

impl CaptureSession {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            tracks: Vec::new(),
            chunks: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_track(mut self, track: impl MediaTrack + 'static) -> Self {
        self.add_track(Box::new(track));
        self
    }

    pub fn add_track(&mut self, track: Box<dyn MediaTrack>) {
        self.tracks.push(track);
    }

    pub fn push_chunk(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn recorded_bytes(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.len() as u64).sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop every track and assemble the recorded chunks into one payload
    pub fn finish(mut self) -> MediaPayload {
        self.release();

        let chunks = std::mem::take(&mut self.chunks);
        let mut data = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in chunks {
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(size = data.len(), mime_type = %self.mime_type, "Capture session finished");
        MediaPayload::new(data.freeze(), self.mime_type.clone())
    }

    /// Stop every track and discard whatever was recorded
    pub fn abandon(mut self) {
        self.release();
        self.chunks.clear();
        tracing::debug!("Capture session abandoned");
    }

    fn release(&mut self) {
        for mut track in self.tracks.drain(..) {
            if let Err(err) = track.stop() {
                tracing::warn!(error = %err, "Track cleanup failed");
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Ceiling,
    SourceEnded,
}

#[derive(Debug)]
pub struct Recording {
    pub payload: MediaPayload,
    pub reason: StopReason,
}

/// Pull chunks into the session until asked to stop, the source runs dry,
/// or `ceiling` elapses, then finalize it.
///
/// Dropping the returned future drops the session, which still releases
/// its tracks.
pub async fn record_with_ceiling<S>(
    mut session: CaptureSession,
    mut chunks: S,
    stop: CancellationToken,
    ceiling: Duration,
) -> Recording
where
    S: Stream<Item = Bytes> + Unpin,
{
    let deadline = tokio::time::sleep(ceiling);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break StopReason::Requested,
            _ = &mut deadline => {
                tracing::warn!(ceiling_secs = ceiling.as_secs(), "Recording hit the duration ceiling");
                break StopReason::Ceiling;
            }
            chunk = chunks.next() => match chunk {
                Some(chunk) => session.push_chunk(chunk),
                None => break StopReason::SourceEnded,
            },
        }
    };

    Recording {
        payload: session.finish(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use futures_util::stream;
    use super::*;

    struct FakeTrack {
        stops: Arc<AtomicUsize>,
        fail: bool,
    }

    impl MediaTrack for FakeTrack {
        fn kind(&self) -> &str {
            "audio"
        }

        fn stop(&mut self) -> Result<(), TrackStopError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TrackStopError {
                    kind: self.kind().to_string(),
                    reason: "device busy".to_string(),
                });
            }
            Ok(())
        }
    }

    fn track(stops: &Arc<AtomicUsize>) -> FakeTrack {
        FakeTrack { stops: stops.clone(), fail: false }
    }

    #[test]
    fn test_finish_concatenates_chunks() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut session = CaptureSession::new("audio/webm").with_track(track(&stops));
        session.push_chunk(&b"ab"[..]);
        session.push_chunk(Bytes::new());
        session.push_chunk(&b"cd"[..]);
        assert_eq!(session.recorded_bytes(), 4);

        let payload = session.finish();
        assert_eq!(payload.data, Bytes::from_static(b"abcd"));
        assert_eq!(payload.mime_type, "audio/webm");
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tracks_released_on_every_exit_path() {
        let stops = Arc::new(AtomicUsize::new(0));

        CaptureSession::new("video/webm")
            .with_track(track(&stops))
            .with_track(track(&stops))
            .abandon();
        assert_eq!(stops.load(Ordering::SeqCst), 2);

        {
            let _session = CaptureSession::new("video/webm").with_track(track(&stops));
        }
        assert_eq!(stops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stop_failure_does_not_block_other_tracks() {
        let stops = Arc::new(AtomicUsize::new(0));
        let session = CaptureSession::new("video/webm")
            .with_track(FakeTrack { stops: stops.clone(), fail: true })
            .with_track(track(&stops));

        session.abandon();
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_record_until_source_ends() {
        let stops = Arc::new(AtomicUsize::new(0));
        let session = CaptureSession::new("audio/ogg").with_track(track(&stops));
        let source = stream::iter(vec![Bytes::from_static(b"Ogg"), Bytes::from_static(b"S")]);

        let recording = record_with_ceiling(session, source, CancellationToken::new(), RECORDING_CEILING).await;
        assert_eq!(recording.reason, StopReason::SourceEnded);
        assert_eq!(recording.payload.data, Bytes::from_static(b"OggS"));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_forces_finalize() {
        let stops = Arc::new(AtomicUsize::new(0));
        let session = CaptureSession::new("audio/ogg").with_track(track(&stops));
        let source = stream::iter(vec![Bytes::from_static(b"data")]).chain(stream::pending());

        let recording = record_with_ceiling(session, source, CancellationToken::new(), RECORDING_CEILING).await;
        assert_eq!(recording.reason, StopReason::Ceiling);
        assert_eq!(recording.payload.size(), 4);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_signal_wins() {
        let stops = Arc::new(AtomicUsize::new(0));
        let session = CaptureSession::new("audio/ogg").with_track(track(&stops));
        let stop = CancellationToken::new();
        stop.cancel();

        let recording = record_with_ceiling(session, stream::pending::<Bytes>(), stop, RECORDING_CEILING).await;
        assert_eq!(recording.reason, StopReason::Requested);
        assert!(recording.payload.data.is_empty());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
