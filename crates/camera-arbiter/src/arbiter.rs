use crate::{CaptureDevice, CaptureState, CapturedImage, RequesterId};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Where captured images are delivered while a holder has the camera.
pub type ImageSink = mpsc::Sender<CapturedImage>;

/// Mutual-exclusion owner of the single physical camera.
///
/// States: `Idle → StartingCapture → {Error, Ready} → Capturing → Ready …
/// → Stopping → Idle`. Every transition runs under one lock, so device
/// start/capture/stop are strictly serialized and there is never more than
/// one holder.
pub struct CameraArbiter {
    inner: Mutex<Inner>,
}

struct Inner {
    state: CaptureState,
    holder: Option<Holder>,
    device: Box<dyn CaptureDevice>,
}

struct Holder {
    id: RequesterId,
    sink: ImageSink,
}

impl CameraArbiter {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CaptureState::Idle,
                holder: None,
                device,
            }),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    pub fn holder(&self) -> Option<RequesterId> {
        self.lock().holder.as_ref().map(|h| h.id)
    }

    /// Grant exclusive use of the camera to `requester` and start photo mode.
    ///
    /// Succeeds only from `Idle` with no current holder, or from `Error` when
    /// the caller is already the recorded holder (retry after a failed
    /// start). Anything else returns `false` with no side effects. Captured
    /// images are delivered to `sink` for as long as the grant lasts.
    pub fn request_usage(&self, requester: RequesterId, sink: ImageSink) -> bool {
        let mut inner = self.lock();
        let fresh = inner.state == CaptureState::Idle && inner.holder.is_none();
        let retry = inner.state == CaptureState::Error
            && inner.holder.as_ref().is_some_and(|h| h.id == requester);
        if !(fresh || retry) {
            return false;
        }

        inner.holder = Some(Holder {
            id: requester,
            sink,
        });
        inner.state = CaptureState::StartingCapture;
        match inner.device.start() {
            Ok(()) => {
                info!(%requester, "photo mode started");
                inner.state = CaptureState::Ready;
            }
            Err(e) => {
                // Holder is retained so the same caller can retry.
                error!(%requester, "failed to start photo mode: {e}");
                inner.state = CaptureState::Error;
            }
        }
        true
    }

    /// Take one photo and deliver it to the current holder.
    ///
    /// Ignored unless the arbiter is `Ready`. A failed capture is logged and
    /// leaves the arbiter `Ready` for another attempt.
    pub fn trigger_capture(&self) {
        let mut inner = self.lock();
        if inner.state != CaptureState::Ready {
            debug!(state = ?inner.state, "capture trigger ignored");
            return;
        }
        inner.state = CaptureState::Capturing;
        match inner.device.capture() {
            Ok(image) => {
                debug!(
                    width = image.width,
                    height = image.height,
                    "captured image to memory, delivering to holder"
                );
                if let Some(holder) = &inner.holder {
                    if let Err(e) = holder.sink.try_send(image) {
                        warn!("dropping captured image, holder is not keeping up: {e}");
                    }
                }
            }
            Err(e) => error!("failed to capture image to memory: {e}"),
        }
        inner.state = CaptureState::Ready;
    }

    /// Release the camera so another requester can use it.
    ///
    /// A no-op unless `requester` is the current holder. A failing device
    /// stop is logged but the camera still returns to `Idle` with the holder
    /// cleared.
    pub fn release_usage(&self, requester: RequesterId) {
        let mut inner = self.lock();
        if !inner.holder.as_ref().is_some_and(|h| h.id == requester) {
            return;
        }
        inner.state = CaptureState::Stopping;
        if let Err(e) = inner.device.stop() {
            error!("unexpected error when stopping photo mode: {e}");
        }
        inner.holder = None;
        inner.state = CaptureState::Idle;
        info!(%requester, "camera released");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureError, MockCapture, Result};

    /// Device whose photo mode fails to start a configurable number of times.
    struct FlakyStart {
        failures_left: u32,
        delegate: MockCapture,
    }

    impl CaptureDevice for FlakyStart {
        fn start(&mut self) -> Result<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(CaptureError::Device("simulated start failure".to_string()));
            }
            self.delegate.start()
        }

        fn capture(&mut self) -> Result<CapturedImage> {
            self.delegate.capture()
        }

        fn stop(&mut self) -> Result<()> {
            self.delegate.stop()
        }
    }

    fn arbiter() -> CameraArbiter {
        CameraArbiter::new(Box::new(MockCapture::new(8, 4)))
    }

    fn sink() -> (ImageSink, mpsc::Receiver<CapturedImage>) {
        mpsc::channel(4)
    }

    #[test]
    fn grants_at_most_one_holder() {
        let arbiter = arbiter();
        let first = RequesterId::new();
        let second = RequesterId::new();
        let (tx1, _rx1) = sink();
        let (tx2, _rx2) = sink();

        assert!(arbiter.request_usage(first, tx1));
        assert_eq!(arbiter.state(), CaptureState::Ready);
        assert_eq!(arbiter.holder(), Some(first));

        assert!(!arbiter.request_usage(second, tx2));
        assert_eq!(arbiter.holder(), Some(first));
    }

    #[test]
    fn release_from_non_holder_is_a_no_op() {
        let arbiter = arbiter();
        let holder = RequesterId::new();
        let other = RequesterId::new();
        let (tx, _rx) = sink();

        assert!(arbiter.request_usage(holder, tx));
        arbiter.release_usage(other);
        assert_eq!(arbiter.state(), CaptureState::Ready);
        assert_eq!(arbiter.holder(), Some(holder));

        arbiter.release_usage(holder);
        assert_eq!(arbiter.state(), CaptureState::Idle);
        assert_eq!(arbiter.holder(), None);
    }

    #[test]
    fn failed_start_keeps_holder_and_allows_retry() {
        let arbiter = CameraArbiter::new(Box::new(FlakyStart {
            failures_left: 1,
            delegate: MockCapture::new(8, 4),
        }));
        let holder = RequesterId::new();
        let other = RequesterId::new();
        let (tx, _rx) = sink();
        let (tx_other, _rx_other) = sink();

        assert!(arbiter.request_usage(holder, tx.clone()));
        assert_eq!(arbiter.state(), CaptureState::Error);
        assert_eq!(arbiter.holder(), Some(holder));

        // Only the recorded holder may retry out of the error state.
        assert!(!arbiter.request_usage(other, tx_other));
        assert!(arbiter.request_usage(holder, tx));
        assert_eq!(arbiter.state(), CaptureState::Ready);
    }

    #[test]
    fn capture_delivers_to_holder_sink() {
        let arbiter = arbiter();
        let holder = RequesterId::new();
        let (tx, mut rx) = sink();

        assert!(arbiter.request_usage(holder, tx));
        arbiter.trigger_capture();
        assert_eq!(arbiter.state(), CaptureState::Ready);

        let image = match rx.try_recv() {
            Ok(image) => image,
            Err(e) => panic!("expected a delivered image: {e}"),
        };
        assert_eq!(image.width, 8);
        assert_eq!(image.height, 4);
        assert_eq!(image.bgra.len(), 8 * 4 * 4);
    }

    #[test]
    fn capture_trigger_ignored_when_not_ready() {
        let arbiter = arbiter();
        arbiter.trigger_capture();
        assert_eq!(arbiter.state(), CaptureState::Idle);
    }
}
