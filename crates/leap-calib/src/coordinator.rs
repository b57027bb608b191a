//! Calibration handshake coordinator.
//!
//! Runs one session per control-channel connection:
//! `AwaitingClientReady → ChoosingMode → {AwaitingCamera, LoadingFromStore}
//! → SendingImages → AwaitingCalibrationResult → Done`, with `Failed`
//! reachable from anywhere on a transport error or an explicit failure
//! message from the sensor host. A reconnection starts a fresh session from
//! `AwaitingClientReady`.

use crate::protocol::{self, CameraIntrinsics, ControlMessage};
use crate::{CalibrationStore, CalibrationTransform, Error, Result};
use camera_arbiter::{CameraArbiter, CaptureState, CapturedImage, RequesterId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Interval for the bounded waits on the mode decision and the camera grant.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Capacity of the per-session captured-image queue.
const IMAGE_QUEUE: usize = 4;

/// External choice between running a fresh calibration and loading the
/// previously persisted result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CalibrationMode {
    Calibrate,
    LoadPrevious,
}

/// Handshake states of one control-channel session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    AwaitingClientReady,
    ChoosingMode,
    AwaitingCamera,
    LoadingFromStore,
    SendingImages,
    AwaitingCalibrationResult,
    Done,
    Failed,
}

/// Everything the coordinator publishes for external collaborators: the
/// calibration transform, the calibration-status flag, and human-readable
/// progress text.
pub struct CoordinatorOutputs {
    pub transform: watch::Sender<Option<CalibrationTransform>>,
    pub status: watch::Sender<bool>,
    pub text: watch::Sender<String>,
}

/// Per-connection handshake bookkeeping, reset whenever a new session starts.
struct CalibrationSession {
    state: SessionState,
    images_sent: usize,
    target: usize,
}

impl CalibrationSession {
    fn new(target: usize) -> Self {
        Self {
            state: SessionState::AwaitingClientReady,
            images_sent: 0,
            target,
        }
    }
}

pub struct CalibrationCoordinator {
    arbiter: Arc<CameraArbiter>,
    store: CalibrationStore,
    image_count: usize,
    requester: RequesterId,
    mode_rx: mpsc::Receiver<CalibrationMode>,
    outputs: CoordinatorOutputs,
    cancel: Arc<AtomicBool>,
}

impl CalibrationCoordinator {
    pub fn new(
        arbiter: Arc<CameraArbiter>,
        store: CalibrationStore,
        image_count: usize,
        mode_rx: mpsc::Receiver<CalibrationMode>,
        outputs: CoordinatorOutputs,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            arbiter,
            store,
            image_count,
            requester: RequesterId::new(),
            mode_rx,
            outputs,
            cancel,
        }
    }

    pub fn requester(&self) -> RequesterId {
        self.requester
    }

    /// Accept control-channel connections until cancelled, running one
    /// session per connection. A failed session only abandons that session;
    /// the listener stays available for the sensor host to reconnect.
    pub async fn run(mut self, listener: TcpListener) -> Result<()> {
        self.outputs
            .text
            .send_replace("Sockets bound. Ready to calibrate.".to_string());
        while !self.cancel.load(Ordering::Relaxed) {
            // Accept errors (ECONNABORTED, fd exhaustion) are transient;
            // the listener itself stays usable.
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("control channel accept failed, retrying: {e}");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };
            info!(%peer, "control channel connected");
            match self.run_session(stream).await {
                Ok(state) => info!(?state, "control session ended"),
                Err(Error::Cancelled) => break,
                Err(e) => warn!("control session abandoned: {e}"),
            }
        }
        Ok(())
    }

    /// Drive one session over `stream` to `Done` or `Failed`.
    ///
    /// Whatever ends the session, the camera is never left stranded with
    /// this coordinator as holder.
    pub async fn run_session<S>(&mut self, stream: S) -> Result<SessionState>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Decisions from an earlier session do not carry over.
        while self.mode_rx.try_recv().is_ok() {}
        let mut session = CalibrationSession::new(self.image_count);

        let result = self.session_loop(stream, &mut session).await;
        self.arbiter.release_usage(self.requester);
        result
    }

    async fn session_loop<S>(
        &mut self,
        stream: S,
        session: &mut CalibrationSession,
    ) -> Result<SessionState>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();
        let mut image_rx: Option<mpsc::Receiver<CapturedImage>> = None;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        return Err(Error::Transport(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "control channel closed by peer",
                        )));
                    };
                    match ControlMessage::parse(&line) {
                        Ok(message) => {
                            self.handle_message(message, session, &mut writer, &mut image_rx)
                                .await?;
                        }
                        Err(e) => warn!("ignoring malformed control message: {e}"),
                    }
                }
                Some(image) = recv_image(&mut image_rx),
                    if session.state == SessionState::SendingImages =>
                {
                    self.send_image(image, session, &mut writer, &mut image_rx).await?;
                }
            }

            if matches!(session.state, SessionState::Done | SessionState::Failed) {
                return Ok(session.state);
            }
        }
    }

    async fn handle_message<W>(
        &mut self,
        message: ControlMessage,
        session: &mut CalibrationSession,
        writer: &mut W,
        image_rx: &mut Option<mpsc::Receiver<CapturedImage>>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match message {
            ControlMessage::Ready => {
                if session.state != SessionState::AwaitingClientReady {
                    debug!("ready announcement out of order, ignoring");
                    return Ok(());
                }
                info!("Leap client running, waiting for the calibrate/load decision");
                session.state = SessionState::ChoosingMode;
                self.outputs.text.send_replace(
                    "Leap client ready. Choose calibration or loading the previous result."
                        .to_string(),
                );
                let mode = self.await_mode().await.ok_or(Error::Cancelled)?;
                match mode {
                    CalibrationMode::LoadPrevious => {
                        session.state = SessionState::LoadingFromStore;
                        self.outputs
                            .text
                            .send_replace("Loading from file chosen. Loading now.".to_string());
                        let transform = self.store.load()?;
                        self.publish(transform);
                        send_line(writer, protocol::SKIP_CALIBRATION).await?;
                        session.state = SessionState::Done;
                    }
                    CalibrationMode::Calibrate => {
                        self.outputs
                            .text
                            .send_replace("Calibration chosen. Waiting for camera.".to_string());
                        send_line(writer, protocol::DO_CALIBRATION).await?;
                        session.state = SessionState::AwaitingCamera;
                        *image_rx = Some(self.acquire_camera().await?);
                        session.state = SessionState::SendingImages;
                        self.outputs.text.send_replace(format!(
                            "Leap client ready. Start taking pictures.\nPictures sent: {sent}/{total}",
                            sent = session.images_sent,
                            total = session.target,
                        ));
                    }
                }
            }
            ControlMessage::CalibrationSuccess(transform) => {
                if session.state != SessionState::AwaitingCalibrationResult {
                    warn!("unexpected calibration result, ignoring");
                    return Ok(());
                }
                info!("sensor host reported calibration success");
                self.outputs
                    .text
                    .send_replace("Calibration succesful.".to_string());
                // Persisting is best-effort; a broken disk must not unpublish
                // a perfectly good transform.
                if let Err(e) = self.store.save(&transform) {
                    warn!("could not persist calibration result: {e}");
                }
                self.publish(transform);
                send_line(writer, protocol::HOLO_CALIBRATION_SUCCESS).await?;
                session.state = SessionState::Done;
            }
            ControlMessage::CalibrationFailed => {
                warn!("sensor host reported calibration failure");
                self.outputs
                    .text
                    .send_replace("Calibration failed.".to_string());
                session.state = SessionState::Failed;
            }
            ControlMessage::Unknown(text) => {
                info!("received message: {text}");
            }
        }
        Ok(())
    }

    async fn send_image<W>(
        &mut self,
        image: CapturedImage,
        session: &mut CalibrationSession,
        writer: &mut W,
        image_rx: &mut Option<mpsc::Receiver<CapturedImage>>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.outputs
            .text
            .send_replace("Image captured. Processing.".to_string());
        let bgr = protocol::bgra_to_bgr(&image.bgra);

        // The first image of the batch is preceded by the intrinsics line.
        if session.images_sent == 0 {
            let intrinsics =
                CameraIntrinsics::from_projection(&image.projection, image.width, image.height);
            send_line(writer, &intrinsics.metadata_line(session.target, bgr.len())).await?;
        }

        writer.write_all(&bgr).await?;
        writer.flush().await?;
        session.images_sent += 1;
        debug!(
            sent = session.images_sent,
            total = session.target,
            "calibration image sent"
        );

        if session.images_sent < session.target {
            self.outputs.text.send_replace(format!(
                "Image sent. Ready to take next picture.\nPictures sent: {sent}/{total}",
                sent = session.images_sent,
                total = session.target,
            ));
        } else {
            self.arbiter.release_usage(self.requester);
            *image_rx = None;
            session.images_sent = 0;
            session.state = SessionState::AwaitingCalibrationResult;
            self.outputs
                .text
                .send_replace("All images sent. Waiting for result.".to_string());
        }
        Ok(())
    }

    /// Block (bounded polling, cancellable) until the external collaborator
    /// picks a calibration mode.
    async fn await_mode(&mut self) -> Option<CalibrationMode> {
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return None;
            }
            match tokio::time::timeout(POLL_INTERVAL, self.mode_rx.recv()).await {
                Ok(mode) => return mode,
                Err(_) => {} // poll the cancellation flag again
            }
        }
    }

    /// Block (bounded polling, cancellable) until the camera arbiter grants
    /// usage and the capture device is ready, retrying out of the arbiter's
    /// error state as needed.
    async fn acquire_camera(&self) -> Result<mpsc::Receiver<CapturedImage>> {
        let (tx, rx) = mpsc::channel(IMAGE_QUEUE);
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            if self.arbiter.request_usage(self.requester, tx.clone())
                && self.arbiter.state() == CaptureState::Ready
            {
                return Ok(rx);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn publish(&self, transform: CalibrationTransform) {
        if !transform.is_invertible() {
            warn!("published calibration transform has a non-invertible linear part");
        }
        self.outputs.transform.send_replace(Some(transform));
        self.outputs.status.send_replace(true);
    }
}

async fn recv_image(rx: &mut Option<mpsc::Receiver<CapturedImage>>) -> Option<CapturedImage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
