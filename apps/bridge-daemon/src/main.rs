use anyhow::Result;
use camera_arbiter::{CameraArbiter, MockCapture};
use clap::Parser;
use leap_calib::{
    CalibrationCoordinator, CalibrationMode, CalibrationStore, CoordinatorOutputs,
};
use leap_stream::{FrameChannel, FrameTransformer};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "bridge-daemon")]
#[command(about = "Bridges a Leap Motion sensor host to the head-mounted device")]
struct Args {
    /// Control-channel (TCP) port for the calibration handshake
    #[arg(long, default_value = "9000")]
    tcp_port: u16,

    /// Frame-channel (UDP) port for continuous pose frames
    #[arg(long, default_value = "9001")]
    udp_port: u16,

    /// Number of calibration images to capture and send
    #[arg(long, default_value = "10")]
    image_count: usize,

    /// Path of the persisted calibration transform
    #[arg(long, default_value = "calibration.txt")]
    calibration_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    info!("Leap bridge daemon starting");

    let arbiter = Arc::new(CameraArbiter::new(Box::new(MockCapture::default())));
    let store = CalibrationStore::new(&args.calibration_file);

    let (transform_tx, transform_rx) = watch::channel(None);
    let (status_tx, mut status_rx) = watch::channel(false);
    let (text_tx, mut text_rx) = watch::channel(String::new());
    let (mode_tx, mode_rx) = mpsc::channel(1);
    let (frames_tx, _) = broadcast::channel(64);
    let cancel = Arc::new(AtomicBool::new(false));

    // Control channel: calibration handshake and image transfer.
    let listener = TcpListener::bind(("0.0.0.0", args.tcp_port)).await?;
    info!(port = args.tcp_port, "bound control channel");
    let coordinator = CalibrationCoordinator::new(
        arbiter.clone(),
        store,
        args.image_count,
        mode_rx,
        CoordinatorOutputs {
            transform: transform_tx,
            status: status_tx,
            text: text_tx,
        },
        cancel.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = coordinator.run(listener).await {
            warn!("control channel stopped: {e}");
        }
    });

    // Frame channel: continuous pose frames into the transformer.
    let channel = FrameChannel::bind(("0.0.0.0", args.udp_port)).await?;
    info!(port = args.udp_port, "bound frame channel");
    let transformer = FrameTransformer::new(transform_rx, frames_tx.clone());
    tokio::spawn(async move {
        if let Err(e) = transformer.run(channel).await {
            warn!("frame channel stopped: {e}");
        }
    });

    // Surface the published outputs for the operator.
    tokio::spawn(async move {
        while text_rx.changed().await.is_ok() {
            let text = text_rx.borrow().clone();
            if !text.is_empty() {
                info!("{text}");
            }
        }
    });
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            info!(calibrated = *status_rx.borrow(), "calibration status changed");
        }
    });
    let mut frames_rx = frames_tx.subscribe();
    tokio::spawn(async move {
        let mut count: u64 = 0;
        loop {
            match frames_rx.recv().await {
                Ok(_) => {
                    count += 1;
                    if count % 300 == 0 {
                        debug!(count, "transformed frames published");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "frame consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    run_console(mode_tx, arbiter).await;

    cancel.store(true, Ordering::Relaxed);
    info!("Leap bridge daemon shutting down");
    Ok(())
}

/// Drive the external decisions from stdin, standing in for the voice-command
/// layer of the full application: `calibrate` / `load` answer the mode
/// prompt, `capture` stands in for the "take picture" trigger.
async fn run_console(mode_tx: mpsc::Sender<CalibrationMode>, arbiter: Arc<CameraArbiter>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return,
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { return };
                match line.trim().to_ascii_lowercase().as_str() {
                    "calibrate" => {
                        let _ = mode_tx.send(CalibrationMode::Calibrate).await;
                    }
                    "load" => {
                        let _ = mode_tx.send(CalibrationMode::LoadPrevious).await;
                    }
                    "capture" => arbiter.trigger_capture(),
                    "quit" | "exit" => return,
                    "" => {}
                    other => warn!("unknown command {other:?} (try calibrate/load/capture/quit)"),
                }
            }
        }
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
