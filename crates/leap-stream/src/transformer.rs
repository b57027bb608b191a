use crate::{FrameChannel, PoseFrame, Result};
use leap_calib::CalibrationTransform;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Applies the latest published calibration transform to each incoming pose
/// frame and republishes the transformed frame.
///
/// Frames that arrive before any transform has been published are withheld:
/// passing them through would hand consumers sensor-space coordinates that
/// look like camera-space ones. A transform published mid-stream takes
/// effect from the next frame processed.
pub struct FrameTransformer {
    calibration: watch::Receiver<Option<CalibrationTransform>>,
    output: broadcast::Sender<PoseFrame>,
}

impl FrameTransformer {
    pub fn new(
        calibration: watch::Receiver<Option<CalibrationTransform>>,
        output: broadcast::Sender<PoseFrame>,
    ) -> Self {
        Self {
            calibration,
            output,
        }
    }

    /// Transform one frame with the latest published calibration, or `None`
    /// while no calibration exists yet.
    pub fn transform(&self, mut frame: PoseFrame) -> Option<PoseFrame> {
        let calib = (*self.calibration.borrow())?;
        frame.transform(&calib);
        Some(frame)
    }

    /// Drive frames from the channel into the transformed output stream.
    pub async fn run(self, mut channel: FrameChannel) -> Result<()> {
        let mut withheld: u64 = 0;
        loop {
            let frame = channel.recv_frame().await?;
            match self.transform(frame) {
                Some(transformed) => {
                    // Nobody listening is fine; frames are ephemeral.
                    let _ = self.output.send(transformed);
                }
                None => {
                    withheld += 1;
                    if withheld % 100 == 1 {
                        debug!(withheld, "withholding frames until calibration is published");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArmData, ForearmData, HandData};

    fn frame_at(wrist: [f32; 3]) -> PoseFrame {
        PoseFrame {
            left_arm: Some(ArmData {
                forearm: ForearmData {
                    wrist_x: wrist[0],
                    wrist_y: wrist[1],
                    wrist_z: wrist[2],
                    ..ForearmData::default()
                },
                hand: HandData::default(),
            }),
            right_arm: None,
        }
    }

    #[test]
    fn withholds_frames_until_a_transform_is_published() {
        let (calib_tx, calib_rx) = watch::channel(None);
        let (out_tx, _out_rx) = broadcast::channel(8);
        let transformer = FrameTransformer::new(calib_rx, out_tx);

        assert_eq!(transformer.transform(frame_at([1.0, 2.0, 3.0])), None);

        calib_tx.send_replace(Some(CalibrationTransform::IDENTITY));
        let out = transformer.transform(frame_at([1.0, 2.0, 3.0]));
        let wrist = out
            .and_then(|f| f.left_arm)
            .map(|arm| arm.forearm.wrist_position());
        assert_eq!(wrist, Some([1.0, -2.0, 3.0]));
    }

    #[test]
    fn replacement_transform_applies_to_the_next_frame() {
        let (calib_tx, calib_rx) = watch::channel(Some(CalibrationTransform::IDENTITY));
        let (out_tx, _out_rx) = broadcast::channel(8);
        let transformer = FrameTransformer::new(calib_rx, out_tx);

        let translated = CalibrationTransform::from_rotation_translation(
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            [10.0, 0.0, 0.0],
        );
        calib_tx.send_replace(Some(translated));

        let out = transformer.transform(frame_at([1.0, 0.0, 0.0]));
        let wrist = out
            .and_then(|f| f.left_arm)
            .map(|arm| arm.forearm.wrist_position());
        assert_eq!(wrist, Some([11.0, 0.0, 0.0]));
    }
}
