//! Wire protocol of the control channel.
//!
//! Line-oriented text, except for the raw pixel payload that follows the
//! per-batch metadata line. The message spellings (including the sensor
//! host's "successfull") are fixed by the Leap-side client and must not be
//! touched.

use crate::{CalibrationTransform, Error, Result};
use glam::Mat4;

pub const READY_FOR_CALIBRATION: &str = "Leap Motion is running and ready for calibration";
pub const LEAP_CALIBRATION_SUCCESS: &str = "Calibration successfull";
pub const LEAP_CALIBRATION_FAILURE: &str = "Calibration failed";
pub const DO_CALIBRATION: &str = "Do calibration";
pub const SKIP_CALIBRATION: &str = "Skip calibration";
pub const HOLO_CALIBRATION_SUCCESS: &str = "Hololens calibration success";

/// One parsed line from the sensor host.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    Ready,
    CalibrationSuccess(CalibrationTransform),
    CalibrationFailed,
    Unknown(String),
}

impl ControlMessage {
    /// Classify a received line. Unrecognized lines come back as `Unknown`
    /// so the caller can log and ignore them; a success line with a bad
    /// payload is a protocol error.
    pub fn parse(line: &str) -> Result<Self> {
        if line == READY_FOR_CALIBRATION {
            Ok(Self::Ready)
        } else if let Some(payload) = line.strip_prefix(LEAP_CALIBRATION_SUCCESS) {
            Ok(Self::CalibrationSuccess(parse_success_payload(payload)?))
        } else if line == LEAP_CALIBRATION_FAILURE {
            Ok(Self::CalibrationFailed)
        } else {
            Ok(Self::Unknown(line.to_string()))
        }
    }
}

/// Parse the 12 semicolon-separated terms trailing the success announcement:
/// a row-major 3x3 rotation followed by the translation.
fn parse_success_payload(payload: &str) -> Result<CalibrationTransform> {
    let mut terms = Vec::with_capacity(12);
    // The payload starts with the delimiter, so skip the empty leading token.
    for tok in payload.split(';').skip(1) {
        let value = tok
            .trim()
            .parse::<f32>()
            .map_err(|_| Error::Protocol(format!("bad calibration term {tok:?}")))?;
        terms.push(value);
    }
    if terms.len() != 12 {
        return Err(Error::Protocol(format!(
            "expected 12 calibration terms, got {n}",
            n = terms.len()
        )));
    }

    let mut r = [0.0f32; 9];
    r.copy_from_slice(&terms[..9]);
    let mut t = [0.0f32; 3];
    t.copy_from_slice(&terms[9..]);
    Ok(CalibrationTransform::from_rotation_translation(r, t))
}

/// Pinhole intrinsics derived from a capture's projection matrix, sent to
/// the sensor host ahead of the first image of a batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    /// Remap clip-space projection terms into pixel-space pinhole terms:
    /// focal lengths scaled by half the image dimensions, principal point
    /// from the (0,2)/(1,2) terms shifted out of [-1, 1].
    pub fn from_projection(projection: &Mat4, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        // glam matrices are column-major; `z_axis.x` is the (0,2) term.
        let m00 = projection.x_axis.x;
        let m11 = projection.y_axis.y;
        let m02 = projection.z_axis.x;
        let m12 = projection.z_axis.y;
        Self {
            fx: m00 * w / 2.0,
            fy: m11 * h / 2.0,
            cx: (m02 + 1.0) / 2.0 * w,
            cy: (m12 + 1.0) / 2.0 * h,
            width,
            height,
        }
    }

    /// Metadata line preceding the first image:
    /// `fx;fy;cx;cy;width;height;imageCount;imageSize`.
    pub fn metadata_line(&self, image_count: usize, image_size: usize) -> String {
        format!(
            "{fx};{fy};{cx};{cy};{w};{h};{image_count};{image_size}",
            fx = self.fx,
            fy = self.fy,
            cx = self.cx,
            cy = self.cy,
            w = self.width,
            h = self.height,
        )
    }
}

/// Strip the alpha channel from a BGRA32 buffer, keeping the first three
/// bytes of every four-byte pixel group.
pub fn bgra_to_bgr(bgra: &[u8]) -> Vec<u8> {
    let mut bgr = Vec::with_capacity(bgra.len() / 4 * 3);
    for px in bgra.chunks_exact(4) {
        bgr.extend_from_slice(&px[..3]);
    }
    bgr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ready_and_failure_lines() -> Result<()> {
        assert_eq!(
            ControlMessage::parse(READY_FOR_CALIBRATION)?,
            ControlMessage::Ready
        );
        assert_eq!(
            ControlMessage::parse(LEAP_CALIBRATION_FAILURE)?,
            ControlMessage::CalibrationFailed
        );
        assert_eq!(
            ControlMessage::parse("Resume data streaming")?,
            ControlMessage::Unknown("Resume data streaming".to_string())
        );
        Ok(())
    }

    #[test]
    fn success_payload_builds_rotation_and_translation() -> Result<()> {
        let line = format!("{LEAP_CALIBRATION_SUCCESS};1;0;0;0;1;0;0;0;1;5;6;7");
        let ControlMessage::CalibrationSuccess(transform) = ControlMessage::parse(&line)? else {
            return Err(Error::Protocol("expected a success message".to_string()));
        };
        assert_eq!(
            transform,
            CalibrationTransform::from_rows([
                [1.0, 0.0, 0.0, 5.0],
                [0.0, 1.0, 0.0, 6.0],
                [0.0, 0.0, 1.0, 7.0],
                [0.0, 0.0, 0.0, 1.0],
            ])
        );
        Ok(())
    }

    #[test]
    fn truncated_success_payload_is_a_protocol_error() {
        let line = format!("{LEAP_CALIBRATION_SUCCESS};1;2;3");
        assert!(matches!(
            ControlMessage::parse(&line),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn bgra_to_bgr_preserves_leading_bytes_of_each_pixel() {
        let bgra = [10u8, 20, 30, 255, 40, 50, 60, 0];
        assert_eq!(bgra_to_bgr(&bgra), vec![10, 20, 30, 40, 50, 60]);

        let long: Vec<u8> = (0..64u8).collect();
        let out = bgra_to_bgr(&long);
        assert_eq!(out.len(), long.len() / 4 * 3);
        for (px, group) in out.chunks_exact(3).zip(long.chunks_exact(4)) {
            assert_eq!(px, &group[..3]);
        }
    }

    #[test]
    fn intrinsics_remap_projection_terms_into_pixel_space() {
        let projection = Mat4::from_cols_array_2d(&[
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 3.0, 0.0, 0.0],
            [0.5, -0.5, -1.0, -1.0],
            [0.0, 0.0, -0.2, 0.0],
        ]);
        let k = CameraIntrinsics::from_projection(&projection, 640, 480);
        assert_eq!(k.fx, 640.0);
        assert_eq!(k.fy, 720.0);
        assert_eq!(k.cx, 480.0);
        assert_eq!(k.cy, 120.0);
        assert_eq!(k.metadata_line(5, 1024), "640;720;480;120;640;480;5;1024");
    }
}
