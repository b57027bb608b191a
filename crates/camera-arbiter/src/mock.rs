use crate::{CaptureDevice, CaptureError, CapturedImage, Result};
use glam::Mat4;
use time::OffsetDateTime;

/// In-process capture device producing a fixed BGRA gradient so flows are
/// testable without camera hardware.
pub struct MockCapture {
    width: u32,
    height: u32,
    started: bool,
}

impl MockCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            started: false,
        }
    }
}

impl Default for MockCapture {
    fn default() -> Self {
        Self::new(64, 48)
    }
}

impl CaptureDevice for MockCapture {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<CapturedImage> {
        if !self.started {
            return Err(CaptureError::Device("photo mode not started".to_string()));
        }
        let pixels = (self.width * self.height) as usize;
        let mut bgra = Vec::with_capacity(pixels * 4);
        for i in 0..pixels {
            let v = (i % 251) as u8;
            bgra.extend_from_slice(&[v, v.wrapping_add(1), v.wrapping_add(2), 0xFF]);
        }
        Ok(CapturedImage {
            bgra,
            width: self.width,
            height: self.height,
            // Plausible perspective projection for a forward-facing camera
            projection: Mat4::from_cols_array_2d(&[
                [1.52, 0.0, 0.0, 0.0],
                [0.0, 2.71, 0.0, 0.0],
                [-0.01, 0.02, -1.0, -1.0],
                [0.0, 0.0, -0.2, 0.0],
            ]),
            ts: Some(OffsetDateTime::now_utc()),
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }
}
