//! Frame-backed pixel sampling
//!
//! Adapts a raw screen grabber (anything that can hand back an RGBA frame
//! for a screen rectangle) into a [`PixelSource`].

use std::sync::atomic::{AtomicU64, Ordering};

use image::{ImageBuffer, Rgb, RgbaImage};

use super::{color_matches, PixelSource, Point, Region, VisionError};

/// Raw screen capture primitive supplied by the host platform
pub trait FrameGrabber: Send + Sync {
    /// Capture the given screen rectangle as an RGBA image
    fn grab(&self, region: Region) -> Result<RgbaImage, VisionError>;
}

/// Pixel source that captures frames on demand
pub struct ScreenCapture<G> {
    grabber: G,
    /// Number of frames captured so far
    frame_count: AtomicU64,
}

impl<G: FrameGrabber> ScreenCapture<G> {
    /// Create a new screen capture over a grabber
    pub fn new(grabber: G) -> Self {
        Self {
            grabber,
            frame_count: AtomicU64::new(0),
        }
    }

    /// Get the frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    fn capture(&self, region: Region) -> Result<RgbaImage, VisionError> {
        let frame = self.grabber.grab(region)?;
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        if frame.width() < region.width() || frame.height() < region.height() {
            return Err(VisionError::InvalidFrameData);
        }
        Ok(frame)
    }
}

impl<G: FrameGrabber> PixelSource for ScreenCapture<G> {
    fn sample_color(&self, point: Point) -> Result<Rgb<u8>, VisionError> {
        let frame = self.capture(Region::new(point.x, point.y, point.x, point.y))?;
        let pixel = frame.get_pixel(0, 0);
        Ok(Rgb([pixel[0], pixel[1], pixel[2]]))
    }

    fn find_color_in_region(
        &self,
        region: Region,
        target: Rgb<u8>,
        tolerance: u8,
    ) -> Result<Option<Point>, VisionError> {
        let frame = self.capture(region)?;
        let origin = region.origin();

        // Row-major scan so the first hit is the top-left-most match
        for y in 0..region.height() {
            for x in 0..region.width() {
                let pixel = frame.get_pixel(x, y);
                if color_matches(Rgb([pixel[0], pixel[1], pixel[2]]), target, tolerance) {
                    return Ok(Some(origin.offset(x as i32, y as i32)));
                }
            }
        }

        Ok(None)
    }
}

/// Grabber over a single still frame, cropping requested regions out of it.
///
/// Useful for replaying a saved screenshot through the detection code.
pub struct StillFrame {
    frame: RgbaImage,
}

impl StillFrame {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }

    /// Build a still frame from raw RGBA bytes
    pub fn from_raw(frame_data: &[u8], width: u32, height: u32) -> Result<Self, VisionError> {
        let expected_size = (width * height * 4) as usize;
        if frame_data.len() != expected_size {
            return Err(VisionError::InvalidFrameData);
        }

        let frame: RgbaImage = ImageBuffer::from_raw(width, height, frame_data.to_vec())
            .ok_or(VisionError::InvalidFrameData)?;
        Ok(Self { frame })
    }
}

impl FrameGrabber for StillFrame {
    fn grab(&self, region: Region) -> Result<RgbaImage, VisionError> {
        let origin = region.origin();
        if origin.x < 0 || origin.y < 0 {
            return Err(VisionError::OutOfBounds {
                x: origin.x,
                y: origin.y,
            });
        }

        let (x, y) = (origin.x as u32, origin.y as u32);
        if x + region.width() > self.frame.width() || y + region.height() > self.frame.height() {
            return Err(VisionError::OutOfBounds {
                x: origin.x + region.width() as i32 - 1,
                y: origin.y + region.height() as i32 - 1,
            });
        }

        Ok(image::imageops::crop_imm(&self.frame, x, y, region.width(), region.height()).to_image())
    }
}
