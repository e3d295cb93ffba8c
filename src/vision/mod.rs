//! Vision and pixel sampling module
//!
//! Screen geometry types, the pixel sampling seam used by the automation
//! loop, and reading of the catch result label.

pub mod capture;
pub mod ocr;

use image::Rgb;
use serde::{Deserialize, Serialize};

pub use capture::{FrameGrabber, ScreenCapture};
pub use ocr::{read_label_with_timeout, ItemMatcher, ResultReader, UNKNOWN_LABEL};

/// Pure white, the colour the trigger pixel and completed border turn to
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// A screen coordinate in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset this point by the given deltas
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// An inclusive screen rectangle given by two corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Width in pixels (inclusive bounds)
    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).unsigned_abs() + 1
    }

    /// Height in pixels (inclusive bounds)
    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).unsigned_abs() + 1
    }

    /// Top-left corner regardless of corner order
    pub fn origin(&self) -> Point {
        Point::new(self.x1.min(self.x2), self.y1.min(self.y2))
    }

    pub fn contains(&self, point: Point) -> bool {
        let origin = self.origin();
        point.x >= origin.x
            && point.y >= origin.y
            && point.x < origin.x + self.width() as i32
            && point.y < origin.y + self.height() as i32
    }
}

/// Pixel sampling primitive provided by the host platform.
///
/// Implementations may fail or time out; callers treat an error as a
/// failed step rather than a fatal condition.
pub trait PixelSource: Send + Sync {
    /// Sample the colour of a single screen pixel
    fn sample_color(&self, point: Point) -> Result<Rgb<u8>, VisionError>;

    /// Find the first pixel in `region` matching `target` within `tolerance`
    /// per channel
    fn find_color_in_region(
        &self,
        region: Region,
        target: Rgb<u8>,
        tolerance: u8,
    ) -> Result<Option<Point>, VisionError>;
}

/// Check if two colours match within a per-channel tolerance
pub fn color_matches(a: Rgb<u8>, b: Rgb<u8>, tolerance: u8) -> bool {
    a.0.iter()
        .zip(b.0.iter())
        .all(|(&x, &y)| x.abs_diff(y) <= tolerance)
}

/// Check if a colour is white within a per-channel tolerance
pub fn is_near_white(color: Rgb<u8>, tolerance: u8) -> bool {
    color_matches(color, WHITE, tolerance)
}

/// Vision system errors
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("screen capture failed: {0}")]
    CaptureFailed(String),
    #[error("point ({x}, {y}) is outside the captured area")]
    OutOfBounds { x: i32, y: i32 },
    #[error("invalid frame data")]
    InvalidFrameData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_white() {
        assert!(is_near_white(Rgb([250, 252, 255]), 10));
        assert!(!is_near_white(Rgb([200, 252, 255]), 10));
        assert!(is_near_white(WHITE, 0));
    }

    #[test]
    fn test_color_matching() {
        let a = Rgb([100, 100, 100]);
        let b = Rgb([105, 95, 100]);

        assert!(color_matches(a, b, 10));
        assert!(!color_matches(a, b, 3));
    }

    #[test]
    fn test_region_geometry() {
        let region = Region::new(30, 40, 10, 20);
        assert_eq!(region.origin(), Point::new(10, 20));
        assert_eq!(region.width(), 21);
        assert_eq!(region.height(), 21);
        assert!(region.contains(Point::new(30, 40)));
        assert!(!region.contains(Point::new(31, 40)));
    }
}
