use serde::{Deserialize, Serialize};
use xcap::image::EncodableLayout;

/// Screen rectangle in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
	pub left: i32,
	pub top: i32,
	pub width: u32,
	pub height: u32,
}

impl Default for Region {
	fn default() -> Self {
		Self {
			left: 0,
			top: 0,
			width: 50,
			height: 50,
		}
	}
}

impl std::fmt::Display for Region {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}x{} at ({}, {})", self.width, self.height, self.left, self.top)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
	#[error("capture region {0} is empty")]
	EmptyRegion(Region),
	#[error("no monitor contains ({x}, {y})")]
	NoMonitor { x: i32, y: i32 },
	#[error("screen capture failed: {0}")]
	Backend(String),
	#[error("captured {got_width}x{got_height}, expected {region}")]
	SizeMismatch { region: Region, got_width: u32, got_height: u32 },
}

/// Source of pixels for one region.
pub trait ScreenSampler {
	fn capture(&mut self, region: Region) -> Result<ie::OwnedImage, CaptureError>;
}

/// Captures straight from the monitor containing the region's top-left corner.
#[derive(Debug, Default)]
pub struct XcapSampler;

impl ScreenSampler for XcapSampler {
	fn capture(&mut self, region: Region) -> Result<ie::OwnedImage, CaptureError> {
		if region.width == 0 || region.height == 0 {
			return Err(CaptureError::EmptyRegion(region));
		}

		let monitor = xcap::Monitor::from_point(region.left, region.top).map_err(|_| CaptureError::NoMonitor {
			x: region.left,
			y: region.top,
		})?;
		let origin_x = monitor.x().map_err(backend)?;
		let origin_y = monitor.y().map_err(backend)?;

		// Monitor-relative offsets; non-negative because the monitor contains the point.
		let x = (region.left - origin_x).max(0) as u32;
		let y = (region.top - origin_y).max(0) as u32;
		let img = monitor
			.capture_region(x, y, region.width, region.height)
			.map_err(backend)?;

		let image = ie::OwnedImage::from_rgba(img.width() as usize, img.as_bytes());
		check_size(region, &image)?;
		Ok(image)
	}
}

fn backend(err: xcap::XCapError) -> CaptureError {
	CaptureError::Backend(err.to_string())
}

/// A capture must be exactly the region's size.
pub fn check_size(region: Region, image: &ie::OwnedImage) -> Result<(), CaptureError> {
	if image.width() == region.width && image.height() == region.height {
		Ok(())
	} else {
		Err(CaptureError::SizeMismatch {
			region,
			got_width: image.width(),
			got_height: image.height(),
		})
	}
}
