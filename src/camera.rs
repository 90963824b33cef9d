use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use log::info;

use crate::config::CameraConfig;
use crate::error::CaptureError;

/// Whether this build can open a real camera (the `camera` feature).
pub const SUPPORTED: bool = cfg!(feature = "camera");

/// Anything that can hand back a single RGB frame.
pub trait FrameSource {
    /// Grab one frame from the device.
    fn grab_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

/// Single-shot still capture to a fixed output file.
///
/// Grabs exactly one frame, optionally flips it, and writes it as PNG,
/// overwriting whatever was there from a previous run.
pub struct CameraCapture {
    output_path: PathBuf,
    flip_vertical: bool,
}

impl CameraCapture {
    /// # Arguments
    ///
    /// * `output_path` - Where the PNG is written
    /// * `flip_vertical` - Whether to flip the frame (camera mounted upside-down)
    pub fn new(output_path: impl Into<PathBuf>, flip_vertical: bool) -> Self {
        Self {
            output_path: output_path.into(),
            flip_vertical,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(config.output_path.clone(), config.flip_vertical)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Grab one frame from `source` and write it to the output path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The device fails to deliver a frame
    /// - The frame has no pixels (nothing is written in that case)
    /// - The PNG cannot be encoded or written
    pub fn capture_to_file<S>(&self, source: &mut S) -> Result<PathBuf, CaptureError>
    where
        S: FrameSource + ?Sized,
    {
        let mut frame = source.grab_frame()?;

        if frame.width() == 0 || frame.height() == 0 {
            return Err(CaptureError::EmptyFrame);
        }

        if self.flip_vertical {
            image::imageops::flip_vertical_in_place(&mut frame);
        }

        frame
            .save_with_format(&self.output_path, ImageFormat::Png)
            .map_err(|e| CaptureError::Encode {
                path: self.output_path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!(
            "Saved {}x{} frame to {}",
            frame.width(),
            frame.height(),
            self.output_path.display()
        );

        Ok(self.output_path.clone())
    }
}

/// Open the configured camera, take one photo, release the camera.
///
/// Returns the path of the written image.
pub fn capture_image(config: &CameraConfig) -> Result<PathBuf, CaptureError> {
    let mut camera = open_camera(config.index)?;
    let path = CameraCapture::from_config(config).capture_to_file(camera.as_mut())?;
    // Dropping the source stops the stream and frees the device.
    drop(camera);
    Ok(path)
}

#[cfg(feature = "camera")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>, CaptureError> {
    Ok(Box::new(NokhwaCamera::open(index)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_index: u32) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::Unsupported)
}

#[cfg(feature = "camera")]
pub use native::NokhwaCamera;

#[cfg(feature = "camera")]
mod native {
    use image::RgbImage;
    use log::{info, warn};
    use nokhwa::Camera;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};

    use super::FrameSource;
    use crate::error::CaptureError;

    /// Webcam opened through nokhwa's native backend (V4L2, AVFoundation, MSMF).
    pub struct NokhwaCamera {
        camera: Camera,
    }

    impl NokhwaCamera {
        /// Open camera `index` and start streaming.
        pub fn open(index: u32) -> Result<Self, CaptureError> {
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
            let mut camera = Camera::new(CameraIndex::Index(index), requested).map_err(|e| {
                CaptureError::Device {
                    reason: format!("failed to open camera #{}: {}", index, e),
                }
            })?;
            camera.open_stream().map_err(|e| CaptureError::Device {
                reason: format!("failed to start stream on camera #{}: {}", index, e),
            })?;

            info!("Opened camera #{} ({})", index, camera.info().human_name());
            Ok(Self { camera })
        }
    }

    impl FrameSource for NokhwaCamera {
        fn grab_frame(&mut self) -> Result<RgbImage, CaptureError> {
            let buffer = self.camera.frame().map_err(|e| CaptureError::Device {
                reason: e.to_string(),
            })?;
            buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| CaptureError::Device {
                    reason: e.to_string(),
                })
        }
    }

    impl Drop for NokhwaCamera {
        fn drop(&mut self) {
            if let Err(e) = self.camera.stop_stream() {
                warn!("Failed to release camera: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFrame(RgbImage);

    impl FrameSource for FixedFrame {
        fn grab_frame(&mut self) -> Result<RgbImage, CaptureError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn flip_swaps_top_and_bottom_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flipped.png");

        let mut frame = RgbImage::new(1, 2);
        frame.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        frame.put_pixel(0, 1, image::Rgb([0, 0, 255]));

        CameraCapture::new(&path, true)
            .capture_to_file(&mut FixedFrame(frame))
            .unwrap();

        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.get_pixel(0, 0), &image::Rgb([0, 0, 255]));
        assert_eq!(saved.get_pixel(0, 1), &image::Rgb([255, 0, 0]));
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn capture_without_camera_support_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let config = CameraConfig {
            index: 0,
            output_path: dir.path().join("never.png"),
            flip_vertical: false,
        };
        assert!(!SUPPORTED);
        assert!(matches!(
            capture_image(&config),
            Err(CaptureError::Unsupported)
        ));
        assert!(!config.output_path.exists());
    }
}
