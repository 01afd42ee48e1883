//! Camera capture: open a video device and grab one still frame.
//!
//! The device is modelled as two traits. [`Camera::open`] acquires the
//! device and returns a [`CameraStream`]; the stream owns the device handle
//! and releases it when dropped. Whoever drives the session therefore
//! releases the camera simply by letting the stream go out of scope, on
//! cancel, on failure and after a successful capture alike.
//!
//! [`CommandCamera`] is the bundled implementation. It keeps the device node
//! open while capturing and asks an external frame grabber (`ffmpeg` by
//! default) for a single MJPEG frame on stdout.

use crate::error::AttemptError;
use futures::future::BoxFuture;
use image::DynamicImage;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, warn};

/// An open camera stream. Dropping it releases the device.
pub trait CameraStream: Send {
    /// Grab the current frame.
    fn capture_frame(&mut self) -> BoxFuture<'_, Result<DynamicImage, AttemptError>>;
}

/// A camera that can be opened for capture.
pub trait Camera: Send + Sync {
    /// Acquire the device.
    ///
    /// # Errors
    /// [`AttemptError::DeviceAccess`] when the device is missing or access is
    /// denied. Callers must not retry automatically.
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn CameraStream>, AttemptError>>;
}

/// Camera backed by a device node and an external frame grabber.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    device: PathBuf,
    program: String,
    input_format: String,
}

impl CommandCamera {
    /// `ffmpeg`-style grabber reading `device` through the `v4l2` demuxer.
    pub fn new(device: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            program: program.into(),
            input_format: "v4l2".to_string(),
        }
    }

    /// Override the grabber's input format (e.g. `avfoundation`).
    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = format.into();
        self
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    fn open_device(&self) -> Result<File, AttemptError> {
        File::open(&self.device).map_err(|e| AttemptError::DeviceAccess {
            detail: format!("{}: {e}", self.device.display()),
        })
    }
}

impl Camera for CommandCamera {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn CameraStream>, AttemptError>> {
        Box::pin(async move {
            let handle = self.open_device()?;
            info!("Camera opened: {}", self.device.display());
            Ok(Box::new(CommandStream {
                camera: self.clone(),
                _handle: handle,
            }) as Box<dyn CameraStream>)
        })
    }
}

struct CommandStream {
    camera: CommandCamera,
    /// Held for the lifetime of the stream; closing it releases the device.
    _handle: File,
}

impl CommandStream {
    fn grab_args(&self) -> Vec<String> {
        let device = self.camera.device.display().to_string();
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            self.camera.input_format.as_str(),
            "-i",
            device.as_str(),
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl CameraStream for CommandStream {
    fn capture_frame(&mut self) -> BoxFuture<'_, Result<DynamicImage, AttemptError>> {
        Box::pin(async move {
            let device_err = |detail: String| AttemptError::DeviceAccess { detail };

            let output = tokio::process::Command::new(&self.camera.program)
                .args(self.grab_args())
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| device_err(format!("{}: {e}", self.camera.program)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("Frame grab failed: {}", stderr.trim());
                return Err(device_err(format!(
                    "{} exited with {}: {}",
                    self.camera.program,
                    output.status,
                    stderr.trim()
                )));
            }

            let frame = image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Jpeg)
                .map_err(|e| device_err(format!("undecodable frame: {e}")))?;
            debug!("Captured frame {}x{}", frame.width(), frame.height());
            Ok(frame)
        })
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        debug!("Camera released: {}", self.camera.device.display());
    }
}
