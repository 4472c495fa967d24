use crate::services::capture::{CameraConstraints, CameraDevice, CaptureError, Frame, VideoTrack};
use camino::{Utf8Path, Utf8PathBuf};
use image::imageops::FilterType;

const FEED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Camera that replays the images of a directory as a live stream.
///
/// Each read advances to the next image, looping forever. A missing or empty
/// directory behaves like a machine without a camera. Images larger than the
/// requested ideal resolution are scaled down to fit it.
#[derive(Debug, Clone)]
pub struct ImageFeedCamera {
    feed_dir: Utf8PathBuf,
    torch_supported: bool,
}

impl ImageFeedCamera {
    pub fn new<P: AsRef<Utf8Path>>(feed_dir: P, torch_supported: bool) -> Self {
        Self {
            feed_dir: feed_dir.as_ref().to_path_buf(),
            torch_supported,
        }
    }

    fn load_frames(&self, constraints: &CameraConstraints) -> Result<Vec<Frame>, CaptureError> {
        if !self.feed_dir.is_dir() {
            return Err(CaptureError::NoDevice(format!(
                "camera feed directory {} not found",
                self.feed_dir
            )));
        }

        let mut paths: Vec<Utf8PathBuf> = self
            .feed_dir
            .read_dir_utf8()
            .map_err(|e| CaptureError::NoDevice(format!("{}: {}", self.feed_dir, e)))?
            .filter_map(|entry| entry.ok().map(|e| e.into_path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| FEED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            match Self::load_frame(path, constraints) {
                Ok(frame) => frames.push(frame),
                Err(e) => tracing::warn!("Skipping camera feed image {}: {}", path, e),
            }
        }

        if frames.is_empty() {
            return Err(CaptureError::NoDevice(format!(
                "no readable images in {}",
                self.feed_dir
            )));
        }

        Ok(frames)
    }

    fn load_frame(path: &Utf8Path, constraints: &CameraConstraints) -> anyhow::Result<Frame> {
        let mut image = image::open(path)?;

        if image.width() > constraints.ideal_width || image.height() > constraints.ideal_height {
            image = image.resize(constraints.ideal_width, constraints.ideal_height, FilterType::Triangle);
        }

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Frame::new(width, height, rgba.into_raw())?)
    }
}

impl CameraDevice for ImageFeedCamera {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoTrack>, CaptureError> {
        let frames = self.load_frames(constraints)?;
        tracing::info!("Image feed camera opened with {} frame(s) from {}", frames.len(), self.feed_dir);

        Ok(Box::new(ImageFeedTrack {
            label: format!("image-feed:{}", self.feed_dir),
            frames,
            cursor: 0,
            torch_supported: self.torch_supported,
            torch_on: false,
            live: true,
        }))
    }
}

struct ImageFeedTrack {
    label: String,
    frames: Vec<Frame>,
    cursor: usize,
    torch_supported: bool,
    torch_on: bool,
    live: bool,
}

impl VideoTrack for ImageFeedTrack {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_ready(&self) -> bool {
        self.live && !self.frames.is_empty()
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if !self.is_ready() {
            return None;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Some(frame)
    }

    fn supports_torch(&self) -> bool {
        self.torch_supported
    }

    fn set_torch(&mut self, on: bool) -> Result<(), CaptureError> {
        if !self.torch_supported {
            return Err(CaptureError::IlluminationUnsupported);
        }
        self.torch_on = on;
        tracing::debug!("{} torch on: {}", self.label, self.torch_on);
        Ok(())
    }

    fn stop(&mut self) {
        self.live = false;
        self.torch_on = false;
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn feed_dir_with(images: &[(&str, u32, u32)]) -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        for (name, w, h) in images {
            image::RgbaImage::from_pixel(*w, *h, image::Rgba([10, 20, 30, 255]))
                .save(dir.join(name))
                .unwrap();
        }
        (temp_dir, dir)
    }

    #[test]
    fn test_missing_directory_is_no_device() {
        let camera = ImageFeedCamera::new("/definitely/not/here", false);
        let err = camera.open(&CameraConstraints::default()).err().unwrap();
        assert!(matches!(err, CaptureError::NoDevice(_)));
    }

    #[test]
    fn test_empty_directory_is_no_device() {
        let (_temp, dir) = feed_dir_with(&[]);
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();

        let err = ImageFeedCamera::new(&dir, false)
            .open(&CameraConstraints::default())
            .err()
            .unwrap();
        assert!(err.is_access_denied());
    }

    #[test]
    fn test_frames_loop_in_name_order() {
        let (_temp, dir) = feed_dir_with(&[("b.png", 3, 3), ("a.png", 2, 2)]);
        let mut track = ImageFeedCamera::new(&dir, false)
            .open(&CameraConstraints::default())
            .unwrap();

        assert!(track.is_ready());
        assert_eq!(track.read_frame().unwrap().width(), 2);
        assert_eq!(track.read_frame().unwrap().width(), 3);
        assert_eq!(track.read_frame().unwrap().width(), 2);
    }

    #[test]
    fn test_large_frames_fit_ideal_resolution() {
        let (_temp, dir) = feed_dir_with(&[("big.png", 64, 32)]);
        let constraints = CameraConstraints {
            ideal_width: 16,
            ideal_height: 16,
            ..CameraConstraints::default()
        };
        let mut track = ImageFeedCamera::new(&dir, false).open(&constraints).unwrap();

        let frame = track.read_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));
    }

    #[test]
    fn test_stop_ends_stream() {
        let (_temp, dir) = feed_dir_with(&[("a.png", 2, 2)]);
        let mut track = ImageFeedCamera::new(&dir, true)
            .open(&CameraConstraints::default())
            .unwrap();

        track.stop();

        assert!(!track.is_ready());
        assert!(track.read_frame().is_none());
    }

    #[test]
    fn test_torch_support_flag() {
        let (_temp, dir) = feed_dir_with(&[("a.png", 2, 2)]);

        let mut with_torch = ImageFeedCamera::new(&dir, true)
            .open(&CameraConstraints::default())
            .unwrap();
        assert!(with_torch.supports_torch());
        assert!(with_torch.set_torch(true).is_ok());

        let mut without = ImageFeedCamera::new(&dir, false)
            .open(&CameraConstraints::default())
            .unwrap();
        assert!(matches!(
            without.set_torch(true),
            Err(CaptureError::IlluminationUnsupported)
        ));
    }
}
