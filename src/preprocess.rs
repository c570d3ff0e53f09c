//! Image preprocessing
//!
//! Turns uploaded JPEG/PNG bytes into the fixed-shape, normalized CHW tensor
//! the model expects. The policy is fixed so identical bytes always give an
//! identical tensor:
//!
//! 1. `center_crop` (default): take the centered square of the source that
//!    maps onto an `input_size` crop once the shorter side is scaled to
//!    `preprocessing.resize`, then resize that square to `input_size`.
//!    `stretch`: resize the whole image to `input_size x input_size`.
//!    Either resize is skipped when the image already has the target size.
//! 2. Scale pixels to [0, 1] and normalize per channel with the manifest's
//!    mean and std. RGB for three channels, luma for one.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits};

use crate::model::manifest::{ModelManifest, PreprocessingConfig, ResizePolicy};
use crate::utils::error::{Result, ServeError};

/// Default cap on decoded image width and height
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 8192;

/// Image formats accepted by the upload endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Jpeg,
    Png,
}

impl UploadFormat {
    /// Parse a declared MIME type, ignoring parameters and case
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(UploadFormat::Jpeg),
            "image/png" => Some(UploadFormat::Png),
            _ => None,
        }
    }

    /// Guess from a file name extension
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(UploadFormat::Jpeg),
            "png" => Some(UploadFormat::Png),
            _ => None,
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(UploadFormat::Jpeg),
            ImageFormat::Png => Some(UploadFormat::Png),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            UploadFormat::Jpeg => "image/jpeg",
            UploadFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            UploadFormat::Jpeg => "jpg",
            UploadFormat::Png => "png",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            UploadFormat::Jpeg => ImageFormat::Jpeg,
            UploadFormat::Png => ImageFormat::Png,
        }
    }
}

/// Normalized image in CHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl ImageTensor {
    /// Wrap raw CHW data. `data.len()` must equal the product of `shape`.
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ServeError::Inference(format!(
                "Tensor data has {} values, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, data })
    }

    /// Shape as [channels, height, width]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Converts uploaded image bytes into model input
#[derive(Debug, Clone)]
pub struct Preprocessor {
    input_size: u32,
    channels: usize,
    config: PreprocessingConfig,
    max_dimension: u32,
}

impl Preprocessor {
    /// Build a preprocessor from the constants recorded in a model manifest
    pub fn new(manifest: &ModelManifest) -> Self {
        Self {
            input_size: manifest.architecture.input_size as u32,
            channels: manifest.architecture.in_channels,
            config: manifest.preprocessing.clone(),
            max_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
        }
    }

    /// Configure the maximum decoded width/height
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Shape of every tensor this preprocessor produces
    pub fn output_shape(&self) -> [usize; 3] {
        let size = self.input_size as usize;
        [self.channels, size, size]
    }

    /// Validate, decode, resize, crop and normalize an upload
    pub fn preprocess(
        &self,
        raw_bytes: &[u8],
        declared_content_type: Option<&str>,
    ) -> Result<ImageTensor> {
        let image = self.decode(raw_bytes, declared_content_type)?;
        let resized = self.resize_to_input(&image)?;
        ImageTensor::new(self.output_shape(), self.normalize(&resized))
    }

    /// Decode bytes whose signature matches a supported, declared format
    pub fn decode(
        &self,
        raw_bytes: &[u8],
        declared_content_type: Option<&str>,
    ) -> Result<DynamicImage> {
        let declared = declared_content_type
            .ok_or_else(|| ServeError::Validation("Missing image content type".to_string()))?;
        let format = UploadFormat::from_content_type(declared).ok_or_else(|| {
            ServeError::Validation(format!(
                "Unsupported content type '{}', expected image/jpeg or image/png",
                declared
            ))
        })?;

        let detected = image::guess_format(raw_bytes)
            .ok()
            .and_then(UploadFormat::from_image_format)
            .ok_or_else(|| {
                ServeError::Validation("Upload is not a decodable JPEG or PNG image".to_string())
            })?;
        if detected != format {
            return Err(ServeError::Validation(format!(
                "Upload content is {} but was declared as {}",
                detected.content_type(),
                format.content_type()
            )));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);

        let mut reader =
            ImageReader::with_format(Cursor::new(raw_bytes), detected.image_format());
        reader.limits(limits);
        reader
            .decode()
            .map_err(|e| ServeError::Validation(format!("Failed to decode image: {}", e)))
    }

    /// Bring an image to `input_size x input_size` using the manifest's policy
    pub fn resize_to_input(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ServeError::Validation("Image has no pixels".to_string()));
        }

        let size = self.input_size;
        let filter = self.config.interpolation.filter_type();
        let window = match self.config.policy {
            ResizePolicy::Stretch => image.clone(),
            ResizePolicy::CenterCrop => {
                let side = crop_window(width.min(height), size, self.config.resize);
                image.crop_imm((width - side) / 2, (height - side) / 2, side, side)
            }
        };

        if window.dimensions() == (size, size) {
            Ok(window)
        } else {
            Ok(window.resize_exact(size, size, filter))
        }
    }

    /// Scale to [0, 1], normalize per channel, emit CHW
    fn normalize(&self, image: &DynamicImage) -> Vec<f32> {
        let mean = &self.config.mean;
        let std = &self.config.std;
        let num_pixels = (image.width() * image.height()) as usize;
        let mut normalized = vec![0.0f32; self.channels * num_pixels];

        if self.channels == 1 {
            for (i, pixel) in image.to_luma8().pixels().enumerate() {
                normalized[i] = (pixel[0] as f32 / 255.0 - mean[0]) / std[0];
            }
        } else {
            for (i, pixel) in image.to_rgb8().pixels().enumerate() {
                for c in 0..3 {
                    normalized[c * num_pixels + i] =
                        (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
                }
            }
        }

        normalized
    }
}

/// Side of the source square that lands on the crop after scaling the
/// shorter edge `short` to `resize`, rounded to nearest, within [1, short]
fn crop_window(short: u32, input_size: u32, resize: u32) -> u32 {
    let resize = resize.max(1) as u64;
    let side = (input_size as u64 * short as u64 + resize / 2) / resize;
    side.clamp(1, short as u64) as u32
}
