//! Image text extraction: an OCR model chain with a heuristic description as the last resort.

use super::ExtractionError;
use crate::models::ImageToText;
use image::{ImageFormat, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;

/// OCR output shorter than this (in characters, after trimming) is treated as a miss.
const MIN_OCR_CHARS: usize = 5;
/// Color histograms stop counting past this many distinct colors.
const MAX_TRACKED_COLORS: usize = 1000;

/// Text recovered from an image and the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageText {
    /// Extracted or described text.
    pub text: String,
    /// OCR model that produced the text; `None` when the heuristic description was used.
    pub model: Option<String>,
}

/// Decode an image and run it through the OCR chain.
///
/// Each model is tried in order; the first result longer than five characters wins. Model
/// errors and short results are logged and skipped. Without a backend, or when every model
/// misses, the image is described heuristically instead.
pub async fn extract_image(
    bytes: Vec<u8>,
    ocr: Option<&dyn ImageToText>,
    models: &[String],
) -> Result<ImageText, ExtractionError> {
    let (image, png) = tokio::task::spawn_blocking(move || decode_to_png(&bytes))
        .await
        .map_err(|error| ExtractionError::Task(error.to_string()))??;
    tracing::info!(
        width = image.width(),
        height = image.height(),
        "Processing image"
    );

    if let Some(ocr) = ocr {
        for model in models {
            tracing::info!(model = %model, "Trying OCR model");
            match ocr.image_to_text(model, png.clone()).await {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.chars().count() > MIN_OCR_CHARS {
                        tracing::info!(
                            model = %model,
                            preview = %trimmed.chars().take(100).collect::<String>(),
                            "OCR model extracted text"
                        );
                        return Ok(ImageText {
                            text: trimmed.to_string(),
                            model: Some(model.clone()),
                        });
                    }
                    tracing::warn!(model = %model, text = %trimmed, "OCR result too short");
                }
                Err(error) => {
                    tracing::warn!(model = %model, error = %error, "OCR model failed");
                }
            }
        }
        tracing::warn!("All OCR models failed; describing image heuristically");
    }

    let text = tokio::task::spawn_blocking(move || describe_image(&image))
        .await
        .map_err(|error| ExtractionError::Task(error.to_string()))?;
    Ok(ImageText { text, model: None })
}

fn decode_to_png(bytes: &[u8]) -> Result<(RgbImage, Vec<u8>), ExtractionError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok((image, png.into_inner()))
}

/// Describe an image from its geometry, palette, and brightness.
pub fn describe_image(image: &RgbImage) -> String {
    let (width, height) = image.dimensions();

    let orientation = if width > height {
        "Landscape"
    } else {
        "Portrait"
    };

    let resolution = if width > 1000 && height > 1000 {
        "high"
    } else if width > 500 && height > 500 {
        "medium"
    } else {
        "low"
    };

    let color_info = match dominant_color(image) {
        Some([r, g, b]) => format!("Dominant color: RGB({r}, {g}, {b})"),
        None => "Varied color palette".to_string(),
    };

    let brightness = mean_luma(image);
    let brightness_info = if brightness > 200.0 {
        "Bright image"
    } else if brightness < 100.0 {
        "Dark image"
    } else {
        "Medium brightness"
    };

    let content_analysis = if width > 800 && height > 600 {
        "Contains large graphic elements, possibly a company logo, banner, or advertisement."
    } else if width > 400 && height > 300 {
        "Contains medium graphic elements, possibly a document, photo, or illustration."
    } else {
        "Contains small graphic elements, possibly an icon or thumbnail."
    };

    format!(
        "{orientation} image, {resolution} resolution ({width}x{height} pixels). {color_info}. {brightness_info}. {content_analysis} For accurate text extraction, a dedicated OCR tool is recommended."
    )
}

/// Most frequent color, or `None` when the image holds more than 1000 distinct colors.
fn dominant_color(image: &RgbImage) -> Option<[u8; 3]> {
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
    for pixel in image.pixels() {
        *counts.entry(pixel.0).or_insert(0) += 1;
        if counts.len() > MAX_TRACKED_COLORS {
            return None;
        }
    }
    counts
        .into_iter()
        .max_by(|(left_color, left), (right_color, right)| {
            left.cmp(right).then_with(|| right_color.cmp(left_color))
        })
        .map(|(color, _)| color)
}

/// Mean luma using ITU-R 601 weights.
fn mean_luma(image: &RgbImage) -> f64 {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return 0.0;
    }
    let total: f64 = image
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0;
            0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
        })
        .sum();
    total / pixel_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InferenceBackend, ModelError};
    use async_trait::async_trait;
    use image::Rgb;
    use std::sync::Mutex;

    struct ScriptedOcr {
        responses: HashMap<String, Result<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedOcr {
        fn new(responses: &[(&str, Result<&str, &str>)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(model, response)| {
                        (
                            model.to_string(),
                            response.map(str::to_string).map_err(str::to_string),
                        )
                    })
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedOcr {
        async fn ensure_model(&self, _model: &str) -> Result<(), ModelError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ImageToText for ScriptedOcr {
        async fn image_to_text(&self, model: &str, png: Vec<u8>) -> Result<String, ModelError> {
            assert!(png.starts_with(b"\x89PNG"), "OCR input must be PNG encoded");
            self.calls.lock().expect("calls lock").push(model.to_string());
            let response = self
                .responses
                .get(model)
                .cloned()
                .unwrap_or_else(|| Err("unscripted".into()));
            response.map_err(|reason| ModelError::Unavailable {
                model: model.to_string(),
                reason,
            })
        }
    }

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .expect("encode png");
        buffer.into_inner()
    }

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn describes_large_bright_landscape_image() {
        let image = RgbImage::from_pixel(1200, 1100, Rgb([255, 255, 255]));
        let description = describe_image(&image);
        assert!(description.starts_with("Landscape image, high resolution (1200x1100 pixels)."));
        assert!(description.contains("Dominant color: RGB(255, 255, 255)"));
        assert!(description.contains("Bright image"));
        assert!(description.contains("large graphic elements"));
        assert!(description.ends_with("a dedicated OCR tool is recommended."));
    }

    #[test]
    fn describes_small_dark_portrait_image() {
        let image = RgbImage::from_pixel(40, 60, Rgb([10, 20, 30]));
        let description = describe_image(&image);
        assert!(description.starts_with("Portrait image, low resolution (40x60 pixels)."));
        assert!(description.contains("Dark image"));
        assert!(description.contains("small graphic elements"));
    }

    #[test]
    fn medium_images_fall_in_the_middle_buckets() {
        let image = RgbImage::from_pixel(600, 600, Rgb([128, 128, 128]));
        let description = describe_image(&image);
        assert!(description.starts_with("Portrait image, medium resolution"));
        assert!(description.contains("Medium brightness"));
        assert!(description.contains("medium graphic elements"));
    }

    #[test]
    fn colorful_images_report_a_varied_palette() {
        let image = RgbImage::from_fn(64, 64, |x, y| Rgb([x as u8 * 4, y as u8 * 4, 0]));
        assert_eq!(dominant_color(&image), None);
        assert!(describe_image(&image).contains("Varied color palette"));
    }

    #[test]
    fn dominant_color_picks_the_most_frequent_pixel() {
        let image = RgbImage::from_fn(10, 10, |x, _| {
            if x < 7 { Rgb([200, 0, 0]) } else { Rgb([0, 0, 200]) }
        });
        assert_eq!(dominant_color(&image), Some([200, 0, 0]));
    }

    #[tokio::test]
    async fn short_ocr_results_move_to_the_next_model() {
        let ocr = ScriptedOcr::new(&[
            ("printed", Ok(" ab ")),
            ("handwritten", Err("timeout")),
            ("caption", Ok("  a shop sign reading KAZKOMP  ")),
        ]);

        let result = extract_image(
            png_bytes(20, 20, [0, 0, 0]),
            Some(&ocr),
            &models(&["printed", "handwritten", "caption"]),
        )
        .await
        .expect("image text");

        assert_eq!(result.text, "a shop sign reading KAZKOMP");
        assert_eq!(result.model.as_deref(), Some("caption"));
        assert_eq!(ocr.calls(), vec!["printed", "handwritten", "caption"]);
    }

    #[tokio::test]
    async fn exhausted_chain_describes_the_image() {
        let ocr = ScriptedOcr::new(&[("printed", Ok("12345"))]);

        let result = extract_image(
            png_bytes(900, 700, [250, 250, 250]),
            Some(&ocr),
            &models(&["printed", "missing"]),
        )
        .await
        .expect("image text");

        assert!(result.model.is_none());
        assert!(result.text.starts_with("Landscape image, medium resolution (900x700 pixels)."));
    }

    #[tokio::test]
    async fn no_backend_goes_straight_to_the_description() {
        let result = extract_image(png_bytes(10, 10, [0, 0, 0]), None, &models(&["printed"]))
            .await
            .expect("image text");
        assert!(result.model.is_none());
        assert!(result.text.contains("Dark image"));
    }

    #[tokio::test]
    async fn undecodable_bytes_are_an_error() {
        let error = extract_image(b"not an image".to_vec(), None, &[])
            .await
            .expect_err("decode failure");
        assert!(matches!(error, ExtractionError::Image(_)));
    }
}
