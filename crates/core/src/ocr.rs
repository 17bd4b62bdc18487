use image::DynamicImage;

use crate::error::{FinqaError, Result};

#[cfg(feature = "ocr")]
use {
    image::{codecs::png::PngEncoder, ColorType, ImageEncoder},
    leptess::LepTess,
    std::io::Write,
    tempfile::NamedTempFile,
};

pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String>;
}

/// Tesseract via leptess. A fresh engine is initialised per page so that
/// pages can be recognised from several worker threads at once.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    languages: Vec<String>,
}

impl TesseractOcr {
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }

    pub fn language_spec(&self) -> String {
        if self.languages.is_empty() {
            "eng".to_string()
        } else {
            self.languages.join("+")
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(vec!["eng".to_string()])
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        let mut tess = LepTess::new(None, &self.language_spec())
            .map_err(|e| FinqaError::Other(format!("failed to initialise tesseract: {e}")))?;
        let temp = write_png(image)?;
        let temp_path = temp.into_temp_path();
        let path_str = temp_path
            .to_str()
            .ok_or_else(|| FinqaError::Other("temp image path not valid UTF-8".to_string()))?
            .to_string();
        if !tess.set_image(&path_str) {
            let _ = temp_path.close();
            return Err(FinqaError::Other(
                "failed to load page image into tesseract".to_string(),
            ));
        }
        let text = tess
            .get_utf8_text()
            .map_err(|e| FinqaError::Other(format!("tesseract failed: {e}")));
        let _ = temp_path.close();
        text
    }
}

#[cfg(feature = "ocr")]
fn write_png(image: &DynamicImage) -> Result<NamedTempFile> {
    let mut temp = NamedTempFile::new()
        .map_err(|e| FinqaError::Other(format!("failed to create temp image: {e}")))?;
    let rgba = image.to_rgba8();
    PngEncoder::new(temp.as_file_mut())
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ColorType::Rgba8.into(),
        )
        .map_err(|e| FinqaError::Other(format!("failed to encode page for ocr: {e}")))?;
    temp.flush()
        .map_err(|e| FinqaError::Other(format!("failed to flush temp image: {e}")))?;
    Ok(temp)
}

#[cfg(not(feature = "ocr"))]
impl OcrEngine for TesseractOcr {
    fn recognize(&self, _image: &DynamicImage) -> Result<String> {
        Err(FinqaError::OcrSupportDisabled)
    }
}
