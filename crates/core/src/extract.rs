use std::path::Path;
use std::str::FromStr;

use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FinqaError, Result};
use crate::ocr::OcrEngine;
use crate::table::{ExtractedTable, PageLayer, TableDetector};

#[cfg(feature = "pdfium")]
use pdfium_render::prelude::*;

/// Raw OCR output for one page. Empty when recognition failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    pub page: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub tables: Vec<ExtractedTable>,
    pub pages: Vec<PageText>,
}

impl Extraction {
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// When the text path renders and recognises pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// Every page is rendered and recognised, text layer or not.
    #[default]
    Always,
    /// Only pages whose text layer is (nearly) empty are recognised; the rest
    /// reuse their text layer.
    MissingTextLayer,
    /// The text layer is used as-is.
    Never,
}

impl FromStr for OcrMode {
    type Err = FinqaError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "always" => Ok(Self::Always),
            "missing_text_layer" | "auto" => Ok(Self::MissingTextLayer),
            "never" | "off" => Ok(Self::Never),
            other => Err(FinqaError::UnknownOcrMode(other.to_string())),
        }
    }
}

const MIN_TEXT_LAYER_CHARS: usize = 16;

fn has_text_layer(layer: &PageLayer) -> bool {
    layer.text.trim().len() >= MIN_TEXT_LAYER_CHARS
}

pub trait PageRenderer: Send + Sync {
    fn render_pages(&self, path: &Path) -> Result<Vec<DynamicImage>>;
}

#[derive(Debug, Clone, Copy)]
pub struct PdfiumRenderer {
    pub target_width: u32,
    pub target_height: u32,
}

impl Default for PdfiumRenderer {
    fn default() -> Self {
        Self {
            target_width: 1400,
            target_height: 2000,
        }
    }
}

#[cfg(feature = "pdfium")]
impl PageRenderer for PdfiumRenderer {
    fn render_pages(&self, path: &Path) -> Result<Vec<DynamicImage>> {
        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| FinqaError::Other(format!("pdfium binding failed: {e}")))?;
        let pdfium = Pdfium::new(bindings);
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| FinqaError::Other(format!("pdfium load failed: {e}")))?;
        let target_width: i32 = self
            .target_width
            .try_into()
            .map_err(|_| FinqaError::Other("page width exceeds i32::MAX".to_string()))?;
        let target_height: i32 = self
            .target_height
            .try_into()
            .map_err(|_| FinqaError::Other("page height exceeds i32::MAX".to_string()))?;
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_target_height(target_height);
        let mut images = Vec::new();
        for page in document.pages().iter() {
            let render = page
                .render_with_config(&render_config)
                .map_err(|e| FinqaError::Other(format!("pdf render failed: {e}")))?;
            images.push(render.as_image());
        }
        Ok(images)
    }
}

#[cfg(not(feature = "pdfium"))]
impl PageRenderer for PdfiumRenderer {
    fn render_pages(&self, _path: &Path) -> Result<Vec<DynamicImage>> {
        Err(FinqaError::RenderSupportDisabled)
    }
}

/// Reads the embedded text layer, one entry per page.
pub fn read_text_layer(path: &Path) -> Result<Vec<PageLayer>> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| FinqaError::Other(format!("pdf text extraction failed: {e}")))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(index, text)| PageLayer { index, text })
        .collect())
}

pub trait TextLayerReader: Send + Sync {
    fn read_pages(&self, path: &Path) -> Result<Vec<PageLayer>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextLayer;

impl TextLayerReader for PdfTextLayer {
    fn read_pages(&self, path: &Path) -> Result<Vec<PageLayer>> {
        read_text_layer(path)
    }
}

/// Runs the table path and the text path over one PDF.
pub struct DocumentExtractor {
    layer: Box<dyn TextLayerReader>,
    detector: Box<dyn TableDetector>,
    renderer: Box<dyn PageRenderer>,
    ocr: Box<dyn OcrEngine>,
    ocr_mode: OcrMode,
}

impl DocumentExtractor {
    pub fn new(
        detector: Box<dyn TableDetector>,
        renderer: Box<dyn PageRenderer>,
        ocr: Box<dyn OcrEngine>,
    ) -> Self {
        Self {
            layer: Box::new(PdfTextLayer),
            detector,
            renderer,
            ocr,
            ocr_mode: OcrMode::default(),
        }
    }

    pub fn with_text_layer(mut self, reader: Box<dyn TextLayerReader>) -> Self {
        self.layer = reader;
        self
    }

    pub fn with_ocr_mode(mut self, mode: OcrMode) -> Self {
        self.ocr_mode = mode;
        self
    }

    /// Fails only when the file cannot be opened at all; every other failure
    /// degrades to missing tables or empty page text.
    pub fn extract(&self, path: &Path) -> Result<Extraction> {
        if !path.is_file() {
            return Err(FinqaError::PdfOpen {
                path: path.to_path_buf(),
                message: "not a readable file".to_string(),
            });
        }
        let layer = match self.layer.read_pages(path) {
            Ok(layer) => layer,
            Err(err) => {
                warn!(path = %path.display(), "text layer unavailable: {err}");
                Vec::new()
            }
        };
        let tables = self.extract_tables(&layer);
        info!(tables = tables.len(), "table extraction finished");
        let pages = self.extract_text(path, &layer);
        info!(pages = pages.len(), "text extraction finished");
        Ok(Extraction { tables, pages })
    }

    pub fn extract_tables(&self, layer: &[PageLayer]) -> Vec<ExtractedTable> {
        layer
            .par_iter()
            .map(|page| match self.detector.extract_tables(page) {
                Ok(regions) => regions
                    .into_iter()
                    .filter_map(|rows| ExtractedTable::from_rows(page.index, rows))
                    .collect::<Vec<_>>(),
                Err(err) => {
                    warn!(page = page.index, "table detection failed: {err}");
                    Vec::new()
                }
            })
            .flatten()
            .collect()
    }

    pub fn extract_text(&self, path: &Path, layer: &[PageLayer]) -> Vec<PageText> {
        let needs_ocr = match self.ocr_mode {
            OcrMode::Always => true,
            OcrMode::MissingTextLayer => layer.is_empty() || !layer.iter().all(has_text_layer),
            OcrMode::Never => false,
        };
        if !needs_ocr {
            return layer_as_text(layer);
        }
        let images = match self.renderer.render_pages(path) {
            Ok(images) => images,
            Err(err) => {
                warn!(path = %path.display(), "page rendering failed: {err}");
                return match self.ocr_mode {
                    OcrMode::Always => Vec::new(),
                    _ => layer_as_text(layer),
                };
            }
        };
        images
            .par_iter()
            .enumerate()
            .map(|(page, image)| {
                if self.ocr_mode == OcrMode::MissingTextLayer {
                    if let Some(existing) = layer.get(page).filter(|l| has_text_layer(l)) {
                        return PageText {
                            page,
                            text: existing.text.clone(),
                        };
                    }
                }
                let text = match self.ocr.recognize(image) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(page, "ocr failed: {err}");
                        String::new()
                    }
                };
                debug!(page, chars = text.len(), "page recognised");
                PageText { page, text }
            })
            .collect()
    }
}

fn layer_as_text(layer: &[PageLayer]) -> Vec<PageText> {
    layer
        .iter()
        .map(|page| PageText {
            page: page.index,
            text: page.text.clone(),
        })
        .collect()
}
