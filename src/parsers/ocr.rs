//! OCR engine abstraction and the external-tesseract implementation.
//!
//! OCR runs as an external process (`tesseract`, with `pdftoppm` for
//! PDF rasterization) under an explicit timeout, so a wedged converter
//! can never hang the pipeline. The engine is injected into the parsers
//! that need it, which keeps tests free of system dependencies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::OcrConfig;
use crate::error::PipelineError;

/// Pluggable OCR backend.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// OCR a single raster image into plain text.
    async fn ocr_image(&self, path: &Path) -> Result<String, PipelineError>;

    /// Rasterize a PDF and OCR each page, returning per-page text.
    async fn ocr_pdf(&self, path: &Path) -> Result<Vec<String>, PipelineError>;
}

/// OCR backend shelling out to tesseract.
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn run_tesseract(&self, image: &Path) -> Result<String, PipelineError> {
        let mut cmd = Command::new(&self.config.tesseract_cmd);
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.lang)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg("3");

        let output = tokio::time::timeout(self.timeout(), cmd.output())
            .await
            .map_err(|_| PipelineError::ConversionTimeout(self.timeout()))?
            .map_err(|e| PipelineError::io(image, e))?;

        if !output.status.success() {
            return Err(PipelineError::parse(
                image,
                format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn ocr_image(&self, path: &Path) -> Result<String, PipelineError> {
        self.run_tesseract(path).await
    }

    async fn ocr_pdf(&self, path: &Path) -> Result<Vec<String>, PipelineError> {
        let work_dir = std::env::temp_dir().join(format!("bidops-ocr-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&work_dir).map_err(|e| PipelineError::io(&work_dir, e))?;

        let result = self.rasterize_and_ocr(path, &work_dir).await;
        let _ = std::fs::remove_dir_all(&work_dir);
        result
    }
}

impl TesseractOcr {
    async fn rasterize_and_ocr(
        &self,
        pdf: &Path,
        work_dir: &Path,
    ) -> Result<Vec<String>, PipelineError> {
        let prefix = work_dir.join("page");
        let mut cmd = Command::new(&self.config.rasterize_cmd);
        cmd.arg("-r").arg("300").arg("-png").arg(pdf).arg(&prefix);

        let output = tokio::time::timeout(self.timeout(), cmd.output())
            .await
            .map_err(|_| PipelineError::ConversionTimeout(self.timeout()))?
            .map_err(|e| PipelineError::io(pdf, e))?;

        if !output.status.success() {
            return Err(PipelineError::parse(
                pdf,
                format!(
                    "{} exited with {}: {}",
                    self.config.rasterize_cmd,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let mut page_images: Vec<PathBuf> = std::fs::read_dir(work_dir)
            .map_err(|e| PipelineError::io(work_dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
            .collect();
        page_images.sort();

        if page_images.is_empty() {
            return Err(PipelineError::parse(pdf, "rasterizer produced no pages"));
        }

        let mut pages = Vec::with_capacity(page_images.len());
        for image in &page_images {
            pages.push(self.run_tesseract(image).await?);
        }
        Ok(pages)
    }
}

/// OCR backend that always fails; used when OCR is not available.
pub struct DisabledOcr;

#[async_trait]
impl OcrEngine for DisabledOcr {
    async fn ocr_image(&self, path: &Path) -> Result<String, PipelineError> {
        Err(PipelineError::parse(path, "OCR is disabled"))
    }

    async fn ocr_pdf(&self, path: &Path) -> Result<Vec<String>, PipelineError> {
        Err(PipelineError::parse(path, "OCR is disabled"))
    }
}
