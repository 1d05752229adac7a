//! Deterministic analyzer for tests/local runs: hashes the image bytes and
//! picks descriptors from a fixed vocabulary. Same bytes, same descriptors.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{ImageAnalysisResult, ImageAnalyzer};

const SUBJECTS: &[&str] = &[
    "landscape", "portrait", "still life", "abstract", "cityscape", "seascape", "flowers",
    "mountain", "forest", "animal", "architecture", "figure", "river", "night sky",
];
const COLORS: &[&str] = &["blue", "red", "ochre", "green", "black", "white", "gold", "violet"];
const STYLES: &[&str] = &[
    "impressionism", "minimalism", "expressionism", "realism", "pop art", "ink wash",
];
const MOODS: &[&str] = &["calm", "melancholic", "joyful", "dramatic", "dreamy", "serene"];

#[derive(Debug, Clone, Default)]
pub struct MockAnalyzer;

impl MockAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn describe(image: &[u8]) -> ImageAnalysisResult {
        let digest = Sha256::digest(image);
        let pick = |table: &[&str], byte: u8| table[byte as usize % table.len()].to_string();

        let keywords = (0..4).map(|i| pick(SUBJECTS, digest[i])).collect();
        let colors = (4..6).map(|i| pick(COLORS, digest[i])).collect();

        ImageAnalysisResult {
            keywords,
            colors,
            style: vec![pick(STYLES, digest[6])],
            mood: vec![pick(MOODS, digest[7])],
            confidence: 0.6 + (digest[8] as f32 / 255.0) * 0.35,
        }
        .sanitized()
    }
}

#[async_trait]
impl ImageAnalyzer for MockAnalyzer {
    async fn analyze(&self, image: &[u8]) -> anyhow::Result<ImageAnalysisResult> {
        if image.is_empty() {
            anyhow::bail!("empty image buffer");
        }
        Ok(Self::describe(image))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
