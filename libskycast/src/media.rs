//! Adaptive JPEG encoding under a byte budget
//!
//! The encoder walks a fixed [`SearchPlan`] of `(quality, scale)` candidates
//! and returns the first encoding that fits. Quality is exhausted at native
//! resolution before any downscaling happens; the plan order is part of the
//! contract and must not be reshuffled.
//!
//! # Example
//!
//! ```no_run
//! use libskycast::media::{MediaAsset, MediaEncoder, DEFAULT_BUDGET_BYTES};
//!
//! # fn example(bytes: &[u8]) -> libskycast::Result<()> {
//! let asset = MediaAsset::from_bytes(bytes)?;
//! let blob = MediaEncoder::default().encode(&asset, DEFAULT_BUDGET_BYTES)?;
//! if blob.exceeds_budget() {
//!     eprintln!("image is still {} bytes after compression", blob.size_bytes);
//! }
//! # Ok(())
//! # }
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::{debug, warn};

use crate::error::{Result, SkycastError};

/// 900 KiB, comfortably below the server's 1 MB blob limit
pub const DEFAULT_BUDGET_BYTES: usize = 900 * 1024;

pub const JPEG_MIME: &str = "image/jpeg";

/// A decoded raster image handed over by the media picker
#[derive(Debug, Clone)]
pub struct MediaAsset {
    image: DynamicImage,
}

impl MediaAsset {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Decode an image file's bytes (JPEG, PNG, GIF or WebP)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| SkycastError::InvalidInput(format!("Unreadable image: {}", e)))?;
        Ok(Self::new(image))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Which part of the search a candidate belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Quality sweep at the original pixel size
    NativeResolution,
    /// Quality sweep after shrinking
    Downscaled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub phase: Phase,
    pub quality: u8,
    /// Fraction of the original width and height, 1.0 for phase one
    pub scale: f32,
}

/// Knobs for building a [`SearchPlan`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    /// First quality tried at native resolution
    pub start_quality: u8,
    /// First quality tried at each reduced scale
    pub mid_quality: u8,
    pub quality_floor: u8,
    pub quality_step: u8,
    /// Multiplier applied to the scale each round
    pub shrink_factor: f32,
    /// Smallest scale still tried
    pub min_scale: f32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            start_quality: 90,
            mid_quality: 70,
            quality_floor: 40,
            quality_step: 10,
            shrink_factor: 0.9,
            min_scale: 0.3,
        }
    }
}

/// Lowest scale any plan goes down to, whatever the settings say
const MIN_SCALE: f32 = 0.01;

/// Ordered, finite list of encodings to try
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    candidates: Vec<Candidate>,
}

impl SearchPlan {
    pub fn from_settings(settings: &EncoderSettings) -> Self {
        let mut candidates: Vec<Candidate> =
            quality_sweep(settings.start_quality, settings)
                .map(|quality| Candidate {
                    phase: Phase::NativeResolution,
                    quality,
                    scale: 1.0,
                })
                .collect();

        let shrink = settings.shrink_factor;
        // f32::max also maps a NaN floor to the minimum
        let min_scale = settings.min_scale.max(MIN_SCALE);
        if shrink > 0.0 && shrink < 1.0 {
            let mut scale = shrink;
            while scale >= min_scale {
                candidates.extend(quality_sweep(settings.mid_quality, settings).map(|quality| {
                    Candidate {
                        phase: Phase::Downscaled,
                        quality,
                        scale,
                    }
                }));
                scale *= shrink;
            }
        }

        Self { candidates }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn quality_sweep(from: u8, settings: &EncoderSettings) -> impl Iterator<Item = u8> {
    let floor = settings.quality_floor.clamp(1, 100);
    let step = settings.quality_step.max(1) as usize;
    (floor..=from.clamp(floor, 100)).rev().step_by(step)
}

/// Result of encoding one image
#[derive(Debug, Clone)]
pub struct EncodedBlob {
    pub bytes: Vec<u8>,
    pub size_bytes: usize,
    pub mime_type: &'static str,
    pub quality: u8,
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    /// The budget this blob was encoded against
    pub budget_bytes: usize,
}

impl EncodedBlob {
    /// True only for the best-effort fallback, when no candidate fit
    pub fn exceeds_budget(&self) -> bool {
        self.size_bytes > self.budget_bytes
    }
}

#[derive(Debug, Clone)]
pub struct MediaEncoder {
    plan: SearchPlan,
}

impl Default for MediaEncoder {
    fn default() -> Self {
        Self::new(EncoderSettings::default())
    }
}

impl MediaEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            plan: SearchPlan::from_settings(&settings),
        }
    }

    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    /// Encode `asset` as JPEG, aiming for at most `budget_bytes`
    ///
    /// Returns the first candidate at or under budget. When none fits, the
    /// smallest encoding produced is returned and
    /// [`EncodedBlob::exceeds_budget`] reports it. Fails only if no candidate
    /// could be encoded at all.
    pub fn encode(&self, asset: &MediaAsset, budget_bytes: usize) -> Result<EncodedBlob> {
        let base = asset.image.to_rgb8();
        let mut cache: Option<(f32, RgbImage)> = None;
        let mut smallest: Option<EncodedBlob> = None;

        for candidate in self.plan.candidates() {
            let frame = frame_for(&base, &mut cache, candidate.scale);
            let bytes = match encode_jpeg(frame, candidate.quality) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(
                        quality = candidate.quality,
                        scale = candidate.scale,
                        "Skipping candidate that failed to encode: {}",
                        e
                    );
                    continue;
                }
            };

            let blob = EncodedBlob {
                size_bytes: bytes.len(),
                bytes,
                mime_type: JPEG_MIME,
                quality: candidate.quality,
                scale: candidate.scale,
                width: frame.width(),
                height: frame.height(),
                budget_bytes,
            };

            if blob.size_bytes <= budget_bytes {
                debug!(
                    size = blob.size_bytes,
                    quality = blob.quality,
                    scale = blob.scale,
                    "Encoded image within budget"
                );
                return Ok(blob);
            }

            if smallest
                .as_ref()
                .map_or(true, |s| blob.size_bytes < s.size_bytes)
            {
                smallest = Some(blob);
            }
        }

        match smallest {
            Some(blob) => {
                warn!(
                    size = blob.size_bytes,
                    budget = budget_bytes,
                    "No encoding fit the budget, using the smallest one"
                );
                Ok(blob)
            }
            None => Err(SkycastError::Encoding(format!(
                "none of {} candidates could be encoded ({}x{} source)",
                self.plan.len(),
                asset.width(),
                asset.height()
            ))),
        }
    }

    /// Encode a single candidate, outside the search
    pub fn encode_candidate(&self, asset: &MediaAsset, candidate: &Candidate) -> Result<Vec<u8>> {
        let base = asset.image.to_rgb8();
        let mut cache = None;
        let frame = frame_for(&base, &mut cache, candidate.scale);
        encode_jpeg(frame, candidate.quality).map_err(|e| SkycastError::Encoding(e.to_string()))
    }
}

/// The image at `scale`, resampled once per distinct scale
fn frame_for<'a>(
    base: &'a RgbImage,
    cache: &'a mut Option<(f32, RgbImage)>,
    scale: f32,
) -> &'a RgbImage {
    if scale >= 1.0 {
        return base;
    }
    if cache.as_ref().map_or(true, |(cached, _)| *cached != scale) {
        let width = ((base.width() as f32 * scale).round() as u32).max(1);
        let height = ((base.height() as f32 * scale).round() as u32).max(1);
        *cache = Some((
            scale,
            image::imageops::resize(base, width, height, FilterType::Triangle),
        ));
    }
    match cache {
        Some((_, frame)) => frame,
        None => base,
    }
}

fn encode_jpeg(frame: &RgbImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode_image(frame)?;
    }
    Ok(buf)
}
