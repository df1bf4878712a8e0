//! Intensity-histogram face descriptor.
//!
//! A face crop is collapsed to luminance, resampled to a fixed canonical
//! resolution, binned into an intensity histogram and L2-normalized. The
//! transform is fixed and deterministic: the same pixels always produce the
//! same descriptor.

use crate::imaging;
use image::DynamicImage;

/// Number of histogram bins, and therefore the descriptor length.
pub const DESCRIPTOR_BINS: usize = 64;

/// Side length of the square canonical face resolution.
pub const CANONICAL_SIZE: u32 = 64;

/// Number of representable 8-bit intensity levels.
const INTENSITY_LEVELS: usize = 256;

/// Fixed-length normalized face signature.
///
/// Unit Euclidean norm, except for the all-zero descriptor produced by an
/// input with no samples. Values are read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    /// Wrap raw values, e.g. ones decoded from storage.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean norm of the vector.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Euclidean distance to `other`.
    ///
    /// Descriptors of different lengths are incomparable and are infinitely far
    /// apart, so such a candidate can never be the best match.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Histogram descriptor extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorExtractor {
    bins: usize,
    canonical_size: u32,
}

impl Default for DescriptorExtractor {
    fn default() -> Self {
        Self::new(DESCRIPTOR_BINS, CANONICAL_SIZE)
    }
}

impl DescriptorExtractor {
    /// Build an extractor with `bins` histogram bins over a
    /// `canonical_size`×`canonical_size` resampled face.
    ///
    /// The bin count is clamped to `1..=256`; finer bins than intensity levels
    /// would leave the top bins unreachable.
    pub fn new(bins: usize, canonical_size: u32) -> Self {
        Self {
            bins: bins.clamp(1, INTENSITY_LEVELS),
            canonical_size: canonical_size.max(1),
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Extract a descriptor from an already cropped face image.
    pub fn extract(&self, face: &DynamicImage) -> Descriptor {
        let gray = imaging::to_gray(face);
        let side = self.canonical_size as usize;
        let resampled = imaging::resize_bilinear(
            gray.as_raw(),
            gray.width() as usize,
            gray.height() as usize,
            side,
            side,
        );

        let mut hist = self.histogram(&resampled);
        l2_normalize(&mut hist);
        Descriptor(hist)
    }

    /// Count intensities into `bins` equal-width buckets.
    fn histogram(&self, samples: &[u8]) -> Vec<f32> {
        let bin_width = INTENSITY_LEVELS / self.bins;
        let mut hist = vec![0.0f32; self.bins];
        for &sample in samples {
            hist[self.bin_index(sample, bin_width)] += 1.0;
        }
        hist
    }

    /// Bucket for one intensity; the top edge folds into the last bin.
    fn bin_index(&self, intensity: u8, bin_width: usize) -> usize {
        (intensity as usize / bin_width).min(self.bins - 1)
    }
}

/// Divide by the Euclidean norm, flooring a zero norm at 1.
fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    for v in values.iter_mut() {
        *v /= norm;
    }
}

/// Extract a descriptor with the reference configuration (64 bins, 64×64).
pub fn extract(face: &DynamicImage) -> Descriptor {
    DescriptorExtractor::default().extract(face)
}
