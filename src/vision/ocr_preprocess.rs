//! Image preparation filters applied before OCR
//!
//! Pill photos are read as-is, sharpened with a fixed kernel, and optionally
//! turned through the four right angles so imprints printed at any
//! orientation get a chance to be read upright.

use anyhow::Result;
use image::{imageops, RgbImage};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::ImprintError;

/// 3x3 sharpening kernel: center 5, four-connected neighbors -1, corners 0
pub const SHARPEN_KERNEL: [[i32; 3]; 3] = [[0, -1, 0], [-1, 5, -1], [0, -1, 0]];

/// Right-angle clockwise rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotations in the order permutations are generated
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    /// Angle in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = ImprintError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(ImprintError::UnsupportedAngle(other)),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Decode an image file into an RGB buffer
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).map_err(|source| ImprintError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    let rgb = img.to_rgb8();
    debug!("Loaded {:?} ({}x{})", path, rgb.width(), rgb.height());
    Ok(rgb)
}

/// Apply [`SHARPEN_KERNEL`] to every channel of every pixel.
///
/// Borders are extended by reflection without repeating the edge pixel
/// (`dcb|abcd|cba`), so edge pixels are filtered too.
pub fn sharpen(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut result = RgbImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut acc = [0i32; 3];

            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                for (kx, &weight) in row.iter().enumerate() {
                    if weight == 0 {
                        continue;
                    }
                    let sx = reflect_101(x as i64 + kx as i64 - 1, width);
                    let sy = reflect_101(y as i64 + ky as i64 - 1, height);
                    let pixel = image.get_pixel(sx, sy);
                    for c in 0..3 {
                        acc[c] += weight * pixel[c] as i32;
                    }
                }
            }

            let out = result.get_pixel_mut(x, y);
            for c in 0..3 {
                out[c] = acc[c].clamp(0, 255) as u8;
            }
        }
    }

    result
}

/// Map an out-of-range coordinate back inside `0..len` by reflection
fn reflect_101(i: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let i = if i < 0 { -i } else { i };
    let i = if i >= len { 2 * (len - 1) - i } else { i };
    i as u32
}

/// Rotate clockwise, growing the canvas so nothing is cropped.
///
/// For right angles the fitted bounds are exact: 90 and 270 swap width and
/// height, no padding is introduced.
pub fn rotate_bound(image: &RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::Deg0 => image.clone(),
        Rotation::Deg90 => imageops::rotate90(image),
        Rotation::Deg180 => imageops::rotate180(image),
        Rotation::Deg270 => imageops::rotate270(image),
    }
}
