//! Raster sampling with the two supported boundary policies.
//!
//! [`Raster`] is the decoded RGB image. The convolution engine reads it
//! through a [`Sampler`], which decides what happens when a kernel
//! offset lands outside the image:
//!
//! - [`Sampler::Clamped`] reports out-of-bounds neighbours as missing so
//!   the engine can skip them and renormalize.
//! - [`Sampler::Mirrored`] reads from a [`BorderedRaster`], a copy of the
//!   image padded on every side by reflecting it across its edges. Every
//!   offset is then in bounds.

pub use image::RgbImage as Raster;

/// A raster padded by `border` pixels on each side.
///
/// Edge strips are mirror images of the adjacent interior (`-1` maps to
/// `0`, `-2` to `1`, ...). Corner blocks are the point reflection of the
/// image through the nearest corner. The reflection is periodic, so a
/// border wider than the image is still fully defined.
#[derive(Debug, Clone)]
pub struct BorderedRaster {
    padded: Raster,
    border: u32,
    width: u32,
    height: u32,
}

impl BorderedRaster {
    /// Pad `image` with a mirrored border of `border` pixels.
    ///
    /// An empty image has nothing to reflect and stays empty.
    #[must_use]
    pub fn mirrored(image: &Raster, border: u32) -> Self {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Self {
                padded: Raster::new(0, 0),
                border,
                width: w,
                height: h,
            };
        }
        let b = i64::from(border);
        let padded = Raster::from_fn(w + 2 * border, h + 2 * border, |px, py| {
            let sx = reflect(i64::from(px) - b, w);
            let sy = reflect(i64::from(py) - b, h);
            *image.get_pixel(sx, sy)
        });
        Self {
            padded,
            border,
            width: w,
            height: h,
        }
    }

    #[cfg(test)]
    pub(crate) const fn border(&self) -> u32 {
        self.border
    }

    #[cfg(test)]
    pub(crate) const fn padded(&self) -> &Raster {
        &self.padded
    }

    /// RGB sample at image coordinates `(x, y)`, where `-border <= x <
    /// width + border` (likewise for `y`).
    ///
    /// Returns `None` outside the padded area.
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> Option<[u8; 3]> {
        let b = i64::from(self.border);
        let px = u32::try_from(x + b).ok()?;
        let py = u32::try_from(y + b).ok()?;
        self.padded.get_pixel_checked(px, py).map(|p| p.0)
    }
}

/// Map a possibly out-of-range coordinate onto `[0, len)` by symmetric
/// reflection.
///
/// `len` must be non-zero.
fn reflect(coord: i64, len: u32) -> u32 {
    let n = i64::from(len);
    let period = 2 * n;
    let m = coord.rem_euclid(period);
    let folded = if m < n { m } else { period - 1 - m };
    // `folded` lies in [0, n), so it always fits.
    u32::try_from(folded).unwrap_or(0)
}

/// Neighbourhood access for the convolution engine.
#[derive(Debug, Clone, Copy)]
pub enum Sampler<'a> {
    /// Read straight from the image; out-of-bounds reads are skipped.
    Clamped(&'a Raster),
    /// Read from a mirrored, pre-padded copy; every read succeeds.
    Mirrored(&'a BorderedRaster),
}

impl Sampler<'_> {
    /// Width and height of the underlying (unpadded) image.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Clamped(image) => image.dimensions(),
            Self::Mirrored(bordered) => (bordered.width, bordered.height),
        }
    }

    /// RGB sample at `(x, y)`, or `None` if the neighbour does not
    /// exist under this policy.
    #[must_use]
    pub fn sample(&self, x: i64, y: i64) -> Option<[u8; 3]> {
        match self {
            Self::Clamped(image) => {
                let x = u32::try_from(x).ok()?;
                let y = u32::try_from(y).ok()?;
                image.get_pixel_checked(x, y).map(|p| p.0)
            }
            Self::Mirrored(bordered) => bordered.get(x, y),
        }
    }

    /// Whether every offset within the kernel radius is guaranteed to
    /// be in bounds, which lets the engine reuse the full kernel sum as
    /// the denominator.
    #[must_use]
    pub const fn always_in_bounds(&self) -> bool {
        matches!(self, Self::Mirrored(_))
    }
}
