//! Watermark placement: scale, fade, center, and alpha-blend.
//!
//! The watermark is resized to a percentage of the base image's width, its
//! alpha channel is faded to the requested opacity, and the result is laid
//! over a copy of the base with the "over" operator:
//! `out = src * alpha + dst * (1 - alpha)`
//!
//! The base image is never modified.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};

/// Compose `watermark` centered on `base`.
///
/// `scale_pct` is the watermark width as a percentage of the base width;
/// `opacity_pct` is the percentage of the watermark's alpha that survives.
/// Neither is range-checked here: an opacity of 100 or more leaves the
/// watermark alpha untouched and an oversized scale simply overflows the
/// base on every side.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] if either image has a zero dimension.
pub fn compose(
    base: &DynamicImage,
    watermark: &DynamicImage,
    opacity_pct: u8,
    scale_pct: u8,
) -> Result<RgbaImage> {
    compose_rgba(base.to_rgba8(), &watermark.to_rgba8(), opacity_pct, scale_pct)
}

/// Same as [`compose`], for callers that already hold RGBA buffers.
///
/// `base` is consumed and becomes the output canvas.
///
/// # Errors
///
/// Returns [`Error::EmptyImage`] if either image has a zero dimension.
pub fn compose_rgba(
    base: RgbaImage,
    watermark: &RgbaImage,
    opacity_pct: u8,
    scale_pct: u8,
) -> Result<RgbaImage> {
    ensure_non_empty(&base)?;
    ensure_non_empty(watermark)?;

    let (target_w, target_h) =
        watermark_dimensions(base.width(), watermark.width(), watermark.height(), scale_pct);
    let mut overlay = resize_premultiplied(watermark, target_w, target_h);
    apply_opacity(&mut overlay, opacity_pct);

    let (x, y) = center_offset(base.width(), base.height(), target_w, target_h);
    debug!(
        base_w = base.width(),
        base_h = base.height(),
        target_w,
        target_h,
        x,
        y,
        opacity_pct,
        "placing watermark"
    );

    let mut composed = base;
    alpha_composite(&mut composed, &overlay, x, y);
    Ok(composed)
}

fn ensure_non_empty(img: &RgbaImage) -> Result<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::EmptyImage {
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(())
}

/// Size of the resized watermark for a base image `base_width` pixels wide.
///
/// Width is `floor(base_width * scale_pct / 100)`, height follows the same
/// ratio; both are at least 1.
#[must_use]
pub fn watermark_dimensions(
    base_width: u32,
    wm_width: u32,
    wm_height: u32,
    scale_pct: u8,
) -> (u32, u32) {
    let target_w = (u64::from(base_width) * u64::from(scale_pct) / 100).max(1);
    let target_h = (u64::from(wm_height) * target_w / u64::from(wm_width.max(1))).max(1);
    (
        u32::try_from(target_w).unwrap_or(u32::MAX),
        u32::try_from(target_h).unwrap_or(u32::MAX),
    )
}

/// Top-left corner that centers a `width` x `height` overlay on the base.
///
/// Floor division, so the result is negative when the overlay is larger.
#[must_use]
pub fn center_offset(base_width: u32, base_height: u32, width: u32, height: u32) -> (i64, i64) {
    let x = (i64::from(base_width) - i64::from(width)).div_euclid(2);
    let y = (i64::from(base_height) - i64::from(height)).div_euclid(2);
    (x, y)
}

/// Lanczos3 resize on premultiplied alpha, so transparent pixels do not
/// bleed their color into visible edges.
fn resize_premultiplied(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }

    let mut premultiplied = img.clone();
    for px in premultiplied.pixels_mut() {
        let a = u32::from(px[3]);
        for ch in 0..3 {
            px[ch] = div255(u32::from(px[ch]) * a);
        }
    }

    let mut resized = imageops::resize(&premultiplied, width, height, FilterType::Lanczos3);
    for px in resized.pixels_mut() {
        let a = u32::from(px[3]);
        if a == 0 {
            *px = Rgba([0, 0, 0, 0]);
            continue;
        }
        for ch in 0..3 {
            let straight = (u32::from(px[ch]) * 255 + a / 2) / a;
            #[allow(clippy::cast_possible_truncation)]
            {
                px[ch] = straight.min(255) as u8;
            }
        }
    }
    resized
}

/// `round(v / 255)` for `v <= 255 * 255`.
#[allow(clippy::cast_possible_truncation)]
fn div255(v: u32) -> u8 {
    ((v + 127) / 255) as u8
}

/// Fade the alpha channel of `img` to `opacity_pct` percent.
///
/// The alpha channel is contrast-stretched first (see [`stretch_contrast`])
/// and then scaled, rounding halves to even. At 100 or above the image is
/// left as-is.
pub fn apply_opacity(img: &mut RgbaImage, opacity_pct: u8) {
    if opacity_pct >= 100 {
        return;
    }

    let mut alpha = GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([img.get_pixel(x, y)[3]])
    });
    stretch_contrast(&mut alpha);

    let lut = fade_lut(f64::from(opacity_pct) / 100.0);
    for (px, a) in img.pixels_mut().zip(alpha.pixels()) {
        px[3] = lut[usize::from(a[0])];
    }
}

/// Remap a single channel so its darkest value becomes 0 and its lightest 255.
///
/// Intermediate values are mapped linearly and truncated. A channel holding
/// a single value is left unchanged.
pub fn stretch_contrast(channel: &mut GrayImage) {
    let mut present = [false; 256];
    for px in channel.pixels() {
        present[usize::from(px[0])] = true;
    }

    let Some(lo) = present.iter().position(|&p| p) else {
        return;
    };
    let hi = present.iter().rposition(|&p| p).unwrap_or(lo);
    if hi <= lo {
        return;
    }

    let lut = stretch_lut(lo, hi);
    for px in channel.pixels_mut() {
        px[0] = lut[usize::from(px[0])];
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fade_lut(factor: f64) -> [u8; 256] {
    std::array::from_fn(|i| (i as f64 * factor).round_ties_even().clamp(0.0, 255.0) as u8)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn stretch_lut(lo: usize, hi: usize) -> [u8; 256] {
    let scale = 255.0 / (hi - lo) as f64;
    let offset = -(lo as f64) * scale;
    std::array::from_fn(|i| ((i as f64 * scale + offset) as i64).clamp(0, 255) as u8)
}

/// Composite `src` over `dst` with its top-left corner at `(x, y)`.
///
/// Pixels of `src` that land outside `dst` are dropped. Fully transparent
/// source pixels leave the destination untouched.
pub fn alpha_composite(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    let (dst_w, dst_h) = dst.dimensions();

    for (sx, sy, src_px) in src.enumerate_pixels() {
        let (Ok(dx), Ok(dy)) = (
            u32::try_from(x + i64::from(sx)),
            u32::try_from(y + i64::from(sy)),
        ) else {
            continue;
        };
        if dx >= dst_w || dy >= dst_h {
            continue;
        }
        blend_over(dst.get_pixel_mut(dx, dy), *src_px);
    }
}

fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    if src[3] == 0 {
        return;
    }

    let src_a = f32::from(src[3]) / 255.0;
    let dst_a = f32::from(dst[3]) / 255.0;
    let dst_weight = dst_a * (1.0 - src_a);
    let out_a = src_a + dst_weight;

    for ch in 0..3 {
        let c = (f32::from(src[ch]) * src_a + f32::from(dst[ch]) * dst_weight) / out_a;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            dst[ch] = c.round().clamp(0.0, 255.0) as u8;
        }
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(px))
    }

    #[test]
    fn dimensions_match_documented_example() {
        assert_eq!(watermark_dimensions(1000, 400, 100, 20), (200, 50));
        assert_eq!(center_offset(1000, 800, 200, 50), (400, 375));
    }

    #[test]
    fn dimensions_follow_scale_and_keep_aspect_ratio() {
        for base_w in [1u32, 17, 640, 1000, 4033] {
            for scale in 5u8..=60 {
                let (w, h) = watermark_dimensions(base_w, 300, 120, scale);
                let expected_w = (base_w * u32::from(scale) / 100).max(1);
                assert_eq!(w, expected_w, "base {base_w} scale {scale}");
                assert_eq!(h, (120 * expected_w / 300).max(1), "base {base_w} scale {scale}");
            }
        }
    }

    #[test]
    fn dimensions_never_collapse_to_zero() {
        assert_eq!(watermark_dimensions(3, 10, 10, 5), (1, 1));
        assert_eq!(watermark_dimensions(100, 1000, 1, 10), (10, 1));
    }

    #[test]
    fn center_offset_floors_negative_values() {
        assert_eq!(center_offset(10, 10, 4, 4), (3, 3));
        assert_eq!(center_offset(10, 10, 5, 5), (2, 2));
        assert_eq!(center_offset(10, 10, 21, 21), (-6, -6));
    }

    #[test]
    fn composed_image_keeps_base_dimensions() {
        let base = DynamicImage::ImageRgba8(solid(120, 80, [10, 20, 30, 255]));
        for (wm_w, wm_h) in [(1, 1), (50, 10), (10, 50), (400, 400)] {
            let wm = DynamicImage::ImageRgba8(solid(wm_w, wm_h, [255, 0, 0, 200]));
            for scale in [5, 20, 60, 150] {
                let out = compose(&base, &wm, 50, scale).unwrap();
                assert_eq!(out.dimensions(), (120, 80));
            }
        }
    }

    #[test]
    fn full_opacity_leaves_alpha_untouched() {
        let mut img = RgbaImage::from_fn(4, 1, |x, _| Rgba([0, 0, 0, 10 + 60 * x as u8]));
        let before = img.clone();
        apply_opacity(&mut img, 100);
        assert_eq!(img, before);
    }

    #[test]
    fn zero_opacity_leaves_base_untouched() {
        let base = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 48, |x, y| {
            image::Rgb([x as u8 * 3, y as u8 * 5, 77])
        }));
        let wm = DynamicImage::ImageRgba8(solid(30, 30, [255, 255, 255, 255]));
        let out = compose(&base, &wm, 0, 50).unwrap();
        assert_eq!(out, base.to_rgba8());
    }

    #[test]
    fn half_opacity_on_opaque_pixel_rounds_to_even() {
        let mut img = solid(2, 2, [0, 0, 0, 255]);
        apply_opacity(&mut img, 50);
        assert!(img.pixels().all(|p| p[3] == 128));

        let mut img = solid(1, 1, [0, 0, 0, 255]);
        apply_opacity(&mut img, 30);
        assert_eq!(img.get_pixel(0, 0)[3], 76);
    }

    #[test]
    fn opacity_stretches_alpha_before_scaling() {
        let mut img = RgbaImage::from_fn(3, 1, |x, _| Rgba([0, 0, 0, [50, 100, 150][x as usize]]));
        apply_opacity(&mut img, 50);
        let alphas: Vec<u8> = img.pixels().map(|p| p[3]).collect();
        // stretched to [0, 127, 255] then halved
        assert_eq!(alphas, vec![0, 64, 128]);
    }

    #[test]
    fn stretch_contrast_maps_range_to_full_scale() {
        let mut ch = GrayImage::from_fn(3, 1, |x, _| Luma([[10, 105, 200][x as usize]]));
        stretch_contrast(&mut ch);
        assert_eq!(ch.into_raw(), vec![0, 127, 255]);

        let mut flat = GrayImage::from_pixel(2, 2, Luma([42]));
        stretch_contrast(&mut flat);
        assert!(flat.pixels().all(|p| p[0] == 42));
    }

    #[test]
    fn composite_blends_with_over_operator() {
        let mut dst = solid(3, 1, [0, 0, 0, 255]);
        let src = RgbaImage::from_fn(3, 1, |x, _| Rgba([255, 0, 0, [255, 128, 0][x as usize]]));
        alpha_composite(&mut dst, &src, 0, 0);

        assert_eq!(*dst.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*dst.get_pixel(1, 0), Rgba([128, 0, 0, 255]));
        assert_eq!(*dst.get_pixel(2, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn composite_onto_transparent_keeps_source_color() {
        let mut dst = solid(1, 1, [0, 0, 0, 0]);
        alpha_composite(&mut dst, &solid(1, 1, [40, 80, 120, 100]), 0, 0);
        assert_eq!(*dst.get_pixel(0, 0), Rgba([40, 80, 120, 100]));
    }

    #[test]
    fn composite_clips_negative_offsets() {
        let mut dst = solid(4, 4, [0, 0, 0, 255]);
        alpha_composite(&mut dst, &solid(4, 4, [255, 255, 255, 255]), -2, -2);
        for (x, y, px) in dst.enumerate_pixels() {
            let covered = x < 2 && y < 2;
            assert_eq!(px[0] == 255, covered, "pixel ({x},{y})");
        }
    }

    #[test]
    fn watermark_is_centered_on_base() {
        let base = DynamicImage::ImageRgba8(solid(1000, 800, [255, 255, 255, 255]));
        let wm = DynamicImage::ImageRgba8(solid(400, 100, [200, 0, 0, 255]));
        let out = compose(&base, &wm, 100, 20).unwrap();

        assert_eq!(*out.get_pixel(500, 400), Rgba([200, 0, 0, 255]));
        assert_eq!(*out.get_pixel(420, 390), Rgba([200, 0, 0, 255]));
        assert_eq!(*out.get_pixel(390, 400), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(500, 430), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn degenerate_images_are_rejected() {
        let empty = DynamicImage::new_rgba8(0, 5);
        let ok = DynamicImage::new_rgba8(5, 5);
        assert!(matches!(
            compose(&empty, &ok, 50, 20),
            Err(Error::EmptyImage { width: 0, height: 5 })
        ));
        assert!(matches!(compose(&ok, &empty, 50, 20), Err(Error::EmptyImage { .. })));
    }
}
