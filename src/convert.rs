//! Conversion of an arbitrary source image into a 1-bit raster bitmap.
//!
//! The pipeline runs in a fixed order: flatten alpha, rotate, fit to the
//! printable width of the tape, place on the print head canvas, grayscale,
//! invert, threshold, then mirror and pack eight pixels per byte.

use image::{
    imageops::{self, FilterType},
    DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage,
};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use log::{debug, info, warn};

use crate::{error::Error, label::LabelSpec};

const WHITE: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

/// Black/white cut expressed as a percentage.
///
/// Higher percentages classify more pixels as marks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(percent: f64) -> Self {
        Threshold(percent)
    }

    pub fn percent(&self) -> f64 {
        self.0
    }

    /// The 8-bit cut value applied to inverted grayscale pixels.
    ///
    /// The percentage is taken modulo 100 and the scaled result truncated,
    /// so 70% yields 76.
    pub fn cut(&self) -> u8 {
        let percent = self.0.rem_euclid(100.0);
        let cut = ((100.0 - percent) / 100.0 * 255.0) as i64;
        cut.max(0).min(255) as u8
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold(70.0)
    }
}

/// Options applied while converting one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertOptions {
    rotate: i32,
    threshold: Threshold,
    preview: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            rotate: 0,
            threshold: Threshold::default(),
            preview: false,
        }
    }
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotate counter clockwise by `degrees` before fitting.
    pub fn rotate(self, degrees: i32) -> Self {
        ConvertOptions {
            rotate: degrees,
            ..self
        }
    }

    pub fn threshold(self, percent: f64) -> Self {
        ConvertOptions {
            threshold: Threshold::new(percent),
            ..self
        }
    }

    /// Stop before packing and return a viewable two-level image instead.
    pub fn preview(self, flag: bool) -> Self {
        ConvertOptions {
            preview: flag,
            ..self
        }
    }

    /// Rotation normalized to `0..360`.
    pub fn rotation(&self) -> u32 {
        self.rotate.rem_euclid(360) as u32
    }

    pub fn cut(&self) -> u8 {
        self.threshold.cut()
    }

    pub fn is_preview(&self) -> bool {
        self.preview
    }
}

/// Row-major bitmap with one bit per pixel, ready for the raster payload.
///
/// Each row takes `width_px / 8` bytes. The most significant bit of a byte
/// is the leftmost pixel of the mirrored row, and a set bit is a mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    width: u32,
    height: u32,
    bits: Vec<u8>,
}

impl PreparedImage {
    /// Wrap an already packed buffer.
    pub fn new(width: u32, height: u32, bits: Vec<u8>) -> Self {
        PreparedImage {
            width,
            height,
            bits,
        }
    }

    pub fn width_px(&self) -> u32 {
        self.width
    }

    pub fn height_px(&self) -> u32 {
        self.height
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    pub fn row_bytes(&self) -> usize {
        (self.width / 8) as usize
    }

    /// Full rows of the bitmap; a trailing partial row is not yielded.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let size = self.row_bytes();
        // rows narrower than a byte carry nothing
        let usable = if size == 0 { 0 } else { self.bits.len() };
        self.bits[..usable].chunks_exact(size.max(1))
    }
}

/// Outcome of a conversion.
#[derive(Debug, Clone)]
pub enum Conversion {
    /// Two-level image with black where the head will mark.
    Preview(GrayImage),
    Bitmap(PreparedImage),
}

/// Convert `source` into a bitmap for `label` on a head `pixel_width` dots wide.
pub fn prepare(
    source: &DynamicImage,
    label: &LabelSpec,
    options: &ConvertOptions,
    pixel_width: u32,
) -> Result<Conversion, Error> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::Geometry { width, height });
    }

    let mut img = flatten(source);

    let rotation = options.rotation();
    if rotation != 0 {
        info!("rotating image by {} degrees", rotation);
        img = rotate(&img, rotation);
    }

    let img = fit_width(img, label.printable_px())?;
    let img = place(img, label, pixel_width);

    debug!("generating one-bit version of image");
    let mut gray = luma(&img);
    imageops::invert(&mut gray);
    let two_level = two_level(&gray, options.cut(), options.is_preview());

    if options.is_preview() {
        return Ok(Conversion::Preview(two_level));
    }

    Ok(Conversion::Bitmap(pack_mirrored(&two_level)))
}

/// Drop any alpha channel by compositing onto white.
///
/// Indexed images are already expanded to full color when decoded.
fn flatten(source: &DynamicImage) -> RgbImage {
    if !source.color().has_alpha() {
        return source.to_rgb8();
    }

    debug!("dropping alpha channel of image");
    let rgba = source.to_rgba8();
    let mut flat = RgbImage::from_pixel(rgba.width(), rgba.height(), WHITE);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u32::from(pixel[3]);
        let blend = |c: u8| ((u32::from(c) * alpha + 0xFF * (0xFF - alpha) + 127) / 0xFF) as u8;
        flat.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flat
}

/// Rotate counter clockwise, growing the canvas to hold every source pixel.
fn rotate(img: &RgbImage, degrees: u32) -> RgbImage {
    match degrees {
        90 => imageops::rotate270(img),
        180 => imageops::rotate180(img),
        270 => imageops::rotate90(img),
        _ => {
            let theta = (degrees as f32).to_radians();
            let (sin, cos) = theta.sin_cos();
            let (w, h) = (img.width() as f32, img.height() as f32);
            let new_w = ((w * cos.abs() + h * sin.abs()).ceil() as u32).max(1);
            let new_h = ((w * sin.abs() + h * cos.abs()).ceil() as u32).max(1);

            // y grows downward, so a negative angle turns counter clockwise
            let projection = Projection::translate(new_w as f32 / 2.0, new_h as f32 / 2.0)
                * Projection::rotate(-theta)
                * Projection::translate(-w / 2.0, -h / 2.0);

            let mut out = RgbImage::from_pixel(new_w, new_h, WHITE);
            warp_into(img, &projection, Interpolation::Bilinear, WHITE, &mut out);
            out
        }
    }
}

/// Scale to `printable` dots wide, keeping the aspect ratio.
fn fit_width(img: RgbImage, printable: u32) -> Result<RgbImage, Error> {
    let (width, height) = img.dimensions();
    if width == printable {
        return Ok(img);
    }

    let new_height = (f64::from(printable) / f64::from(width) * f64::from(height)) as u32;
    if new_height == 0 {
        return Err(Error::Geometry {
            width: printable,
            height: new_height,
        });
    }

    info!(
        "resizing image from ({}|{}) to ({}|{})",
        width, height, printable, new_height
    );
    Ok(imageops::resize(&img, printable, new_height, FilterType::Lanczos3))
}

/// Right-align on a white canvas as wide as the print head, less the tape offset.
fn place(img: RgbImage, label: &LabelSpec, pixel_width: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width >= pixel_width {
        return img;
    }

    let x = i64::from(pixel_width) - i64::from(width) - i64::from(label.offset_px());
    info!("repositioning image to ({}|0)", x);

    let mut canvas = RgbImage::from_pixel(pixel_width, height, WHITE);
    imageops::replace(&mut canvas, &img, x, 0);
    canvas
}

/// Grayscale with ITU-R 601 weights, in 16 bit fixed point.
fn luma(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgb([r, g, b]) = *img.get_pixel(x, y);
        let l = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000;
        Luma([(l >> 16) as u8])
    })
}

fn two_level(gray: &GrayImage, cut: u8, preview: bool) -> GrayImage {
    let (below, above) = if preview { (0xFF, 0x00) } else { (0x00, 0xFF) };

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] < cut {
            Luma([below])
        } else {
            Luma([above])
        }
    })
}

/// Mirror each row left to right while packing it, MSB first.
///
/// Columns that do not fill a whole byte are dropped.
fn pack_mirrored(img: &GrayImage) -> PreparedImage {
    let (width, height) = img.dimensions();
    let row_bytes = width / 8;

    if width % 8 != 0 {
        warn!(
            "image width {} is not a multiple of 8, dropping {} columns",
            width,
            width % 8
        );
    }

    let mut bits: Vec<u8> = Vec::with_capacity((row_bytes * height) as usize);
    for y in 0..height {
        for x in 0..row_bytes {
            let mut tmp: u8 = 0x00;
            for i in 0..8 {
                let pixel = img.get_pixel(width - 1 - (x * 8 + i), y)[0];
                let value: u8 = if pixel > 0 { 1 } else { 0 };
                tmp |= value << (7 - i);
            }
            bits.push(tmp);
        }
    }

    PreparedImage::new(width, height, bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn label(id: &str) -> LabelSpec {
        *LabelSpec::lookup(id).unwrap()
    }

    fn bitmap(conversion: Conversion) -> PreparedImage {
        match conversion {
            Conversion::Bitmap(bitmap) => bitmap,
            Conversion::Preview(_) => panic!("expected a bitmap"),
        }
    }

    fn solid(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    #[test]
    fn threshold_cut_values() {
        assert_eq!(Threshold::new(70.0).cut(), 76);
        assert_eq!(Threshold::new(50.0).cut(), 127);
        assert_eq!(Threshold::new(0.0).cut(), 255);
        assert_eq!(Threshold::new(100.0).cut(), 255);
        assert_eq!(Threshold::new(170.0).cut(), 76);
        assert_eq!(Threshold::new(-30.0).cut(), 76);
        assert_eq!(Threshold::new(99.9).cut(), 0);
    }

    #[test]
    fn options_builder() {
        let options = ConvertOptions::new().rotate(-90).threshold(40.0).preview(true);
        assert_eq!(options.rotation(), 270);
        assert_eq!(options.cut(), 153);
        assert!(options.is_preview());

        let options = ConvertOptions::default();
        assert_eq!(options.rotation(), 0);
        assert_eq!(options.cut(), 76);
        assert!(!options.is_preview());
        assert_eq!(ConvertOptions::new().rotate(720).rotation(), 0);
    }

    #[test]
    fn empty_source_is_rejected() {
        let source = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        match prepare(&source, &label("62"), &ConvertOptions::new(), 720) {
            Err(Error::Geometry { width, height }) => assert_eq!((width, height), (0, 10)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn degenerate_resize_is_rejected() {
        // 10000 wide, 1 high scales to zero rows on a 12mm tape
        let source = solid(10_000, 1, 0);
        assert!(matches!(
            prepare(&source, &label("12"), &ConvertOptions::new(), 720),
            Err(Error::Geometry { .. })
        ));
    }

    #[test]
    fn fits_printable_width_and_pads_to_head() {
        let source = solid(720, 100, 0);
        let bitmap = bitmap(prepare(&source, &label("62"), &ConvertOptions::new(), 720).unwrap());
        assert_eq!(bitmap.width_px(), 720);
        assert_eq!(bitmap.height_px(), 96);
        assert_eq!(bitmap.row_bytes(), 90);
        assert_eq!(bitmap.bits().len(), 90 * 96);
    }

    #[test]
    fn placement_honors_tape_offset() {
        // 696 dots already match the 62mm printable width
        let source = solid(696, 2, 0);
        let bitmap = bitmap(prepare(&source, &label("62"), &ConvertOptions::new(), 720).unwrap());

        let mut row = vec![0xFF; 90];
        row[0] = 0x00;
        row[1] = 0x0F;
        row[88] = 0xF0;
        row[89] = 0x00;
        assert_eq!(bitmap.rows().count(), 2);
        for r in bitmap.rows() {
            assert_eq!(r, &row[..]);
        }
    }

    #[test]
    fn rows_are_mirrored() {
        // 29mm: printable 306, offset 6 -> content occupies x in 408..714
        let mut img = GrayImage::from_pixel(306, 1, Luma([0xFF]));
        img.put_pixel(0, 0, Luma([0x00]));
        let source = DynamicImage::ImageLuma8(img);
        let bitmap = bitmap(prepare(&source, &label("29"), &ConvertOptions::new(), 720).unwrap());

        // source column 0 lands at canvas x = 408, mirrored to 311
        let marked: Vec<usize> = (0..720)
            .filter(|x| bitmap.bits()[x / 8] & (0x80 >> (x % 8)) != 0)
            .collect();
        assert_eq!(marked, vec![311]);
    }

    #[test]
    fn threshold_splits_gray_levels() {
        let mut img = GrayImage::from_pixel(696, 1, Luma([0xFF]));
        for x in 0..348 {
            img.put_pixel(x, 0, Luma([170]));
        }
        for x in 348..696 {
            img.put_pixel(x, 0, Luma([190]));
        }
        let source = DynamicImage::ImageLuma8(img);
        let bitmap = bitmap(prepare(&source, &label("62"), &ConvertOptions::new(), 720).unwrap());

        // canvas x 12..360 is 170 (marked), 360..708 is 190 (blank);
        // mirrored: 12..360 blank, 360..708 marked
        assert_eq!(bitmap.bits()[10], 0x00);
        assert_eq!(bitmap.bits()[80], 0xFF);

        let darker = ConvertOptions::new().threshold(80.0);
        let bitmap = bitmap_with(&source, &darker);
        assert_eq!(bitmap.bits()[10], 0xFF);
        assert_eq!(bitmap.bits()[80], 0xFF);
    }

    fn bitmap_with(source: &DynamicImage, options: &ConvertOptions) -> PreparedImage {
        bitmap(prepare(source, &label("62"), options, 720).unwrap())
    }

    #[test]
    fn transparent_pixels_become_background() {
        let mut img = RgbaImage::from_pixel(696, 1, Rgba([0, 0, 0, 0]));
        for x in 0..348 {
            img.put_pixel(x, 0, Rgba([0, 0, 0, 0xFF]));
        }
        let bitmap = bitmap_with(&DynamicImage::ImageRgba8(img), &ConvertOptions::new());
        // opaque half lands at canvas 12..360, mirrored to 360..708
        assert_eq!(bitmap.bits()[10], 0x00);
        assert_eq!(bitmap.bits()[80], 0xFF);
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let source = solid(100, 50, 0);
        let straight = bitmap(prepare(&source, &label("12"), &ConvertOptions::new(), 720).unwrap());
        assert_eq!(straight.height_px(), 53);

        let turned = bitmap(
            prepare(&source, &label("12"), &ConvertOptions::new().rotate(90), 720).unwrap(),
        );
        assert_eq!(turned.height_px(), 212);

        let turned = bitmap(
            prepare(&source, &label("12"), &ConvertOptions::new().rotate(-270), 720).unwrap(),
        );
        assert_eq!(turned.height_px(), 212);
    }

    #[test]
    fn quarter_turn_is_counter_clockwise() {
        let mut img = RgbImage::from_pixel(3, 2, WHITE);
        img.put_pixel(2, 0, Rgb([0, 0, 0]));
        let turned = rotate(&img, 90);
        assert_eq!(turned.dimensions(), (2, 3));
        // top right corner moves to top left
        assert_eq!(turned.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn luma_uses_601_weights() {
        let mut img = RgbImage::from_pixel(5, 1, WHITE);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(2, 0, Rgb([0, 0, 255]));
        img.put_pixel(3, 0, Rgb([0, 0, 0]));
        let gray = luma(&img);

        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![76, 150, 29, 0, 255]);
    }

    #[test]
    fn free_rotation_expands_canvas() {
        let img = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let turned = rotate(&img, 45);
        assert_eq!(turned.dimensions(), (15, 15));
        assert_eq!(turned.get_pixel(0, 0), &WHITE);
        assert_eq!(turned.get_pixel(7, 7), &Rgb([0, 0, 0]));
    }

    #[test]
    fn preview_inverts_polarity() {
        let source = solid(696, 3, 0);
        let options = ConvertOptions::new().preview(true);
        match prepare(&source, &label("62"), &options, 720).unwrap() {
            Conversion::Preview(img) => {
                assert_eq!(img.dimensions(), (720, 3));
                // dark source stays black, padding stays white, no mirroring
                assert_eq!(img.get_pixel(0, 0)[0], 0xFF);
                assert_eq!(img.get_pixel(12, 0)[0], 0x00);
                assert_eq!(img.get_pixel(707, 0)[0], 0x00);
                assert_eq!(img.get_pixel(708, 0)[0], 0xFF);
            }
            Conversion::Bitmap(_) => panic!("preview produced a bitmap"),
        }
    }

    #[test]
    fn odd_width_drops_trailing_columns() {
        let img = GrayImage::from_pixel(12, 2, Luma([0xFF]));
        let bitmap = pack_mirrored(&img);
        assert_eq!(bitmap.width_px(), 12);
        assert_eq!(bitmap.row_bytes(), 1);
        assert_eq!(bitmap.bits(), &[0xFF, 0xFF]);
    }

    #[test]
    fn rows_skip_partial_tail() {
        let bitmap = PreparedImage::new(16, 3, vec![1, 2, 3, 4, 5]);
        let rows: Vec<&[u8]> = bitmap.rows().collect();
        assert_eq!(rows, vec![&[1u8, 2][..], &[3u8, 4][..]]);

        let narrow = PreparedImage::new(4, 2, vec![0xAA]);
        assert_eq!(narrow.rows().count(), 0);
    }
}
