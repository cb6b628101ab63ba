//! Image I/O

use super::ImageError;
use crate::math::*;
use exr::prelude::*;
use regex::Regex;
use std::result::Result;
use std::sync::OnceLock;

/// Decoded RGBA float pixels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImagePixels {
    /// Width in pixels.
    pub width: usize,

    /// Height in pixels.
    pub height: usize,

    /// Linear RGBA texels with row 0 at the bottom.
    pub pixels: Vec<[Float; 4]>,
}

/// Read an image into linear RGBA. 8-bit images are treated as sRGB.
///
/// * `path` - Input file path.
pub fn read_image(path: &str) -> Result<ImagePixels, ImageError> {
    let result = match get_extension_from_filename(path) {
        Some(".exr") => read_exr(path),
        Some(".hdr") => read_float(path),
        Some(_) => read_8_bit(path),
        None => return Err(ImageError::UnsupportedFormat(path.to_string())),
    };
    let image = result.map_err(|reason| ImageError::Read {
        path: path.to_string(),
        reason,
    })?;
    if image.width * image.height != image.pixels.len() || image.pixels.is_empty() {
        return Err(ImageError::Size {
            path: path.to_string(),
            width: image.width,
            height: image.height,
            len: image.pixels.len(),
        });
    }
    Ok(image)
}

/// Read the first valid RGBA layer of an OpenEXR file.
///
/// * `path` - Input file path.
fn read_exr(path: &str) -> Result<ImagePixels, String> {
    let reader = read()
        .no_deep_data()
        .largest_resolution_level()
        .rgba_channels(
            |resolution, _channels| {
                let width = resolution.width();
                let height = resolution.height();
                ImagePixels {
                    width,
                    height,
                    pixels: vec![[0.0; 4]; width * height],
                }
            },
            |img, position, (r, g, b, a): (f32, f32, f32, f32)| {
                let row = img.height - 1 - position.y();
                let offset = row * img.width + position.x();
                img.pixels[offset] = [r, g, b, a];
            },
        )
        .first_valid_layer()
        .all_attributes();

    match reader.from_file(path) {
        Ok(image) => {
            let pixels = image.layer_data.channel_data.pixels;
            info!("Read EXR image {path} ({} x {})", pixels.width, pixels.height);
            Ok(pixels)
        }
        Err(err) => Err(err.to_string()),
    }
}

/// Read a floating point format supported by the `image` crate.
///
/// * `path` - Input file path.
fn read_float(path: &str) -> Result<ImagePixels, String> {
    let img = ::image::open(path).map_err(|e| e.to_string())?.into_rgba32f();
    let (width, height) = (img.width() as usize, img.height() as usize);
    let mut pixels = vec![[0.0; 4]; width * height];
    for (x, y, p) in img.enumerate_pixels() {
        let row = height - 1 - y as usize;
        pixels[row * width + x as usize] = p.0;
    }
    info!("Read float image {path} ({width} x {height})");
    Ok(ImagePixels { width, height, pixels })
}

/// Read an 8-bit image format, converting colour from sRGB.
///
/// * `path` - Input file path.
fn read_8_bit(path: &str) -> Result<ImagePixels, String> {
    let img = ::image::open(path).map_err(|e| e.to_string())?.into_rgba8();
    let (width, height) = (img.width() as usize, img.height() as usize);
    let mut pixels = vec![[0.0; 4]; width * height];
    for (x, y, p) in img.enumerate_pixels() {
        let row = height - 1 - y as usize;
        pixels[row * width + x as usize] = [
            srgb_to_linear(p[0] as Float / 255.0),
            srgb_to_linear(p[1] as Float / 255.0),
            srgb_to_linear(p[2] as Float / 255.0),
            p[3] as Float / 255.0,
        ];
    }
    info!("Read 8-bit image {path} ({width} x {height})");
    Ok(ImagePixels { width, height, pixels })
}

/// Write linear RGBA pixels, top row first. The format follows the file
/// extension.
///
/// * `path`   - Output file path.
/// * `rgba`   - Pixels.
/// * `width`  - Width in pixels.
/// * `height` - Height in pixels.
pub fn write_image(path: &str, rgba: &[[Float; 4]], width: usize, height: usize) -> Result<(), ImageError> {
    if rgba.len() != width * height {
        return Err(ImageError::Size {
            path: path.to_string(),
            width,
            height,
            len: rgba.len(),
        });
    }

    let result = match get_extension_from_filename(path) {
        Some(".exr") => write_exr(path, rgba, width, height),
        Some(".png") => write_8_bit(path, rgba, width, height, ::image::ImageFormat::Png),
        Some(".tga") => write_8_bit(path, rgba, width, height, ::image::ImageFormat::Tga),
        _ => return Err(ImageError::UnsupportedFormat(path.to_string())),
    };
    result.map_err(|reason| ImageError::Write {
        path: path.to_string(),
        reason,
    })
}

/// Returns the regular expression that extracts a file extension: the last
/// period followed by no periods or slashes.
fn regex_file_ext() -> Option<&'static Regex> {
    static DATA: OnceLock<Option<Regex>> = OnceLock::new();
    DATA.get_or_init(|| Regex::new(r"(\.[^./\\]+)$").ok()).as_ref()
}

/// Retrieve the extension from a file path.
///
/// * `path` - The file path.
fn get_extension_from_filename(path: &str) -> Option<&str> {
    regex_file_ext()?
        .captures(path)
        .and_then(|c| c.get(1).map(|m| m.as_str()))
}

/// Writes the image in OpenEXR format.
///
/// * `path`   - Output file path.
/// * `rgba`   - Pixels.
/// * `width`  - Width.
/// * `height` - Height.
fn write_exr(path: &str, rgba: &[[Float; 4]], width: usize, height: usize) -> Result<(), String> {
    info!("Writing image {path} with resolution {width}x{height}");

    let size = Vec2(width, height);
    let layer = Layer::new(
        size,
        LayerAttributes::named("render"),
        Encoding::SMALL_LOSSLESS,
        SpecificChannels::rgba(|pos: Vec2<usize>| {
            let [r, g, b, a] = rgba[pos.1 * width + pos.0];
            (r, g, b, a)
        }),
    );

    let attributes = ImageAttributes::new(IntegerBounds::from_dimensions(size));
    Image::empty(attributes)
        .with_layer(layer)
        .write()
        .to_file(path)
        .map_err(|err| err.to_string())
}

/// Writes the image in an 8-bit format with sRGB encoding.
///
/// * `path`         - Output file path.
/// * `rgba`         - Pixels.
/// * `width`        - Width.
/// * `height`       - Height.
/// * `image_format` - Image format.
fn write_8_bit(
    path: &str,
    rgba: &[[Float; 4]],
    width: usize,
    height: usize,
    image_format: ::image::ImageFormat,
) -> Result<(), String> {
    info!("Writing image {path} with resolution {width}x{height}");

    let imgbuf = ::image::RgbaImage::from_fn(width as u32, height as u32, |x, y| {
        let [r, g, b, a] = rgba[y as usize * width + x as usize];
        ::image::Rgba([clamp_byte(linear_to_srgb(r)), clamp_byte(linear_to_srgb(g)), clamp_byte(linear_to_srgb(b)), clamp_byte(a)])
    });
    imgbuf
        .save_with_format(path, image_format)
        .map_err(|err| err.to_string())
}

/// Clamp a [0, 1] value to the 8-bit range.
///
/// * `v` - Value.
#[inline]
pub fn clamp_byte(v: Float) -> u8 {
    clamp(255.0 * v + 0.5, 0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(get_extension_from_filename("a/b.c/image.exr"), Some(".exr"));
        assert_eq!(get_extension_from_filename("render.png"), Some(".png"));
        assert_eq!(get_extension_from_filename("a.b/noext"), None);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_image("/nonexistent/texture.png");
        assert!(matches!(err, Err(ImageError::Read { .. })));
        assert!(matches!(read_image("noext"), Err(ImageError::UnsupportedFormat(_))));
    }

    #[test]
    fn write_checks_size() {
        let err = write_image("out.png", &[[0.0; 4]; 3], 2, 2);
        assert!(matches!(err, Err(ImageError::Size { len: 3, .. })));
    }

    #[test]
    fn png_round_trip_in_temp_dir() {
        let path = std::env::temp_dir().join("kernel_io_round_trip.png");
        let path = path.to_string_lossy().to_string();
        let pixels = vec![[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]];
        assert!(write_image(&path, &pixels, 2, 1).is_ok());
        let back = read_image(&path);
        assert!(matches!(&back, Ok(img) if img.width == 2 && img.pixels[0][0] > 0.99 && img.pixels[1][2] > 0.99));
        let _ = std::fs::remove_file(&path);
    }
}
