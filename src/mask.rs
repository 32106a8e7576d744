//! Inpainting mask compositing and the base64/PNG helpers around it.
//!
//! The paint tool hands over two RGBA8 rasters of identical size: the source
//! image and the user's strokes. Painted pixels become transparent in the
//! source's alpha channel, which is what edit endpoints read as "regenerate
//! here". Pixels that were already transparent stay transparent.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Result, WorkbenchError};

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

pub fn strip_data_url(b64: &str) -> &str {
    b64.strip_prefix(DATA_URL_PREFIX).unwrap_or(b64)
}

pub fn decode_base64(b64: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(strip_data_url(b64).trim())
        .map_err(|e| WorkbenchError::ImageError(format!("invalid base64 image: {}", e)))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Width and height of a base64 PNG.
pub fn png_dimensions(b64: &str) -> Result<(u32, u32)> {
    let bytes = decode_base64(b64)?;
    let reader = image::ImageReader::with_format(Cursor::new(bytes), image::ImageFormat::Png);
    reader
        .into_dimensions()
        .map_err(|e| WorkbenchError::ImageError(e.to_string()))
}

/// Decodes a base64 PNG into `(width, height, rgba8)`.
pub fn decode_png_rgba(b64: &str) -> Result<(u32, u32, Vec<u8>)> {
    let bytes = decode_base64(b64)?;
    let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .map_err(|e| WorkbenchError::ImageError(e.to_string()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok((width, height, rgba.into_raw()))
}

/// Encodes an RGBA8 raster as a base64 PNG, without a data-URL prefix.
pub fn encode_png_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<String> {
    let img = image::RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        WorkbenchError::ImageError(format!("raster does not match {}x{}", width, height))
    })?;

    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| WorkbenchError::ImageError(e.to_string()))?;
    Ok(encode_base64(&buf))
}

/// `alpha * (1 - stroke / 255)`, rounded.
fn masked_alpha(alpha: u8, stroke: u8) -> u8 {
    ((u32::from(alpha) * u32::from(255 - stroke) + 127) / 255) as u8
}

/// Folds the strokes' alpha into `base`'s alpha in place. RGB is untouched.
pub fn apply_stroke_mask(base: &mut [u8], strokes: &[u8]) -> Result<()> {
    if base.len() != strokes.len() || base.len() % 4 != 0 {
        return Err(WorkbenchError::ImageError(
            "mask compositing expects equal-length rgba8 buffers".into(),
        ));
    }
    for (px, stroke) in base.chunks_exact_mut(4).zip(strokes.chunks_exact(4)) {
        px[3] = masked_alpha(px[3], stroke[3]);
    }
    Ok(())
}

/// Builds the alpha mask PNG from the base layer and the strokes layer.
pub fn composite(width: u32, height: u32, base: &[u8], strokes: &[u8]) -> Result<String> {
    let expected = width as usize * height as usize * 4;
    if base.len() != expected || strokes.len() != expected {
        return Err(WorkbenchError::ImageError(format!(
            "layers must be {}x{} rgba8 ({} bytes), got {} and {}",
            width,
            height,
            expected,
            base.len(),
            strokes.len()
        )));
    }

    let mut out = base.to_vec();
    apply_stroke_mask(&mut out, strokes)?;
    log::debug!("Composited {}x{} inpainting mask", width, height);
    encode_png_rgba(width, height, out)
}

/// Same as [`composite`] for layers that arrive as base64 PNGs.
pub fn composite_png(base_b64: &str, strokes_b64: &str) -> Result<String> {
    let (width, height, base) = decode_png_rgba(base_b64)?;
    let (stroke_width, stroke_height, strokes) = decode_png_rgba(strokes_b64)?;
    if (width, height) != (stroke_width, stroke_height) {
        return Err(WorkbenchError::ImageError(format!(
            "strokes layer is {}x{}, base is {}x{}",
            stroke_width, stroke_height, width, height
        )));
    }
    composite(width, height, &base, &strokes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> Vec<u8> {
        px.iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect()
    }

    fn alphas(rgba: &[u8]) -> Vec<u8> {
        rgba.chunks_exact(4).map(|px| px[3]).collect()
    }

    #[test]
    fn test_empty_strokes_keep_base() {
        let base = vec![10, 20, 30, 255, 40, 50, 60, 0, 70, 80, 90, 128, 1, 2, 3, 7];
        let strokes = vec![0u8; 16];

        let b64 = composite(2, 2, &base, &strokes).unwrap();
        let (w, h, out) = decode_png_rgba(&b64).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(out, base);
    }

    #[test]
    fn test_opaque_strokes_clear_alpha() {
        let base = solid(3, 2, [200, 100, 50, 255]);
        let strokes = solid(3, 2, [255, 0, 0, 255]);

        let (_, _, out) = decode_png_rgba(&composite(3, 2, &base, &strokes).unwrap()).unwrap();
        assert!(alphas(&out).iter().all(|a| *a == 0));
    }

    #[test]
    fn test_partial_stroke_interpolates() {
        let mut base = vec![9, 9, 9, 255, 9, 9, 9, 200, 9, 9, 9, 0];
        let strokes = vec![255, 0, 0, 128, 255, 0, 0, 51, 255, 0, 0, 255];
        apply_stroke_mask(&mut base, &strokes).unwrap();

        assert_eq!(alphas(&base), vec![127, 160, 0]);
        // Colour channels pass through.
        assert!(base.chunks_exact(4).all(|px| px[..3] == [9, 9, 9]));
    }

    #[test]
    fn test_transparent_base_never_unpunched() {
        let mut base = solid(1, 1, [1, 2, 3, 0]);
        apply_stroke_mask(&mut base, &[0, 0, 0, 0]).unwrap();
        assert_eq!(base[3], 0);
    }

    #[test]
    fn test_layer_size_mismatch() {
        let base = solid(2, 2, [0, 0, 0, 255]);
        assert!(composite(2, 2, &base, &base[..8]).is_err());
        assert!(composite(3, 2, &base, &base).is_err());
        assert!(apply_stroke_mask(&mut [0u8; 5], &[0u8; 5]).is_err());
    }

    #[test]
    fn test_composite_png_layers() {
        let base = encode_png_rgba(2, 1, vec![5, 5, 5, 255, 6, 6, 6, 255]).unwrap();
        let strokes = encode_png_rgba(2, 1, vec![255, 0, 0, 255, 0, 0, 0, 0]).unwrap();

        let mask = composite_png(&base, &strokes).unwrap();
        let (_, _, out) = decode_png_rgba(&mask).unwrap();
        assert_eq!(alphas(&out), vec![0, 255]);
        assert_eq!(png_dimensions(&mask).unwrap(), (2, 1));

        let wrong = encode_png_rgba(1, 1, vec![0, 0, 0, 0]).unwrap();
        assert!(composite_png(&base, &wrong).is_err());
    }

    #[test]
    fn test_data_url_prefix_is_stripped() {
        let b64 = encode_png_rgba(1, 1, vec![0, 0, 0, 255]).unwrap();
        let prefixed = format!("data:image/png;base64,{}", b64);
        assert_eq!(strip_data_url(&prefixed), b64);
        assert_eq!(png_dimensions(&prefixed).unwrap(), (1, 1));
        assert!(decode_base64("%%%").is_err());
    }
}
