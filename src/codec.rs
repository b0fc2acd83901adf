// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Image codec boundary.
//!
//! The filesystem never looks inside a blob; it only needs its length. The
//! frame-specific compressors live outside this crate and plug in through
//! [`Codec`]. Only uncompressed RGB565 is built in.

use serde::Serialize;

use crate::error::{FrameError, Result};

/// Compression scheme a frame stores its pictures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compression {
    /// AX203 4:2:0 YUV, one byte per pixel.
    Yuv,
    /// AX203 YUV with delta-coded luma, 3/4 byte per pixel.
    YuvDelta,
    /// AX206/AX3003 JPEG variant.
    Jpeg,
    /// ST2205 block codec with a 16-byte header.
    St2205Blocks,
    /// Big-endian RGB565, two bytes per pixel.
    Rgb565,
}

impl Compression {
    /// Blob length for codecs that always produce the same size, `None` when
    /// the length is only known after encoding.
    pub fn fixed_blob_size(self, width: u32, height: u32) -> Option<u32> {
        match self {
            Compression::Yuv => Some(width * height),
            Compression::YuvDelta => Some(width * height * 3 / 4),
            Compression::Rgb565 => Some(width * height * 2),
            Compression::Jpeg | Compression::St2205Blocks => None,
        }
    }
}

/// Packed 8-bit RGB, row major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; (width * height * 3) as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != (width * height * 3) as usize {
            return Err(FrameError::BadParameter(format!(
                "{} bytes of pixel data for a {}x{} image",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, pixels })
    }
}

pub trait Codec {
    fn compression(&self) -> Compression;
    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>>;
    fn decode(&self, blob: &[u8], width: u32, height: u32) -> Result<RgbImage>;
}

pub struct Rgb565Codec;

impl Codec for Rgb565Codec {
    fn compression(&self) -> Compression {
        Compression::Rgb565
    }

    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(image.pixels.len() / 3 * 2);
        for px in image.pixels.chunks_exact(3) {
            let (r, g, b) = (px[0] as u16, px[1] as u16, px[2] as u16);
            let v = ((r & 0xf8) << 8) | ((g & 0xfc) << 3) | (b >> 3);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Ok(out)
    }

    fn decode(&self, blob: &[u8], width: u32, height: u32) -> Result<RgbImage> {
        let expected = (width * height * 2) as usize;
        if blob.len() < expected {
            return Err(FrameError::Corrupted(format!(
                "RGB565 blob of {} bytes, need {}",
                blob.len(),
                expected
            )));
        }
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for px in blob[..expected].chunks_exact(2) {
            let v = u16::from_be_bytes([px[0], px[1]]);
            let r = ((v >> 8) & 0xf8) as u8;
            let g = ((v >> 3) & 0xfc) as u8;
            let b = ((v << 3) & 0xf8) as u8;
            pixels.extend_from_slice(&[r | r >> 5, g | g >> 6, b | b >> 5]);
        }
        Ok(RgbImage { width, height, pixels })
    }
}

/// Returns the built-in codec for `compression`.
pub fn codec_for(compression: Compression) -> Result<Box<dyn Codec>> {
    match compression {
        Compression::Rgb565 => Ok(Box::new(Rgb565Codec)),
        other => Err(FrameError::NotSupported(format!("no built-in codec for {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_keeps_high_bits() {
        let img = RgbImage::from_pixels(2, 1, vec![0xff, 0x00, 0x00, 0x12, 0x34, 0x56]).unwrap();
        let blob = Rgb565Codec.encode(&img).unwrap();
        assert_eq!(blob.len(), 4);
        assert_eq!(&blob[..2], &[0xf8, 0x00]);

        let back = Rgb565Codec.decode(&blob, 2, 1).unwrap();
        assert_eq!(back.pixels[0], 0xff);
        for (a, b) in img.pixels.iter().zip(&back.pixels).skip(3) {
            assert_eq!(a & 0xf0, b & 0xf0);
        }
    }

    #[test]
    fn test_external_codecs_not_supported() {
        assert!(codec_for(Compression::Rgb565).is_ok());
        for c in [Compression::Yuv, Compression::YuvDelta, Compression::Jpeg, Compression::St2205Blocks] {
            assert!(matches!(codec_for(c), Err(FrameError::NotSupported(_))));
        }
        assert_eq!(Compression::YuvDelta.fixed_blob_size(128, 128), Some(12288));
        assert_eq!(Compression::Jpeg.fixed_blob_size(128, 128), None);
    }
}
