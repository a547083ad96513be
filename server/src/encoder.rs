// Copyright (C) 2026 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of MacMirror.
//
// MacMirror is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MacMirror is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with MacMirror.  If not, see <https://www.gnu.org/licenses/>.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use log::warn;
use std::io::Cursor;

use crate::capture::RawImage;

/// The image compressor seam. An empty return value means the frame
/// could not be encoded and must be dropped.
pub trait ImageEncoder: Send + Sync {
    fn encode_jpeg(&self, image: &RawImage, quality: f32) -> Vec<u8>;
}

/// JPEG compression via the `image` crate.
pub struct JpegCompressor;

impl ImageEncoder for JpegCompressor {
    fn encode_jpeg(&self, image: &RawImage, quality: f32) -> Vec<u8> {
        if image.width == 0 || image.height == 0 {
            return Vec::new();
        }
        let rgb = bgra_to_rgb(image);
        let Some(img) = RgbImage::from_raw(image.width, image.height, rgb) else {
            warn!(
                "Refusing to encode image with inconsistent dimensions {}x{}",
                image.width, image.height
            );
            return Vec::new();
        };

        let q = (quality * 100.0).clamp(1.0, 100.0) as u8;
        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, q);
        match img.write_with_encoder(encoder) {
            Ok(()) => buf.into_inner(),
            Err(err) => {
                warn!("JPEG encode failed: {err}");
                Vec::new()
            }
        }
    }
}

fn bgra_to_rgb(image: &RawImage) -> Vec<u8> {
    let width = image.width as usize;
    let height = image.height as usize;
    let mut rgb = Vec::with_capacity(width * height * 3);

    for y in 0..height {
        let row = y * image.stride;
        for x in 0..width {
            let offset = row + x * 4;
            if offset + 2 < image.pixels.len() {
                rgb.push(image.pixels[offset + 2]);
                rgb.push(image.pixels[offset + 1]);
                rgb.push(image.pixels[offset]);
            } else {
                rgb.extend_from_slice(&[0, 0, 0]);
            }
        }
    }

    rgb
}
