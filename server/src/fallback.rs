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

//! Deterministic stand-in frame for ticks where capture fails, so a
//! receiver can tell "server degraded" apart from "server gone".

use crate::capture::RawImage;

pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

// BGRA fill and text colors.
const BACKGROUND: [u8; 4] = [0xC8, 0x50, 0x1E, 0xFF];
const FOREGROUND: [u8; 4] = [0xF5, 0xF5, 0xF5, 0xFF];

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: usize = 7;
const TEXT_SCALE: usize = 2;
const CHAR_ADVANCE: usize = (GLYPH_WIDTH + 1) * TEXT_SCALE;
const LINE_ADVANCE: usize = (GLYPH_HEIGHT + 4) * TEXT_SCALE;

/// Render the fallback frame for the current settings.
pub fn fallback_image(fps: u32, quality_percent: u32, audio_enabled: bool) -> RawImage {
    let width = FALLBACK_WIDTH as usize;
    let height = FALLBACK_HEIGHT as usize;
    let mut pixels = Vec::with_capacity(width * height * 4);
    for _ in 0..width * height {
        pixels.extend_from_slice(&BACKGROUND);
    }

    let lines = [
        "MAC SCREEN MIRRORING".to_owned(),
        format!("FPS: {fps}"),
        format!("QUALITY: {quality_percent}%"),
        format!("AUDIO: {}", if audio_enabled { "ON" } else { "OFF" }),
    ];

    let block_height = lines.len() * LINE_ADVANCE;
    let mut y = (height.saturating_sub(block_height)) / 2;
    for line in &lines {
        let line_width = line.len() * CHAR_ADVANCE;
        let x = (width.saturating_sub(line_width)) / 2;
        draw_text(&mut pixels, width, line, x, y);
        y += LINE_ADVANCE;
    }

    RawImage::packed(FALLBACK_WIDTH, FALLBACK_HEIGHT, pixels)
}

fn draw_text(pixels: &mut [u8], width: usize, text: &str, mut x: usize, y: usize) {
    for c in text.chars() {
        let columns = glyph(c.to_ascii_uppercase());
        for (cx, column) in columns.iter().enumerate() {
            for cy in 0..GLYPH_HEIGHT {
                if column & (1 << cy) == 0 {
                    continue;
                }
                for sy in 0..TEXT_SCALE {
                    for sx in 0..TEXT_SCALE {
                        let px = x + cx * TEXT_SCALE + sx;
                        let py = y + cy * TEXT_SCALE + sy;
                        let offset = (py * width + px) * 4;
                        if offset + 4 <= pixels.len() {
                            pixels[offset..offset + 4].copy_from_slice(&FOREGROUND);
                        }
                    }
                }
            }
        }
        x += CHAR_ADVANCE;
    }
}

/// 5x7 column-major glyphs, LSB at the top row. Only the characters the
/// status lines can contain.
fn glyph(c: char) -> [u8; GLYPH_WIDTH] {
    match c {
        'A' => [0x7E, 0x11, 0x11, 0x11, 0x7E],
        'B' => [0x7F, 0x49, 0x49, 0x49, 0x36],
        'C' => [0x3E, 0x41, 0x41, 0x41, 0x22],
        'D' => [0x7F, 0x41, 0x41, 0x22, 0x1C],
        'E' => [0x7F, 0x49, 0x49, 0x49, 0x41],
        'F' => [0x7F, 0x09, 0x09, 0x09, 0x01],
        'G' => [0x3E, 0x41, 0x49, 0x49, 0x7A],
        'H' => [0x7F, 0x08, 0x08, 0x08, 0x7F],
        'I' => [0x00, 0x41, 0x7F, 0x41, 0x00],
        'J' => [0x20, 0x40, 0x41, 0x3F, 0x01],
        'K' => [0x7F, 0x08, 0x14, 0x22, 0x41],
        'L' => [0x7F, 0x40, 0x40, 0x40, 0x40],
        'M' => [0x7F, 0x02, 0x0C, 0x02, 0x7F],
        'N' => [0x7F, 0x04, 0x08, 0x10, 0x7F],
        'O' => [0x3E, 0x41, 0x41, 0x41, 0x3E],
        'P' => [0x7F, 0x09, 0x09, 0x09, 0x06],
        'Q' => [0x3E, 0x41, 0x51, 0x21, 0x5E],
        'R' => [0x7F, 0x09, 0x19, 0x29, 0x46],
        'S' => [0x46, 0x49, 0x49, 0x49, 0x31],
        'T' => [0x01, 0x01, 0x7F, 0x01, 0x01],
        'U' => [0x3F, 0x40, 0x40, 0x40, 0x3F],
        'V' => [0x1F, 0x20, 0x40, 0x20, 0x1F],
        'W' => [0x3F, 0x40, 0x38, 0x40, 0x3F],
        'X' => [0x63, 0x14, 0x08, 0x14, 0x63],
        'Y' => [0x07, 0x08, 0x70, 0x08, 0x07],
        'Z' => [0x61, 0x51, 0x49, 0x45, 0x43],
        '0' => [0x3E, 0x51, 0x49, 0x45, 0x3E],
        '1' => [0x00, 0x42, 0x7F, 0x40, 0x00],
        '2' => [0x42, 0x61, 0x51, 0x49, 0x46],
        '3' => [0x21, 0x41, 0x45, 0x4B, 0x31],
        '4' => [0x18, 0x14, 0x12, 0x7F, 0x10],
        '5' => [0x27, 0x45, 0x45, 0x45, 0x39],
        '6' => [0x3C, 0x4A, 0x49, 0x49, 0x30],
        '7' => [0x01, 0x71, 0x09, 0x05, 0x03],
        '8' => [0x36, 0x49, 0x49, 0x49, 0x36],
        '9' => [0x06, 0x49, 0x49, 0x29, 0x1E],
        ':' => [0x00, 0x36, 0x36, 0x00, 0x00],
        '%' => [0x23, 0x13, 0x08, 0x64, 0x62],
        '/' => [0x20, 0x10, 0x08, 0x04, 0x02],
        _ => [0x00; GLYPH_WIDTH],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_image(30, 50, true);
        let b = fallback_image(30, 50, true);
        assert_eq!(a.pixels, b.pixels);
        assert_eq!(a.width, FALLBACK_WIDTH);
        assert_eq!(a.height, FALLBACK_HEIGHT);
    }

    #[test]
    fn test_settings_change_the_image() {
        let a = fallback_image(30, 50, true);
        let b = fallback_image(45, 50, true);
        assert_ne!(a.pixels, b.pixels);
    }

    #[test]
    fn test_text_pixels_present() {
        let img = fallback_image(30, 50, false);
        let foreground = img
            .pixels
            .chunks_exact(4)
            .filter(|p| *p == FOREGROUND)
            .count();
        assert!(foreground > 100);
    }
}
