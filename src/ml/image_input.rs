//! 画像バイト列のデコードと正規化

use anyhow::{Context, Result};
use image::{imageops::FilterType, RgbImage};

/// ImageNetの平均と標準偏差
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// バイト列をデコードして `size`x`size` のRGB画像にする
pub fn decode_rgb(image_bytes: &[u8], size: u32) -> Result<RgbImage> {
    let img = image::load_from_memory(image_bytes).context("Failed to decode image bytes")?;
    Ok(img.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}

/// 画像をデコードし、ImageNetの平均と標準偏差で正規化する
///
/// # 戻り値
/// - (C, H, W) の順で平坦化した値
pub fn load_and_normalize_bytes(image_bytes: &[u8], size: u32) -> Result<Vec<f32>> {
    let img = decode_rgb(image_bytes, size)?;
    let (width, height) = img.dimensions();

    let mut data = Vec::with_capacity(3 * (width * height) as usize);
    for channel in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x, y);
                let value = pixel[channel] as f32 / 255.0;
                data.push((value - MEAN[channel]) / STD[channel]);
            }
        }
    }

    Ok(data)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    /// 単色のPNGを作る
    pub fn solid_png(rgb: [u8; 3], size: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(size, size, image::Rgb(rgb));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }
}
