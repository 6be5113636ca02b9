//! 纹理解码
//!
//! - 根据原始通道数选择 RGB 或 RGBA 格式
//! - 可选垂直翻转（OpenGL 风格的纹理坐标需要）

use image::{DynamicImage, GenericImageView};

use crate::platform::{DecodeError, TextureDecoder};
use super::Texture;

/// 基于 `image` 的 PNG / JPEG 解码
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageTextureDecoder {
    pub flip_vertical: bool,
}

impl ImageTextureDecoder {
    pub fn flipped() -> Self {
        Self { flip_vertical: true }
    }
}

impl TextureDecoder for ImageTextureDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Texture, DecodeError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| DecodeError(format!("Failed to load texture from memory: {}", e)))?;

        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError("texture has zero size".to_string()));
        }
        let has_alpha = has_alpha_channel(&img);

        let data = if has_alpha {
            let rgba = img.to_rgba8();
            if self.flip_vertical {
                image::imageops::flip_vertical(&rgba).into_raw()
            } else {
                rgba.into_raw()
            }
        } else {
            let rgb = img.to_rgb8();
            if self.flip_vertical {
                image::imageops::flip_vertical(&rgb).into_raw()
            } else {
                rgb.into_raw()
            }
        };

        Ok(Texture::new(width, height, data, has_alpha))
    }
}

/// 检查图片是否有透明通道
fn has_alpha_channel(img: &DynamicImage) -> bool {
    matches!(
        img,
        DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageRgba16(_)
            | DynamicImage::ImageRgba32F(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_)
    )
}
