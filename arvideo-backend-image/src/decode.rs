use std::path::Path;

use bytes::Bytes;
use image::imageops::FilterType;
use image::DynamicImage;

use arvideo_core::error::{Result, VideoError};
use arvideo_core::pixel_format::PixelFormat;

/// Image 后端能直接产生的格式
pub const SUPPORTED_FORMATS: [PixelFormat; 7] = [
    PixelFormat::Rgb,
    PixelFormat::Bgr,
    PixelFormat::Rgba,
    PixelFormat::Bgra,
    PixelFormat::Abgr,
    PixelFormat::Argb,
    PixelFormat::Mono,
];

pub fn is_supported(format: PixelFormat) -> bool {
    SUPPORTED_FORMATS.contains(&format)
}

/// 解码文件
pub fn load(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| {
        VideoError::BackendInitFailed(format!("Image: unable to load '{}': {}", path.display(), e))
    })
}

/// 缩放 (尺寸不同时) 并转换为目标像素格式
pub fn convert(img: &DynamicImage, width: u32, height: u32, format: PixelFormat) -> Result<Bytes> {
    let resized;
    let img = if img.width() != width || img.height() != height {
        resized = img.resize_exact(width, height, FilterType::Triangle);
        &resized
    } else {
        img
    };

    let data = match format {
        PixelFormat::Rgb => img.to_rgb8().into_raw(),
        PixelFormat::Mono => img.to_luma8().into_raw(),
        PixelFormat::Rgba => img.to_rgba8().into_raw(),
        PixelFormat::Bgr => swizzle(&img.to_rgb8().into_raw(), 3, |p| [p[2], p[1], p[0]]),
        PixelFormat::Bgra => swizzle(&img.to_rgba8().into_raw(), 4, |p| [p[2], p[1], p[0], p[3]]),
        PixelFormat::Abgr => swizzle(&img.to_rgba8().into_raw(), 4, |p| [p[3], p[2], p[1], p[0]]),
        PixelFormat::Argb => swizzle(&img.to_rgba8().into_raw(), 4, |p| [p[3], p[0], p[1], p[2]]),
        other => {
            return Err(VideoError::BackendInitFailed(format!(
                "Image: pixel format {} is not supported",
                other
            )))
        }
    };
    Ok(Bytes::from(data))
}

fn swizzle<const N: usize>(src: &[u8], step: usize, f: impl Fn(&[u8]) -> [u8; N]) -> Vec<u8> {
    src.chunks_exact(step).flat_map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn one_pixel() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4])))
    }

    #[test]
    fn channel_orders() {
        let img = one_pixel();
        assert_eq!(&convert(&img, 1, 1, PixelFormat::Rgb).unwrap()[..], &[1, 2, 3]);
        assert_eq!(&convert(&img, 1, 1, PixelFormat::Bgr).unwrap()[..], &[3, 2, 1]);
        assert_eq!(&convert(&img, 1, 1, PixelFormat::Bgra).unwrap()[..], &[3, 2, 1, 4]);
        assert_eq!(&convert(&img, 1, 1, PixelFormat::Abgr).unwrap()[..], &[4, 3, 2, 1]);
        assert_eq!(&convert(&img, 1, 1, PixelFormat::Argb).unwrap()[..], &[4, 1, 2, 3]);
    }

    #[test]
    fn resizes_to_requested_geometry() {
        let out = convert(&one_pixel(), 4, 2, PixelFormat::Mono).unwrap();
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn planar_formats_are_rejected() {
        assert!(convert(&one_pixel(), 2, 2, PixelFormat::Nv21).is_err());
        assert!(!is_supported(PixelFormat::Yuv420f));
    }
}
