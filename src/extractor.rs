use std::path::Path;

use akaze::Akaze;
use image::{DynamicImage, GenericImageView};
use image::imageops::FilterType;
use log::warn;

use crate::config::ExtractOptions;
use crate::error::Result;
use crate::types::{Descriptor, Extraction, Keypoint};

/// AKAZE 二值描述符（64 字节）展开后的维度
pub const AKAZE_DIM: usize = 512;

/// 宽或高小于该值的图片无法构建尺度空间，直接视为没有特征
const MIN_SIDE: u32 = 40;

/// 局部特征提取
pub trait FeatureExtractor<const D: usize>: Sync {
    fn extract(&self, image: &DynamicImage) -> Extraction<D>;

    fn extract_path(&self, path: &Path) -> Result<Extraction<D>> {
        let image = image::open(path)?;
        Ok(self.extract(&image))
    }
}

/// 使用 AKAZE 提取特征，二值描述符展开为 ±1 的实数向量
#[derive(Debug, Clone, Copy)]
pub struct AkazeExtractor {
    akaze: Akaze,
    resize: Option<(u32, u32)>,
}

impl AkazeExtractor {
    pub fn new(threshold: f64, resize: Option<(u32, u32)>) -> Self {
        Self { akaze: Akaze::new(threshold), resize }
    }
}

impl Default for AkazeExtractor {
    fn default() -> Self {
        Self::from(&ExtractOptions::default())
    }
}

impl From<&ExtractOptions> for AkazeExtractor {
    fn from(opts: &ExtractOptions) -> Self {
        Self::new(opts.threshold, opts.resize)
    }
}

impl FeatureExtractor<AKAZE_DIM> for AkazeExtractor {
    fn extract(&self, image: &DynamicImage) -> Extraction<AKAZE_DIM> {
        let shape = (image.width(), image.height());
        let resized;
        let image = match self.resize {
            Some((w, h)) if (w, h) != shape => {
                resized = image.resize_exact(w, h, FilterType::Triangle);
                &resized
            }
            _ => image,
        };
        if image.width() < MIN_SIDE || image.height() < MIN_SIDE {
            return Extraction::empty(shape);
        }

        let (kps, des) = self.akaze.extract(image);
        let keypoints = kps
            .into_iter()
            .map(|kp| Keypoint {
                x: kp.point.0,
                y: kp.point.1,
                size: kp.size,
                angle: kp.angle,
                response: kp.response,
                octave: kp.octave as u32,
            })
            .collect();
        let descriptors = des.iter().map(|d| binary_to_real(&d.bytes)).collect();
        Extraction::new(keypoints, descriptors, shape).unwrap_or_else(|e| {
            warn!("{e}");
            Extraction::empty(shape)
        })
    }
}

/// 将二值向量的每一位展开为 -1 或 1
pub fn binary_to_real<const D: usize>(x_in: &[u8]) -> Descriptor<D> {
    assert_eq!(x_in.len() * 8, D, "binary length does not match dimension");
    let mut v = [0.0; D];
    for (i, v) in v.iter_mut().enumerate() {
        let bit_value = (x_in[i >> 3] >> (i & 7)) & 1;
        *v = (2 * bit_value as i32 - 1) as f32;
    }
    v
}
