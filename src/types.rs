use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// D 维的局部特征描述符
pub type Descriptor<const D: usize> = [f32; D];

/// 特征点的位置、尺度、方向和响应强度
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 特征点尺度（直径，像素）
    pub size: f32,
    /// 方向角
    pub angle: f32,
    /// 检测器响应强度，用于特征评分
    pub response: f32,
    /// 所在金字塔层
    pub octave: u32,
}

/// 一张图片的特征提取结果，keypoints 和 descriptors 一一对应
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<const D: usize> {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor<D>>,
    /// 原图尺寸 (宽, 高)
    pub shape: (u32, u32),
}

impl<const D: usize> Extraction<D> {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<Descriptor<D>>, shape: (u32, u32)) -> Result<Self> {
        if keypoints.len() != descriptors.len() {
            return Err(Error::FeatureCountMismatch { keypoints: keypoints.len(), descriptors: descriptors.len() });
        }
        Ok(Self { keypoints, descriptors, shape })
    }

    pub fn empty(shape: (u32, u32)) -> Self {
        Self { keypoints: vec![], descriptors: vec![], shape }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// 入库图片保留下来的单个特征
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord<const D: usize> {
    pub descriptor: Descriptor<D>,
    pub keypoint: Keypoint,
    /// weight[cluster] * response
    pub score: f32,
    /// 最近的视觉词，构建倒排索引时使用
    pub cluster: u32,
}

/// 图库中的一张图片
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry<const D: usize> {
    /// 图片标识，通常为去掉扩展名的文件名
    pub id: String,
    /// 原图尺寸 (宽, 高)，仅作参考
    pub shape: (u32, u32),
    pub features: Vec<FeatureRecord<D>>,
}
