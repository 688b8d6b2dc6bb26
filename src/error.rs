use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// 没有任何描述符可用于构建视觉词典，或者 K 为 0
    #[error("语料库为空，无法构建视觉词典")]
    EmptyCorpus,

    #[error("视觉词数量 {k} 超过了描述符数量 {n}")]
    VocabularyTooLarge { k: usize, n: usize },

    /// 单张图片的特征点不足，调用方应当跳过该图片
    #[error("特征点不足：{count} < {min}")]
    InsufficientFeatures { count: usize, min: usize },

    #[error("特征点数量 {keypoints} 与描述符数量 {descriptors} 不一致")]
    FeatureCountMismatch { keypoints: usize, descriptors: usize },

    #[error("图片已存在：{0}")]
    DuplicateImage(String),

    /// 数据库文件缺失或损坏，调用方应当重新构建
    #[error("无法加载数据库 {}：{reason}", path.display())]
    DatabaseLoad { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DatabaseLoad { path: path.into(), reason: reason.to_string() }
    }
}
