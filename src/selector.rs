use crate::error::{Error, Result};
use crate::quantizer::Quantizer;
use crate::types::{Extraction, FeatureRecord};

/// 为单张图片挑选最有区分度的特征
///
/// 每个特征的得分为 weight[cluster] * response，按得分降序保留前 keep 个，
/// 得分相同时保持提取顺序。
pub fn select_features<const D: usize, Q: Quantizer<D>>(
    extraction: &Extraction<D>,
    quantizer: &Q,
    weights: &[f32],
    keep: usize,
    min_keep: usize,
) -> Result<Vec<FeatureRecord<D>>> {
    if extraction.len() < min_keep {
        return Err(Error::InsufficientFeatures { count: extraction.len(), min: min_keep });
    }

    let clusters = quantizer.assign(&extraction.descriptors);
    let mut features = extraction
        .descriptors
        .iter()
        .zip(&extraction.keypoints)
        .zip(clusters)
        .map(|((descriptor, keypoint), cluster)| FeatureRecord {
            descriptor: *descriptor,
            keypoint: *keypoint,
            score: weights[cluster as usize] * keypoint.response,
            cluster,
        })
        .collect::<Vec<_>>();

    // sort_by 是稳定排序
    features.sort_by(|a, b| b.score.total_cmp(&a.score));
    features.truncate(keep);

    Ok(features)
}
