use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::distance::knn_l2;
use crate::types::Descriptor;

/// 候选特征池中的一个近邻
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 在候选特征池中的序号
    pub index: usize,
    /// 欧氏距离
    pub distance: f32,
}

/// 描述符近邻匹配
pub trait DescriptorMatcher<const D: usize>: Sync {
    /// 为每个查询描述符在 train 中查找 k 个最近邻，按距离升序返回
    fn knn_match(&self, query: &[Descriptor<D>], train: &[Descriptor<D>], k: usize) -> Vec<Vec<Neighbor>>;
}

/// 暴力匹配，查询描述符之间并行
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl<const D: usize> DescriptorMatcher<D> for BruteForceMatcher {
    fn knn_match(&self, query: &[Descriptor<D>], train: &[Descriptor<D>], k: usize) -> Vec<Vec<Neighbor>> {
        query
            .par_iter()
            .map(|q| {
                let (ids, dis) = knn_l2(q, train, k);
                ids.into_iter()
                    .zip(dis)
                    .map(|(index, d)| Neighbor { index, distance: d.sqrt() })
                    .collect()
            })
            .collect()
    }
}

/// Lowe 比率测试：最近邻明显优于次近邻时返回最近邻
///
/// 近邻不足两个时无法判断，视为不通过
pub fn ratio_test(neighbors: &[Neighbor], ratio: f32) -> Option<Neighbor> {
    match neighbors {
        [best, second, ..] if best.distance < ratio * second.distance => Some(*best),
        _ => None,
    }
}

/// 单张图片的匹配统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageScore {
    /// 图片在图库中的序号
    pub image: u32,
    /// 通过比率测试的匹配数量
    pub matches: usize,
    /// 匹配特征的得分之和
    pub score: f32,
}

/// 按图片累计匹配数量和得分，并排序
///
/// 排序规则：匹配数量降序，得分降序，图片入库顺序升序
pub fn rank(good: impl IntoIterator<Item = (u32, f32)>) -> Vec<ImageScore> {
    let mut acc: BTreeMap<u32, (usize, f32)> = BTreeMap::new();
    for (image, score) in good {
        let entry = acc.entry(image).or_default();
        entry.0 += 1;
        entry.1 += score;
    }

    let mut result: Vec<ImageScore> = acc
        .into_iter()
        .map(|(image, (matches, score))| ImageScore { image, matches, score })
        .collect();
    result.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then(b.score.total_cmp(&a.score))
            .then(a.image.cmp(&b.image))
    });
    result
}
