use std::collections::BTreeSet;

use crate::kmeans::imbalance_factor;
use crate::types::{FeatureRecord, ImageEntry};

/// 倒排表中的一个元素，指向某张图片的某个特征
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureRef {
    /// 图片在图库中的序号
    pub image: u32,
    /// 特征在该图片特征列表中的序号
    pub local: u32,
}

/// 视觉词到特征的倒排索引
///
/// 由图片的 cluster 缓存推导而来，不需要持久化
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvertedIndex {
    lists: Vec<Vec<FeatureRef>>,
}

impl InvertedIndex {
    pub fn new(nlist: usize) -> Self {
        Self { lists: vec![vec![]; nlist] }
    }

    /// 从图库中的全部图片构建倒排索引
    pub fn build<const D: usize>(nlist: usize, images: &[ImageEntry<D>]) -> Self {
        let mut index = Self::new(nlist);
        for (image_no, image) in images.iter().enumerate() {
            index.add_image(image_no as u32, &image.features);
        }
        index
    }

    /// 返回倒排表的列表数量
    pub fn nlist(&self) -> usize {
        self.lists.len()
    }

    /// 往倒排表中追加一张图片的全部特征
    pub fn add_image<const D: usize>(&mut self, image_no: u32, features: &[FeatureRecord<D>]) {
        for (local, feature) in features.iter().enumerate() {
            self.lists[feature.cluster as usize].push(FeatureRef { image: image_no, local: local as u32 });
        }
    }

    /// 返回指定倒排表的元素数量
    pub fn list_len(&self, list_no: u32) -> usize {
        self.lists[list_no as usize].len()
    }

    pub fn get_list(&self, list_no: u32) -> &[FeatureRef] {
        &self.lists[list_no as usize]
    }

    /// 返回倒排表中元素的总数
    pub fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// 包含任意一个指定视觉词的图片
    pub fn candidates(&self, cluster_ids: &BTreeSet<u32>) -> BTreeSet<u32> {
        cluster_ids
            .iter()
            .flat_map(|&c| self.get_list(c))
            .map(|r| r.image)
            .collect()
    }

    /// 收集指定视觉词下的所有特征，作为候选特征池
    ///
    /// 结果按 (图片, 特征) 排序，与视觉词的遍历顺序无关
    pub fn gather(&self, cluster_ids: &BTreeSet<u32>) -> Vec<FeatureRef> {
        let mut pool: Vec<FeatureRef> =
            cluster_ids.iter().flat_map(|&c| self.get_list(c)).copied().collect();
        pool.sort_unstable();
        pool
    }

    /// 倒排表的不平衡度，1 表示完全均衡
    pub fn imbalance(&self) -> f32 {
        let hist: Vec<usize> = self.lists.iter().map(Vec::len).collect();
        imbalance_factor(&hist)
    }
}
