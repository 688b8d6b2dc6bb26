use super::Quantizer;
use crate::distance::knn_l2;

/// 线性扫描所有聚类中心的量化器
pub struct FlatQuantizer<const D: usize> {
    centroids: Vec<[f32; D]>,
}

impl<const D: usize> Quantizer<D> for FlatQuantizer<D> {
    fn init(centroids: &[[f32; D]]) -> Self {
        Self { centroids: centroids.to_vec() }
    }

    fn nlist(&self) -> usize {
        self.centroids.len()
    }

    fn search(&self, x: &[f32; D], k: usize) -> Vec<u32> {
        knn_l2(x, &self.centroids, k).0.into_iter().map(|i| i as u32).collect()
    }
}
