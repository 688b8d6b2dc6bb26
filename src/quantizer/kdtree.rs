use kiddo::SquaredEuclidean;
use kiddo::float::kdtree::KdTree;
use log::warn;

use super::{FlatQuantizer, Quantizer};

/// 叶子节点容量
///
/// 由二值描述符训练出的聚类中心有大量相同的坐标（±1），
/// 同一维度上相同坐标的数量达到桶容量时 kiddo 无法分裂节点
const BUCKET_SIZE: usize = 128;

type CentroidTree<const D: usize> = KdTree<f32, u64, D, BUCKET_SIZE, u32>;

enum Backend<const D: usize> {
    Tree(CentroidTree<D>),
    /// 无法建树时退化为线性扫描
    Linear(FlatQuantizer<D>),
}

/// 基于 k-d 树的量化器
pub struct KdTreeQuantizer<const D: usize> {
    backend: Backend<D>,
    nlist: usize,
}

impl<const D: usize> KdTreeQuantizer<D> {
    /// 是否使用 k-d 树，否则为线性扫描
    pub fn is_tree(&self) -> bool {
        matches!(self.backend, Backend::Tree(_))
    }
}

/// 所有坐标有限，且任一维度上相同取值的中心数量小于桶容量时才能安全建树
fn splittable<const D: usize>(centroids: &[[f32; D]]) -> bool {
    if centroids.len() < BUCKET_SIZE {
        return centroids.iter().flatten().all(|v| v.is_finite());
    }
    let mut column = Vec::with_capacity(centroids.len());
    for dim in 0..D {
        column.clear();
        column.extend(centroids.iter().map(|c| c[dim]));
        if column.iter().any(|v| !v.is_finite()) {
            return false;
        }
        column.sort_by(f32::total_cmp);
        let max_run = column.chunk_by(|a, b| a == b).map(<[f32]>::len).max().unwrap_or(0);
        if max_run >= BUCKET_SIZE {
            return false;
        }
    }
    true
}

impl<const D: usize> Quantizer<D> for KdTreeQuantizer<D> {
    fn init(centroids: &[[f32; D]]) -> Self {
        let nlist = centroids.len();
        if !splittable(centroids) {
            warn!("聚类中心存在大量重复坐标，量化器改用线性扫描");
            return Self { backend: Backend::Linear(FlatQuantizer::init(centroids)), nlist };
        }
        let mut tree = CentroidTree::<D>::with_capacity(nlist);
        for (i, centroid) in centroids.iter().enumerate() {
            tree.add(centroid, i as u64);
        }
        Self { backend: Backend::Tree(tree), nlist }
    }

    fn nlist(&self) -> usize {
        self.nlist
    }

    fn search(&self, x: &[f32; D], k: usize) -> Vec<u32> {
        let tree = match &self.backend {
            Backend::Tree(tree) => tree,
            Backend::Linear(flat) => return flat.search(x, k),
        };
        let k = k.min(self.nlist);
        if k == 0 {
            return vec![];
        }
        let mut result = tree.nearest_n::<SquaredEuclidean>(x, k);
        // 距离相同时序号小的在前，与线性扫描保持一致
        result.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.item.cmp(&b.item)));
        result.into_iter().map(|r| r.item as u32).collect()
    }
}
