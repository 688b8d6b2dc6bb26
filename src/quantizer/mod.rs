mod flat;
mod kdtree;

pub use flat::FlatQuantizer;
pub use kdtree::KdTreeQuantizer;

/// 适用于 D 维实数向量的量化器，负责查找最近的聚类中心（视觉词）
pub trait Quantizer<const D: usize>: Sync {
    /// 使用训练好的聚类中心初始化量化器，中心的序号即为视觉词 ID
    fn init(centroids: &[[f32; D]]) -> Self
    where
        Self: Sized;

    /// 聚类中心数量
    fn nlist(&self) -> usize;

    /// 搜索距离 x 最近的 k 个聚类中心，按距离升序返回
    /// 返回数量为 min(k, nlist)
    fn search(&self, x: &[f32; D], k: usize) -> Vec<u32>;

    /// 为每个向量分配最近的聚类中心
    fn assign(&self, x: &[[f32; D]]) -> Vec<u32> {
        x.iter().map(|v| self.search(v, 1).first().copied().unwrap_or(0)).collect()
    }
}
