use log::{debug, info};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::KMeansOptions;
use crate::distance::l2_sqr;
use crate::error::{Error, Result};
use crate::types::Descriptor;

/// 聚类能力：把一组向量聚成 k 个中心
pub trait Clusterer<const D: usize> {
    fn cluster(&self, x: &[[f32; D]], k: usize) -> Result<ClusterState<D>>;
}

#[derive(Debug, Clone, Default)]
pub struct ClusterState<const D: usize> {
    /// 所有向量到所属聚类中心的距离平方和
    pub compactness: f32,
    /// 聚类中心
    pub centroids: Vec<[f32; D]>,
    /// 每个聚类中心包含的向量数量
    pub centroid_frequency: Vec<usize>,
}

/// 视觉词典，构建完成后只读
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary<const D: usize> {
    centroids: Vec<Descriptor<D>>,
}

impl<const D: usize> Vocabulary<D> {
    pub fn new(centroids: Vec<Descriptor<D>>) -> Self {
        Self { centroids }
    }

    /// 视觉词数量 K
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn centroids(&self) -> &[Descriptor<D>] {
        &self.centroids
    }
}

/// 使用全部训练描述符构建视觉词典
pub fn build_vocabulary<const D: usize, C: Clusterer<D>>(
    all_descriptors: &[Descriptor<D>],
    k: usize,
    clusterer: &C,
) -> Result<Vocabulary<D>> {
    if all_descriptors.is_empty() || k == 0 {
        return Err(Error::EmptyCorpus);
    }
    if k > all_descriptors.len() {
        return Err(Error::VocabularyTooLarge { k, n: all_descriptors.len() });
    }
    info!("对 {} 个描述符进行聚类，视觉词数量 = {k}", all_descriptors.len());
    let state = clusterer.cluster(all_descriptors, k)?;
    info!(
        "聚类完成，紧致度：{:.2}，不平衡度：{:.2}",
        state.compactness,
        imbalance_factor(&state.centroid_frequency)
    );
    Ok(Vocabulary::new(state.centroids))
}

/// Lloyd K-means，多次随机初始化，保留紧致度最小的结果
#[derive(Debug, Clone)]
pub struct KMeans {
    pub max_iter: usize,
    /// 聚类中心最大位移小于该值时认为收敛
    pub epsilon: f32,
    pub attempts: usize,
    pub seed: Option<u64>,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::from(&KMeansOptions::default())
    }
}

impl From<&KMeansOptions> for KMeans {
    fn from(opts: &KMeansOptions) -> Self {
        Self {
            max_iter: opts.max_iter,
            epsilon: opts.epsilon,
            attempts: opts.attempts.max(1),
            seed: opts.seed,
        }
    }
}

impl<const D: usize> Clusterer<D> for KMeans {
    fn cluster(&self, x: &[[f32; D]], k: usize) -> Result<ClusterState<D>> {
        if x.is_empty() || k == 0 {
            return Err(Error::EmptyCorpus);
        }
        if k > x.len() {
            return Err(Error::VocabularyTooLarge { k, n: x.len() });
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let mut best: Option<ClusterState<D>> = None;
        for attempt in 0..self.attempts {
            let state = self.lloyd(x, k, &mut rng);
            debug!("第 {} 次尝试，紧致度：{:.4}", attempt + 1, state.compactness);
            if best.as_ref().is_none_or(|b| state.compactness < b.compactness) {
                best = Some(state);
            }
        }

        // attempts 至少为 1
        Ok(best.unwrap_or_default())
    }
}

impl KMeans {
    fn lloyd<const D: usize>(&self, x: &[[f32; D]], k: usize, rng: &mut StdRng) -> ClusterState<D> {
        // 随机选择 k 个不同的样本作为初始中心
        let mut centroids: Vec<[f32; D]> =
            rand::seq::index::sample(rng, x.len(), k).into_iter().map(|i| x[i]).collect();

        let max_shift_sqr = self.epsilon * self.epsilon;

        for iter in 0..self.max_iter {
            let (assignments, distances) = update_assignments(x, &centroids);
            let (new_centroids, _) = update_centroids(x, &assignments, &distances, k);

            let shift = centroids
                .iter()
                .zip(&new_centroids)
                .map(|(a, b)| l2_sqr(a, b))
                .fold(0.0f32, f32::max);
            centroids = new_centroids;

            if shift <= max_shift_sqr {
                debug!("第 {} 轮收敛，最大位移：{:.4}", iter + 1, shift.sqrt());
                break;
            }
        }

        // 用最终的中心重新分配一次，使紧致度与中心对应
        let (assignments, distances) = update_assignments(x, &centroids);
        let mut centroid_frequency = vec![0; k];
        for &a in &assignments {
            centroid_frequency[a] += 1;
        }
        let compactness = distances.iter().sum();

        ClusterState { compactness, centroids, centroid_frequency }
    }
}

/// 将每个点分配给最近的聚类中心，返回聚类中心的序号和距离平方
fn update_assignments<const D: usize>(
    data: &[[f32; D]],
    centroids: &[[f32; D]],
) -> (Vec<usize>, Vec<f32>) {
    data.par_iter()
        .map(|point| {
            let mut min_distance = f32::INFINITY;
            let mut best_cluster = 0;

            for (j, centroid) in centroids.iter().enumerate() {
                let distance = l2_sqr(point, centroid);
                if distance < min_distance {
                    min_distance = distance;
                    best_cluster = j;
                }
            }

            (best_cluster, min_distance)
        })
        .unzip()
}

/// 计算新的聚类中心，空的聚类使用距离自身中心最远的点重新初始化
fn update_centroids<const D: usize>(
    data: &[[f32; D]],
    assignments: &[usize],
    distances: &[f32],
    k: usize,
) -> (Vec<[f32; D]>, Vec<usize>) {
    let mut sums = vec![[0.0f64; D]; k];
    let mut counts = vec![0usize; k];
    for (point, &a) in data.iter().zip(assignments) {
        counts[a] += 1;
        for (s, v) in sums[a].iter_mut().zip(point) {
            *s += *v as f64;
        }
    }

    let mut centroids: Vec<[f32; D]> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &count)| {
            let mut c = [0.0f32; D];
            if count > 0 {
                for (c, s) in c.iter_mut().zip(sum) {
                    *c = (*s / count as f64) as f32;
                }
            }
            c
        })
        .collect();

    let empty = counts.iter().filter(|&&c| c == 0).count();
    if empty > 0 {
        // 按距离从远到近挑选离群点，不会重复使用同一个点
        let mut order: Vec<usize> = (0..data.len()).collect();
        order.sort_by(|&a, &b| distances[b].total_cmp(&distances[a]).then(a.cmp(&b)));
        let mut far = order.into_iter();
        for cluster in 0..k {
            if counts[cluster] == 0 {
                if let Some(i) = far.next() {
                    centroids[cluster] = data[i];
                    counts[cluster] = 1;
                }
            }
        }
    }

    (centroids, counts)
}

/// 计算聚类的不平衡度，1 表示完全均衡
pub fn imbalance_factor(hist: &[usize]) -> f32 {
    let (mut tot, mut uf) = (0.0, 0.0);
    for h in hist {
        let h = *h as f32;
        tot += h;
        uf += h.powf(2.0);
    }
    if tot == 0.0 {
        return 0.0;
    }
    uf * hist.len() as f32 / tot.powf(2.0)
}
