/// 计算两个 D 维向量的欧氏距离平方
#[inline(always)]
pub fn l2_sqr<const D: usize>(va: &[f32; D], vb: &[f32; D]) -> f32 {
    if D % 4 == 0 { l2_sqr_unrolled(va, vb) } else { l2_sqr_naive(va, vb) }
}

#[inline(always)]
pub fn l2_sqr_naive<const D: usize>(va: &[f32; D], vb: &[f32; D]) -> f32 {
    let mut sum = 0.0;
    for i in 0..D {
        let d = va[i] - vb[i];
        sum += d * d;
    }
    sum
}

/// 4 路累加，打破浮点加法的依赖链，方便 LLVM 向量化
#[inline(always)]
pub fn l2_sqr_unrolled<const D: usize>(va: &[f32; D], vb: &[f32; D]) -> f32 {
    let mut acc = [0.0f32; 4];
    for (ca, cb) in va.chunks_exact(4).zip(vb.chunks_exact(4)) {
        for j in 0..4 {
            let d = ca[j] - cb[j];
            acc[j] += d * d;
        }
    }
    let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
    for i in D - D % 4..D {
        let d = va[i] - vb[i];
        sum += d * d;
    }
    sum
}

/// 计算向量 va 与 vb 中每个向量的距离，返回距离最小的 k 个索引和距离平方
///
/// 结果按距离升序排列，距离相同时索引较小的在前
///
/// 参数：
/// - va: 查询向量
/// - vb: 若干个候选向量
/// - k: 返回的最近邻居数量
pub fn knn_l2<const D: usize>(va: &[f32; D], vb: &[[f32; D]], k: usize) -> (Vec<usize>, Vec<f32>) {
    if k == 0 {
        return (vec![], vec![]);
    }
    if k > 8 {
        return knn_l2_sorted(va, vb, k);
    }
    let mut dis = [f32::INFINITY; 8];
    let mut idx = [0; 8];
    for (i, vector) in vb.iter().enumerate() {
        let d = l2_sqr(va, vector);
        if d >= dis[0] {
            continue;
        }
        // 此处维护一个长度为 K 的单调递减数组，最大的元素在前面
        for j in (0..k).rev() {
            if d < dis[j] {
                dis[..=j].rotate_left(1);
                dis[j] = d;
                idx[..=j].rotate_left(1);
                idx[j] = i;
                break;
            }
        }
    }
    idx[..k].iter().zip(dis[..k].iter()).filter(|(_, d)| d.is_finite()).rev().unzip()
}

/// k 较大时计算全部距离后排序
fn knn_l2_sorted<const D: usize>(va: &[f32; D], vb: &[[f32; D]], k: usize) -> (Vec<usize>, Vec<f32>) {
    let mut all = vb
        .iter()
        .enumerate()
        .map(|(i, vector)| (i, l2_sqr(va, vector)))
        .filter(|(_, d)| d.is_finite())
        .collect::<Vec<_>>();
    all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    all.truncate(k);
    all.into_iter().unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_identical() {
        let va = [0.5f32; 16];
        assert_eq!(l2_sqr(&va, &va), 0.0);
    }

    #[test]
    fn test_l2_unrolled_matches_naive() {
        let va: [f32; 7] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let vb: [f32; 7] = [0.0, 2.5, 1.0, 4.0, -5.0, 6.0, 9.0];
        assert_eq!(l2_sqr_unrolled(&va, &vb), l2_sqr_naive(&va, &vb));
        assert_eq!(l2_sqr_naive(&va, &vb), 1.0 + 0.25 + 4.0 + 100.0 + 4.0);

        let va = [1.0f32; 8];
        let vb = [3.0f32; 8];
        assert_eq!(l2_sqr(&va, &vb), 32.0);
    }

    #[test]
    fn test_knn_l2_multiple_vectors() {
        let va = [0.0f32; 4];
        // 距离平方分别为 4, 0, 1
        let vb = [[2.0, 0.0, 0.0, 0.0], [0.0; 4], [0.0, 0.0, 1.0, 0.0]];

        let (ids, dis) = knn_l2(&va, &vb, 3);
        assert_eq!(ids, &[1, 2, 0]);
        assert_eq!(dis, &[0.0, 1.0, 4.0]);

        let (ids, dis) = knn_l2(&va, &vb, 2);
        assert_eq!(ids, &[1, 2]);
        assert_eq!(dis, &[0.0, 1.0]);
    }

    #[test]
    fn test_knn_l2_ties_prefer_lower_index() {
        let va = [0.0f32; 2];
        let vb = [[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]];
        let (ids, _) = knn_l2(&va, &vb, 2);
        assert_eq!(ids, &[0, 1]);
    }

    #[test]
    fn test_knn_l2_k_limit() {
        let va = [0.0f32; 4];
        let vb = [[1.0f32; 4]; 2];
        let (ids, _) = knn_l2(&va, &vb, 5);
        assert_eq!(ids, &[0, 1]);

        let (ids, dis) = knn_l2(&va, &[], 2);
        assert!(ids.is_empty());
        assert!(dis.is_empty());
    }

    #[test]
    fn test_knn_l2_large_k() {
        let va = [0.0f32; 2];
        let vb: Vec<[f32; 2]> = (0..12).map(|i| [(12 - i) as f32, 0.0]).collect();
        let (ids, dis) = knn_l2(&va, &vb, 10);
        assert_eq!(ids, (2..12).rev().collect::<Vec<_>>());
        assert_eq!(dis[0], 1.0);

        let (ids, _) = knn_l2(&va, &vb[..3], 20);
        assert_eq!(ids, &[2, 1, 0]);
    }
}
