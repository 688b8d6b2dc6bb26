use std::collections::BTreeSet;

use log::debug;
use rayon::prelude::*;

use crate::quantizer::Quantizer;
use crate::types::Descriptor;

/// 视觉词的 IDF 权重，长度为 K
pub type WeightTable = Vec<f32>;

/// 根据每张图片的描述符计算视觉词的 IDF 权重
///
/// weight[c] = ln(N / df[c])，df[c] 为包含视觉词 c 的图片数量，为 0 时按 1 计算
pub fn compute_weights<const D: usize, Q, S>(quantizer: &Q, images: &[S]) -> WeightTable
where
    Q: Quantizer<D>,
    S: AsRef<[Descriptor<D>]> + Sync,
{
    let nlist = quantizer.nlist();
    let n_images = images.len() as f32;

    let df = images
        .par_iter()
        .map(|descriptors| {
            // 同一张图片中的视觉词只计数一次
            let words: BTreeSet<u32> = quantizer.assign(descriptors.as_ref()).into_iter().collect();
            let mut df = vec![0u32; nlist];
            for w in words {
                df[w as usize] += 1;
            }
            df
        })
        .reduce(
            || vec![0u32; nlist],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(a, b)| *a += b);
                a
            },
        );

    debug!("文档频率：{df:?}");

    df.into_iter().map(|df| (n_images / df.max(1) as f32).ln()).collect()
}
