use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use image::DynamicImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{BuildOptions, SearchOptions};
use crate::error::{Error, Result};
use crate::extractor::FeatureExtractor;
use crate::invlists::InvertedIndex;
use crate::kmeans::{Clusterer, KMeans, Vocabulary, build_vocabulary};
use crate::matcher::{BruteForceMatcher, DescriptorMatcher, rank, ratio_test};
use crate::quantizer::{KdTreeQuantizer, Quantizer};
use crate::selector::select_features;
use crate::types::{Descriptor, Extraction, ImageEntry};
use crate::weights::{WeightTable, compute_weights};

/// 一次查询的匹配结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    /// 通过比率测试的匹配数量
    pub matches: usize,
    /// 匹配特征的得分之和
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    /// 按相似度降序排列的图片
    pub matches: Vec<Match>,
    /// 查询命中的视觉词数量
    pub relevant_clusters: usize,
    /// 候选特征池大小
    pub pool_size: usize,
}

impl SearchResult {
    pub fn ids(&self) -> Vec<String> {
        self.matches.iter().map(|m| m.id.clone()).collect()
    }
}

/// 图标检索图库
///
/// 视觉词典和权重在构建后不再改变，追加图片只会扩展图片列表和倒排索引。
/// 查询只需要 &self，可以在多个线程中同时进行。
pub struct Database<const D: usize> {
    vocabulary: Vocabulary<D>,
    weights: WeightTable,
    images: Vec<ImageEntry<D>>,
    /// 每张图片最多保留的特征数量
    keep: usize,
    /// 入库图片至少需要的特征数量
    min_keep: usize,
    quantizer: KdTreeQuantizer<D>,
    index: InvertedIndex,
}

impl<const D: usize> Database<D> {
    /// 使用默认的 K-means 从图片特征构建图库
    pub fn build(extractions: Vec<(String, Extraction<D>)>, opts: &BuildOptions) -> Result<Self> {
        Self::build_with(extractions, opts, &KMeans::from(&opts.kmeans))
    }

    /// 从图片特征构建图库
    ///
    /// 特征点不足或者标识重复的图片会被跳过，没有任何可用图片时返回 EmptyCorpus
    pub fn build_with<C: Clusterer<D>>(
        extractions: Vec<(String, Extraction<D>)>,
        opts: &BuildOptions,
        clusterer: &C,
    ) -> Result<Self> {
        let total = extractions.len();
        let mut seen = HashSet::new();
        let extractions: Vec<(String, Extraction<D>)> = extractions
            .into_iter()
            .filter(|(id, extraction)| {
                if extraction.len() < opts.min_keep {
                    warn!("{id} 的特征点不足（{} < {}），跳过", extraction.len(), opts.min_keep);
                    return false;
                }
                if !seen.insert(id.clone()) {
                    warn!("{id} 重复，跳过");
                    return false;
                }
                true
            })
            .collect();
        info!("可用图片：{}/{}", extractions.len(), total);
        if extractions.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let all_descriptors: Vec<Descriptor<D>> =
            extractions.iter().flat_map(|(_, e)| e.descriptors.iter().copied()).collect();
        let vocabulary = build_vocabulary(&all_descriptors, opts.vocabulary_size, clusterer)?;
        drop(all_descriptors);

        let quantizer = KdTreeQuantizer::init(vocabulary.centroids());
        let descriptor_sets: Vec<&[Descriptor<D>]> =
            extractions.iter().map(|(_, e)| e.descriptors.as_slice()).collect();
        let weights = compute_weights(&quantizer, &descriptor_sets);

        let images = extractions
            .par_iter()
            .map(|(id, extraction)| {
                let features = select_features(extraction, &quantizer, &weights, opts.keep, opts.min_keep)?;
                Ok(ImageEntry { id: id.clone(), shape: extraction.shape, features })
            })
            .collect::<Result<Vec<_>>>()?;

        let index = InvertedIndex::build(vocabulary.len(), &images);
        info!("图库构建完成，图片：{}，特征：{}", images.len(), index.total());

        Ok(Self { vocabulary, weights, images, keep: opts.keep, min_keep: opts.min_keep, quantizer, index })
    }

    /// 从已有的数据恢复图库，倒排索引会重新计算
    pub(crate) fn from_parts(
        vocabulary: Vocabulary<D>,
        weights: WeightTable,
        images: Vec<ImageEntry<D>>,
        keep: usize,
        min_keep: usize,
    ) -> Self {
        let quantizer = KdTreeQuantizer::init(vocabulary.centroids());
        let index = InvertedIndex::build(vocabulary.len(), &images);
        Self { vocabulary, weights, images, keep, min_keep, quantizer, index }
    }

    /// 向图库追加一张图片，视觉词典和权重保持不变
    pub fn add_image(&mut self, id: impl Into<String>, extraction: &Extraction<D>) -> Result<()> {
        let id = id.into();
        if self.images.iter().any(|image| image.id == id) {
            return Err(Error::DuplicateImage(id));
        }
        let features = select_features(extraction, &self.quantizer, &self.weights, self.keep, self.min_keep)?;
        let image_no = self.images.len() as u32;
        self.index.add_image(image_no, &features);
        self.images.push(ImageEntry { id, shape: extraction.shape, features });
        Ok(())
    }

    /// 使用暴力匹配在图库中查询
    pub fn search(&self, query: &[Descriptor<D>], opts: &SearchOptions) -> SearchResult {
        self.search_with(query, opts, &BruteForceMatcher)
    }

    pub fn search_with<M: DescriptorMatcher<D>>(
        &self,
        query: &[Descriptor<D>],
        opts: &SearchOptions,
        matcher: &M,
    ) -> SearchResult {
        if query.is_empty() || self.images.is_empty() {
            return SearchResult::default();
        }

        // 查询时每个描述符访问多个视觉词，弥补量化误差
        let relevant: BTreeSet<u32> =
            query.iter().flat_map(|q| self.quantizer.search(q, opts.query_clusters)).collect();
        let pool = self.index.gather(&relevant);
        debug!("相关视觉词：{}，候选特征：{}", relevant.len(), pool.len());
        if pool.is_empty() {
            return SearchResult { relevant_clusters: relevant.len(), ..Default::default() };
        }

        let train: Vec<Descriptor<D>> = pool
            .iter()
            .map(|r| self.images[r.image as usize].features[r.local as usize].descriptor)
            .collect();
        let neighbors = matcher.knn_match(query, &train, 2);

        let good = neighbors.iter().filter_map(|n| ratio_test(n, opts.ratio)).map(|n| {
            let r = pool[n.index];
            (r.image, self.images[r.image as usize].features[r.local as usize].score)
        });

        let matches = rank(good)
            .into_iter()
            .filter(|s| s.matches >= opts.min_matches)
            .take(opts.top_n)
            .map(|s| Match {
                id: self.images[s.image as usize].id.clone(),
                matches: s.matches,
                score: s.score,
            })
            .collect();

        SearchResult { matches, relevant_clusters: relevant.len(), pool_size: pool.len() }
    }

    /// 返回最相似的 top_n 张图片的标识，没有匹配时返回空列表
    pub fn match_descriptors(&self, query: &[Descriptor<D>], top_n: usize) -> Vec<String> {
        let opts = SearchOptions { top_n, ..Default::default() };
        self.search(query, &opts).ids()
    }

    /// 提取图片特征后查询
    pub fn match_image<E: FeatureExtractor<D>>(
        &self,
        extractor: &E,
        image: &DynamicImage,
        opts: &SearchOptions,
    ) -> Vec<String> {
        self.match_extraction(&extractor.extract(image), opts)
    }

    /// 读取图片文件并查询，读取失败时返回空列表
    pub fn match_path<E: FeatureExtractor<D>>(
        &self,
        extractor: &E,
        path: impl AsRef<Path>,
        opts: &SearchOptions,
    ) -> Vec<String> {
        let path = path.as_ref();
        match extractor.extract_path(path) {
            Ok(extraction) => self.match_extraction(&extraction, opts),
            Err(e) => {
                warn!("无法读取图片 {}：{e}", path.display());
                vec![]
            }
        }
    }

    fn match_extraction(&self, extraction: &Extraction<D>, opts: &SearchOptions) -> Vec<String> {
        if extraction.is_empty() {
            warn!("查询图片没有提取到特征");
            return vec![];
        }
        self.search(&extraction.descriptors, opts).ids()
    }

    pub fn vocabulary(&self) -> &Vocabulary<D> {
        &self.vocabulary
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn images(&self) -> &[ImageEntry<D>] {
        &self.images
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// 描述符维度
    pub fn dim(&self) -> usize {
        D
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    pub fn min_keep(&self) -> usize {
        self.min_keep
    }

    /// 图片数量
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// 所有图片保留的特征总数
    pub fn num_features(&self) -> usize {
        self.images.iter().map(|image| image.features.len()).sum()
    }
}

impl<const D: usize> PartialEq for Database<D> {
    fn eq(&self, other: &Self) -> bool {
        self.vocabulary == other.vocabulary
            && self.weights == other.weights
            && self.images == other.images
            && self.keep == other.keep
            && self.min_keep == other.min_keep
    }
}

impl<const D: usize> fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dim", &D)
            .field("vocabulary", &self.vocabulary.len())
            .field("images", &self.images.len())
            .field("features", &self.index.total())
            .finish()
    }
}
