use std::fs;
use std::path::Path;
use std::thread;

use iconsearch::config::{BuildOptions, SearchOptions};
use iconsearch::types::{Extraction, Keypoint};
use iconsearch::{Database, Error, FeatureExtractor, load, load_or_build, save};
use image::{DynamicImage, GenericImageView, RgbImage};
use rand::prelude::*;
use rand::rngs::StdRng;
use rstest::*;
use tempfile::TempDir;

const DIM: usize = 64;

fn random_extraction(rng: &mut StdRng, n: usize) -> Extraction<DIM> {
    let keypoints = (0..n)
        .map(|_| Keypoint {
            x: rng.random_range(0.0..60.0),
            y: rng.random_range(0.0..60.0),
            size: 4.0,
            response: rng.random_range(0.1..1.0),
            ..Default::default()
        })
        .collect();
    let descriptors = (0..n).map(|_| rng.random()).collect();
    Extraction::new(keypoints, descriptors, (60, 60)).unwrap()
}

/// 对描述符加入很小的扰动
fn perturb(rng: &mut StdRng, descriptors: &[[f32; DIM]]) -> Vec<[f32; DIM]> {
    descriptors
        .iter()
        .map(|d| {
            let mut d = *d;
            d.iter_mut().for_each(|v| *v += rng.random_range(-0.01..0.01));
            d
        })
        .collect()
}

fn options() -> BuildOptions {
    let mut opts = BuildOptions { vocabulary_size: 10, ..Default::default() };
    opts.kmeans.seed = Some(42);
    opts.kmeans.attempts = 3;
    opts
}

#[fixture]
fn catalog() -> Vec<(String, Extraction<DIM>)> {
    let mut rng = StdRng::seed_from_u64(2024);
    ["A", "B", "C"].iter().map(|id| (id.to_string(), random_extraction(&mut rng, 50))).collect()
}

#[fixture]
fn db(catalog: Vec<(String, Extraction<DIM>)>) -> Database<DIM> {
    Database::build(catalog, &options()).unwrap()
}

#[rstest]
fn self_match(catalog: Vec<(String, Extraction<DIM>)>, db: Database<DIM>) {
    for (id, extraction) in &catalog {
        assert_eq!(db.match_descriptors(&extraction.descriptors, 1), vec![id.clone()]);
    }
}

#[rstest]
fn perturbed_query_matches_source(catalog: Vec<(String, Extraction<DIM>)>, db: Database<DIM>) {
    let mut rng = StdRng::seed_from_u64(7);
    let query = perturb(&mut rng, &catalog[0].1.descriptors[..20]);

    let result = db.search(&query, &SearchOptions::default());
    assert_eq!(result.ids(), vec!["A"]);
    assert!(result.matches[0].matches >= 4);
    assert!(result.pool_size > 0 && result.pool_size <= db.num_features());
    assert!(result.relevant_clusters <= db.vocabulary().len());
}

#[rstest]
fn top_n_orders_by_match_count(catalog: Vec<(String, Extraction<DIM>)>, db: Database<DIM>) {
    let mut query = catalog[1].1.descriptors[..30].to_vec();
    query.extend_from_slice(&catalog[2].1.descriptors[..10]);

    let opts = SearchOptions { top_n: 3, ..Default::default() };
    let result = db.search(&query, &opts);
    assert_eq!(result.ids(), vec!["B", "C"]);
    assert!(result.matches[0].matches > result.matches[1].matches);
}

#[rstest]
fn pool_is_limited_to_relevant_clusters(catalog: Vec<(String, Extraction<DIM>)>, db: Database<DIM>) {
    let query = &catalog[0].1.descriptors[..1];
    let result = db.search(query, &SearchOptions::default());
    assert!(result.relevant_clusters <= 2);
    assert!(result.pool_size > 0);
    assert!(result.pool_size < db.num_features());
}

#[rstest]
fn large_vocabulary_with_constant_dimension() {
    let mut rng = StdRng::seed_from_u64(150);
    let catalog: Vec<(String, Extraction<8>)> = (0..20)
        .map(|i| {
            let keypoints = (0..40)
                .map(|_| Keypoint { response: rng.random_range(0.1..1.0), ..Default::default() })
                .collect();
            let descriptors = (0..40)
                .map(|_| {
                    let mut d: [f32; 8] = rng.random();
                    d[0] = 0.0;
                    d
                })
                .collect();
            (format!("icon_{i}"), Extraction::new(keypoints, descriptors, (60, 60)).unwrap())
        })
        .collect();

    let mut opts = BuildOptions { vocabulary_size: 150, ..options() };
    opts.kmeans.attempts = 1;
    opts.kmeans.max_iter = 10;
    let db = Database::build(catalog.clone(), &opts).unwrap();
    assert_eq!(db.vocabulary().len(), 150);
    assert_eq!(db.match_descriptors(&catalog[3].1.descriptors, 1), vec!["icon_3"]);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.db");
    save(&db, &path).unwrap();
    assert_eq!(load::<8>(&path).unwrap(), db);
}

#[rstest]
fn noise_query_is_unmatched(db: Database<DIM>) {
    let mut rng = StdRng::seed_from_u64(99);
    let query: Vec<[f32; DIM]> = (0..20).map(|_| rng.random()).collect();
    assert!(db.match_descriptors(&query, 1).is_empty());
}

#[rstest]
fn empty_query(db: Database<DIM>) {
    let result = db.search(&[], &SearchOptions::default());
    assert!(result.matches.is_empty());
    assert_eq!(result.pool_size, 0);
}

#[rstest]
fn empty_corpus() {
    let result = Database::<DIM>::build(vec![], &options());
    assert!(matches!(result, Err(Error::EmptyCorpus)));
}

#[rstest]
fn zero_vocabulary(catalog: Vec<(String, Extraction<DIM>)>) {
    let opts = BuildOptions { vocabulary_size: 0, ..options() };
    assert!(matches!(Database::build(catalog, &opts), Err(Error::EmptyCorpus)));
}

#[rstest]
fn build_is_deterministic(catalog: Vec<(String, Extraction<DIM>)>, db: Database<DIM>) {
    let again = Database::build(catalog, &options()).unwrap();
    assert_eq!(db, again);
}

#[rstest]
fn features_are_bounded_and_weighted(db: Database<DIM>) {
    let opts = options();
    for image in db.images() {
        assert!(image.features.len() >= opts.min_keep && image.features.len() <= opts.keep);
        for f in &image.features {
            assert_eq!(f.score, db.weights()[f.cluster as usize] * f.keypoint.response);
        }
        assert!(image.features.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[rstest]
fn add_image_keeps_vocabulary(catalog: Vec<(String, Extraction<DIM>)>) {
    let mut catalog = catalog;
    let (c_id, c) = catalog.pop().unwrap();
    let mut db = Database::build(catalog, &options()).unwrap();
    let vocabulary = db.vocabulary().clone();
    let weights = db.weights().to_vec();

    db.add_image(c_id, &c).unwrap();
    assert_eq!(db.len(), 3);
    assert_eq!(db.vocabulary(), &vocabulary);
    assert_eq!(db.weights(), weights.as_slice());
    assert_eq!(db.match_descriptors(&c.descriptors, 1), vec!["C"]);
}

#[rstest]
fn concurrent_queries(catalog: Vec<(String, Extraction<DIM>)>, db: Database<DIM>) {
    let db = &db;
    thread::scope(|s| {
        let handles = catalog
            .iter()
            .map(|(id, extraction)| s.spawn(move || (id, db.match_descriptors(&extraction.descriptors, 1))))
            .collect::<Vec<_>>();
        for handle in handles {
            let (id, result) = handle.join().unwrap();
            assert_eq!(result, vec![id.clone()]);
        }
    });
}

#[rstest]
fn save_and_load(db: Database<DIM>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.db");
    save(&db, &path).unwrap();
    assert!(!dir.path().join("catalog.db.tmp").exists());

    let loaded = load::<DIM>(&path).unwrap();
    assert_eq!(loaded, db);
    assert_eq!(loaded.index().total(), db.index().total());
}

#[rstest]
fn load_rejects_bad_files(db: Database<DIM>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.db");

    assert!(matches!(load::<DIM>(&path), Err(Error::DatabaseLoad { .. })));

    fs::write(&path, b"not a database").unwrap();
    assert!(matches!(load::<DIM>(&path), Err(Error::DatabaseLoad { .. })));

    save(&db, &path).unwrap();
    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, &data).unwrap();
    assert!(matches!(load::<DIM>(&path), Err(Error::DatabaseLoad { .. })));

    save(&db, &path).unwrap();
    let result = load::<32>(&path);
    assert!(matches!(result, Err(Error::DatabaseLoad { reason, .. }) if reason.contains("维度")));
}

/// 根据图片尺寸生成固定的描述符，不读取像素内容，过小的图片没有特征
struct SizeSeededExtractor;

impl FeatureExtractor<DIM> for SizeSeededExtractor {
    fn extract(&self, image: &DynamicImage) -> Extraction<DIM> {
        if image.width() < 40 || image.height() < 40 {
            return Extraction::empty((image.width(), image.height()));
        }
        let mut rng = StdRng::seed_from_u64(image.width() as u64 * 1000 + image.height() as u64);
        let mut extraction = random_extraction(&mut rng, 30);
        extraction.shape = (image.width(), image.height());
        extraction
    }
}

fn write_corpus(dir: &Path) {
    for (name, width) in [("Bash", 41), ("Anchor", 42), ("Vajra", 43)] {
        RgbImage::new(width, 40).save(dir.join(format!("{name}.png"))).unwrap();
    }
    fs::write(dir.join("README.txt"), "not an image").unwrap();
}

#[rstest]
fn load_or_build_rebuilds_corrupt_database() {
    let corpus = TempDir::new().unwrap();
    write_corpus(corpus.path());
    let conf = TempDir::new().unwrap();
    let path = conf.path().join("catalog.db");
    let opts = BuildOptions { vocabulary_size: 5, ..options() };

    let built = load_or_build(corpus.path(), &path, &SizeSeededExtractor, &opts).unwrap();
    assert_eq!(built.len(), 3);
    assert!(path.exists());

    let loaded = load_or_build(corpus.path(), &path, &SizeSeededExtractor, &opts).unwrap();
    assert_eq!(loaded, built);

    fs::write(&path, b"garbage").unwrap();
    let rebuilt = load_or_build(corpus.path(), &path, &SizeSeededExtractor, &opts).unwrap();
    assert_eq!(rebuilt, built);
    assert_eq!(load::<DIM>(&path).unwrap(), built);
}

#[rstest]
fn match_image_in_memory() {
    let corpus = TempDir::new().unwrap();
    write_corpus(corpus.path());
    let conf = TempDir::new().unwrap();
    let opts = BuildOptions { vocabulary_size: 5, ..options() };
    let db = load_or_build(corpus.path(), conf.path().join("catalog.db"), &SizeSeededExtractor, &opts)
        .unwrap();

    let search = SearchOptions::default();
    let image = DynamicImage::ImageRgb8(RgbImage::new(43, 40));
    assert_eq!(db.match_image(&SizeSeededExtractor, &image, &search), vec!["Vajra"]);

    let tiny = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
    assert!(db.match_image(&SizeSeededExtractor, &tiny, &search).is_empty());
}

#[rstest]
fn match_path_degrades_to_empty() {
    let corpus = TempDir::new().unwrap();
    write_corpus(corpus.path());
    let conf = TempDir::new().unwrap();
    let opts = BuildOptions { vocabulary_size: 5, ..options() };
    let db = load_or_build(corpus.path(), conf.path().join("catalog.db"), &SizeSeededExtractor, &opts)
        .unwrap();

    let search = SearchOptions::default();
    let ids = db.match_path(&SizeSeededExtractor, corpus.path().join("Anchor.png"), &search);
    assert_eq!(ids, vec!["Anchor"]);

    let ids = db.match_path(&SizeSeededExtractor, corpus.path().join("missing.png"), &search);
    assert!(ids.is_empty());
    let ids = db.match_path(&SizeSeededExtractor, corpus.path().join("README.txt"), &search);
    assert!(ids.is_empty());
}
