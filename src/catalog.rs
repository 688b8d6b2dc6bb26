use std::io;
use std::path::{Path, PathBuf};

use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use rayon::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::Result;
use crate::extractor::FeatureExtractor;
use crate::types::Extraction;
use crate::utils::{pb_style, suffix_regex};

/// 扫描目录下所有后缀名匹配的图片，按路径排序
pub fn scan_corpus(dir: &Path, suffix: &Regex) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} 不是目录", dir.display())).into());
    }
    let mut entries = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("扫描目录出错：{e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| suffix.is_match(&ext.to_string_lossy())))
        .collect::<Vec<_>>();
    entries.sort();
    info!("扫描完成，共 {} 张图片", entries.len());
    Ok(entries)
}

/// 图片标识：去掉扩展名的文件名
pub fn image_id(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// 并行提取图片特征，无法读取的图片会被跳过
pub fn extract_images<const D: usize, E: FeatureExtractor<D>>(
    paths: &[PathBuf],
    extractor: &E,
) -> Vec<(String, Extraction<D>)> {
    let pb = ProgressBar::new(paths.len() as u64).with_style(pb_style());
    let result = paths
        .par_iter()
        .progress_with(pb.clone())
        .filter_map(|path| match extractor.extract_path(path) {
            Ok(extraction) => Some((image_id(path), extraction)),
            Err(e) => {
                pb.suspend(|| warn!("无法读取图片 {}：{e}", path.display()));
                None
            }
        })
        .collect::<Vec<_>>();
    pb.finish_with_message("特征提取完成");
    result
}

/// 扫描图片目录并提取全部图片的特征
pub fn extract_corpus<const D: usize, E: FeatureExtractor<D>>(
    dir: &Path,
    suffix: &str,
    extractor: &E,
) -> Result<Vec<(String, Extraction<D>)>> {
    let paths = scan_corpus(dir, &suffix_regex(suffix))?;
    Ok(extract_images(&paths, extractor))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_scan_corpus() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("relics")).unwrap();
        for name in ["b.png", "a.JPG", "relics/c.jpeg", "notes.txt", "d.png.bak"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let paths = scan_corpus(dir.path(), &suffix_regex("png,jpg,jpeg")).unwrap();
        let ids: Vec<String> = paths.iter().map(|p| image_id(p)).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scan_corpus_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(scan_corpus(&dir.path().join("missing"), &suffix_regex("png")).is_err());
    }

    #[test]
    fn test_image_id() {
        assert_eq!(image_id(Path::new("/cards/Bash.png")), "Bash");
        assert_eq!(image_id(Path::new("Burning Blood.v2.jpg")), "Burning Blood.v2");
    }
}
