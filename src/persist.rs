use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::extract_corpus;
use crate::config::BuildOptions;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::extractor::FeatureExtractor;
use crate::kmeans::Vocabulary;
use crate::types::{Descriptor, FeatureRecord, ImageEntry, Keypoint};

const MAGIC: &[u8; 8] = b"ICONSRCH";
const VERSION: u32 = 1;
const HEADER_LEN: usize = MAGIC.len() + 4 + blake3::OUT_LEN;

/// 图库文件的内容，描述符均展平存储
#[derive(Serialize, Deserialize)]
struct StoredDatabase {
    dim: u32,
    keep: u64,
    min_keep: u64,
    /// K * dim
    centroids: Vec<f32>,
    weights: Vec<f32>,
    images: Vec<StoredImage>,
}

#[derive(Serialize, Deserialize)]
struct StoredImage {
    id: String,
    shape: (u32, u32),
    /// n * dim
    descriptors: Vec<f32>,
    keypoints: Vec<Keypoint>,
    scores: Vec<f32>,
    clusters: Vec<u32>,
}

impl<const D: usize> From<&Database<D>> for StoredDatabase {
    fn from(db: &Database<D>) -> Self {
        let images = db
            .images()
            .iter()
            .map(|image| StoredImage {
                id: image.id.clone(),
                shape: image.shape,
                descriptors: image.features.iter().flat_map(|f| f.descriptor).collect(),
                keypoints: image.features.iter().map(|f| f.keypoint).collect(),
                scores: image.features.iter().map(|f| f.score).collect(),
                clusters: image.features.iter().map(|f| f.cluster).collect(),
            })
            .collect();
        Self {
            dim: D as u32,
            keep: db.keep() as u64,
            min_keep: db.min_keep() as u64,
            centroids: db.vocabulary().centroids().as_flattened().to_vec(),
            weights: db.weights().to_vec(),
            images,
        }
    }
}

fn unflatten<const D: usize>(data: &[f32]) -> Option<Vec<Descriptor<D>>> {
    if data.len() % D != 0 {
        return None;
    }
    data.chunks_exact(D).map(|chunk| chunk.try_into().ok()).collect()
}

impl StoredDatabase {
    /// 校验数据的一致性并还原图库，失败时返回原因
    fn restore<const D: usize>(self) -> std::result::Result<Database<D>, String> {
        if self.dim as usize != D {
            return Err(format!("描述符维度不匹配：{} != {D}", self.dim));
        }
        let centroids = unflatten::<D>(&self.centroids).ok_or("聚类中心长度错误")?;
        let nlist = centroids.len();
        if nlist == 0 {
            return Err("视觉词典为空".to_string());
        }
        if self.weights.len() != nlist {
            return Err(format!("权重数量 {} 与视觉词数量 {nlist} 不一致", self.weights.len()));
        }

        let mut images = Vec::with_capacity(self.images.len());
        for image in self.images {
            let descriptors = unflatten::<D>(&image.descriptors)
                .ok_or_else(|| format!("{} 的描述符长度错误", image.id))?;
            let n = descriptors.len();
            if image.keypoints.len() != n || image.scores.len() != n || image.clusters.len() != n {
                return Err(format!("{} 的特征数量不一致", image.id));
            }
            if image.clusters.iter().any(|&c| c as usize >= nlist) {
                return Err(format!("{} 的视觉词编号越界", image.id));
            }
            let features = descriptors
                .into_iter()
                .zip(image.keypoints)
                .zip(image.scores)
                .zip(image.clusters)
                .map(|(((descriptor, keypoint), score), cluster)| FeatureRecord {
                    descriptor,
                    keypoint,
                    score,
                    cluster,
                })
                .collect();
            images.push(ImageEntry { id: image.id, shape: image.shape, features });
        }

        Ok(Database::from_parts(
            Vocabulary::new(centroids),
            self.weights,
            images,
            self.keep as usize,
            self.min_keep as usize,
        ))
    }
}

/// 与目标文件位于同一目录的临时文件
fn tmp_path(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => {
            let mut name = name.to_os_string();
            name.push(".tmp");
            path.with_file_name(name)
        }
        None => path.with_extension("tmp"),
    }
}

/// 保存图库
///
/// 先写入临时文件再重命名，写入过程中出错不会破坏已有的图库文件
pub fn save<const D: usize>(db: &Database<D>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let payload = bincode::serialize(&StoredDatabase::from(db)).map_err(io::Error::other)?;
    let checksum = blake3::hash(&payload);

    let tmp = tmp_path(path);
    let mut writer = BufWriter::new(File::create(&tmp)?);
    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(VERSION)?;
    writer.write_all(checksum.as_bytes())?;
    writer.write_all(&payload)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    fs::rename(&tmp, path)?;

    info!("图库已保存到 {}，大小：{} 字节", path.display(), HEADER_LEN + payload.len());
    Ok(())
}

/// 加载图库，文件缺失或损坏时返回 DatabaseLoad
pub fn load<const D: usize>(path: impl AsRef<Path>) -> Result<Database<D>> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| Error::load(path, e))?;
    if data.len() < HEADER_LEN {
        return Err(Error::load(path, "文件过短"));
    }

    let mut reader = Cursor::new(&data[..HEADER_LEN]);
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::load(path, "不是图库文件"));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(Error::load(path, format!("不支持的版本：{version}")));
    }
    let mut checksum = [0u8; blake3::OUT_LEN];
    reader.read_exact(&mut checksum)?;

    let payload = &data[HEADER_LEN..];
    if blake3::hash(payload) != blake3::Hash::from_bytes(checksum) {
        return Err(Error::load(path, "校验和不匹配"));
    }

    let stored: StoredDatabase = bincode::deserialize(payload).map_err(|e| Error::load(path, e))?;
    let db = stored.restore::<D>().map_err(|reason| Error::load(path, reason))?;
    info!("已加载图库 {}，图片：{}", path.display(), db.len());
    Ok(db)
}

/// 图库文件有效时直接加载，否则从图片目录重新构建并保存
pub fn load_or_build<const D: usize, E: FeatureExtractor<D>>(
    corpus_dir: impl AsRef<Path>,
    path: impl AsRef<Path>,
    extractor: &E,
    opts: &BuildOptions,
) -> Result<Database<D>> {
    let path = path.as_ref();
    if path.exists() {
        match load(path) {
            Ok(db) => return Ok(db),
            Err(e) => warn!("{e}，将重新构建"),
        }
    }

    let extractions = extract_corpus(corpus_dir.as_ref(), &opts.suffix, extractor)?;
    let db = Database::build(extractions, opts)?;
    save(&db, path)?;
    Ok(db)
}
