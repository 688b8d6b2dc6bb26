use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::builder::TypedValueParser;
use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "iconsearch", "iconsearch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().expect("config dir is not valid utf-8")
}

pub const DEFAULT_VOCABULARY_SIZE: usize = 100;
pub const DEFAULT_KEEP: usize = 100;
pub const DEFAULT_MIN_KEEP: usize = 10;
pub const DEFAULT_RATIO: f32 = 0.7;
pub const DEFAULT_MIN_MATCHES: usize = 4;
pub const DEFAULT_QUERY_CLUSTERS: usize = 2;
pub const DEFAULT_SUFFIX: &str = "png,jpg,jpeg";

#[derive(Args, Debug, Clone, PartialEq)]
pub struct KMeansOptions {
    /// K-means 最大迭代次数
    #[arg(long = "kmeans-max-iter", value_name = "N", default_value_t = 100)]
    pub max_iter: usize,
    /// 聚类中心最大位移小于该值时停止迭代
    #[arg(long = "kmeans-epsilon", value_name = "EPS", default_value_t = 0.2)]
    pub epsilon: f32,
    /// 随机初始化的尝试次数，保留紧致度最小的结果
    #[arg(long = "kmeans-attempts", value_name = "N", default_value_t = 10)]
    pub attempts: usize,
    /// 随机数种子，指定后构建结果可复现
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self { max_iter: 100, epsilon: 0.2, attempts: 10, seed: None }
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct BuildOptions {
    #[command(flatten)]
    pub kmeans: KMeansOptions,
    /// 视觉词数量 K
    #[arg(short = 'k', long, value_name = "K", default_value_t = DEFAULT_VOCABULARY_SIZE)]
    pub vocabulary_size: usize,
    /// 每张图片最多保留的特征数量
    #[arg(long, value_name = "N", default_value_t = DEFAULT_KEEP)]
    pub keep: usize,
    /// 最少特征点，低于该值的图片不会被加入图库
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MIN_KEEP)]
    pub min_keep: usize,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = DEFAULT_SUFFIX)]
    pub suffix: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            kmeans: KMeansOptions::default(),
            vocabulary_size: DEFAULT_VOCABULARY_SIZE,
            keep: DEFAULT_KEEP,
            min_keep: DEFAULT_MIN_KEEP,
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// 返回的结果数量
    #[arg(short = 'n', long, value_name = "N", default_value_t = 1)]
    pub top_n: usize,
    /// Lowe 比率测试阈值
    #[arg(long, value_name = "RATIO", default_value_t = DEFAULT_RATIO)]
    pub ratio: f32,
    /// 图片至少需要的有效匹配数量，不足则视为未匹配
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MIN_MATCHES)]
    pub min_matches: usize,
    /// 每个查询描述符访问的最近视觉词数量
    #[arg(long, value_name = "N", default_value_t = DEFAULT_QUERY_CLUSTERS,
          value_parser = clap::value_parser!(u8).range(1..=8).map(usize::from))]
    pub query_clusters: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_n: 1,
            ratio: DEFAULT_RATIO,
            min_matches: DEFAULT_MIN_MATCHES,
            query_clusters: DEFAULT_QUERY_CLUSTERS,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// AKAZE 检测器响应阈值，越小特征点越多
    #[arg(long, value_name = "THRESHOLD", default_value_t = 0.001)]
    pub threshold: f64,
    /// 提取特征前将图片缩放到固定尺寸
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub resize: Option<(u32, u32)>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { threshold: 0.001, resize: None }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "iconsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// iconsearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
    /// 构建时使用的线程数
    #[arg(short = 'j', long, value_name = "N", default_value_t = num_cpus::get())]
    pub threads: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从图片目录构建图库，已存在时直接加载
    Build(BuildCommand),
    /// 向已有图库追加图片
    Add(AddCommand),
    /// 在图库中匹配图片
    Match(MatchCommand),
    /// 显示图库信息
    Show(ShowCommand),
    /// 导出视觉词典和权重
    Export(ExportCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回图库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("catalog.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_size(s: &str) -> anyhow::Result<(u32, u32)> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    let size = (parts[0].parse()?, parts[1].parse()?);
    if size.0 == 0 || size.1 == 0 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    Ok(size)
}
