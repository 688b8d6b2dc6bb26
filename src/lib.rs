pub mod catalog;
pub mod cli;
pub mod config;
pub mod database;
pub mod distance;
pub mod error;
pub mod extractor;
pub mod invlists;
pub mod kmeans;
pub mod matcher;
pub mod persist;
pub mod quantizer;
pub mod selector;
pub mod types;
pub mod utils;
pub mod weights;

pub use config::Opts;
pub use database::{Database, Match, SearchResult};
pub use error::{Error, Result};
pub use extractor::{AKAZE_DIM, AkazeExtractor, FeatureExtractor};
pub use persist::{load, load_or_build, save};

/// 使用 AKAZE 特征的图库
pub type AkazeDatabase = Database<AKAZE_DIM>;
