use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use ndarray::{Array1, Array2};
use ndarray_npy::write_npy;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::extractor::AKAZE_DIM;
use crate::persist::load;

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    /// 输出目录
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
}

impl SubCommandExtend for ExportCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let db = load::<AKAZE_DIM>(opts.conf_dir.database())?;
        fs::create_dir_all(&self.output)?;

        let centroids = db.vocabulary().centroids();
        let centroids = Array2::from_shape_vec((centroids.len(), AKAZE_DIM), centroids.as_flattened().to_vec())?;
        write_npy(self.output.join("centroids.npy"), &centroids)?;

        let weights = Array1::from_vec(db.weights().to_vec());
        write_npy(self.output.join("weights.npy"), &weights)?;

        info!("导出成功：{}", self.output.display());
        Ok(())
    }
}
