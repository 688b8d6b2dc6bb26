use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::extractor::AKAZE_DIM;
use crate::persist::load;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {}

impl SubCommandExtend for ShowCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let db = load::<AKAZE_DIM>(opts.conf_dir.database())?;

        let (min, max) = db
            .weights()
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &w| (min.min(w), max.max(w)));

        println!("视觉词数量      : {}", db.vocabulary().len());
        println!("描述符维度      : {}", db.dim());
        println!("图片数量        : {}", db.len());
        println!("特征数量        : {}", db.num_features());
        println!("倒排表不平衡度  : {:.4}", db.index().imbalance());
        println!("权重范围        : {min:.4} ~ {max:.4}");
        Ok(())
    }
}
