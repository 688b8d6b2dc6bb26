use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::catalog::extract_corpus;
use crate::cli::SubCommandExtend;
use crate::config::{BuildOptions, ExtractOptions, Opts};
use crate::database::Database;
use crate::extractor::{AKAZE_DIM, AkazeExtractor};
use crate::persist::{load_or_build, save};

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub build: BuildOptions,
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 图片所在目录
    pub corpus: PathBuf,
    /// 忽略已有的图库，强制重新构建
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for BuildCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let extractor = AkazeExtractor::from(&self.extract);
        let path = opts.conf_dir.database();

        let db = if self.force {
            let extractions = extract_corpus(&self.corpus, &self.build.suffix, &extractor)?;
            let db = Database::<AKAZE_DIM>::build(extractions, &self.build)?;
            save(&db, &path)?;
            db
        } else {
            load_or_build::<AKAZE_DIM, _>(&self.corpus, &path, &extractor, &self.build)?
        };

        info!("图库位于 {}", path.display());
        println!("图片：{}，特征：{}，视觉词：{}", db.len(), db.num_features(), db.vocabulary().len());
        Ok(())
    }
}
