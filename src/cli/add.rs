use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use crate::catalog::{extract_images, scan_corpus};
use crate::cli::SubCommandExtend;
use crate::config::{DEFAULT_SUFFIX, ExtractOptions, Opts};
use crate::error::Error;
use crate::extractor::{AKAZE_DIM, AkazeExtractor};
use crate::persist::{load, save};
use crate::utils::suffix_regex;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 图片路径，也可以是图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = DEFAULT_SUFFIX)]
    pub suffix: String,
}

impl SubCommandExtend for AddCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let path = opts.conf_dir.database();
        let mut db = load::<AKAZE_DIM>(&path)?;

        let paths = if self.path.is_file() {
            vec![self.path.clone()]
        } else {
            scan_corpus(&self.path, &suffix_regex(&self.suffix))?
        };
        let extractor = AkazeExtractor::from(&self.extract);

        let mut added = 0;
        for (id, extraction) in extract_images(&paths, &extractor) {
            match db.add_image(id.as_str(), &extraction) {
                Ok(()) => {
                    info!("添加图片：{id}");
                    added += 1;
                }
                Err(e @ (Error::DuplicateImage(_) | Error::InsufficientFeatures { .. })) => {
                    warn!("跳过 {id}：{e}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if added > 0 {
            save(&db, &path)?;
        }
        println!("新增图片：{added}，图片总数：{}", db.len());
        Ok(())
    }
}
