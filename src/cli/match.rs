use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{debug, warn};
use serde_json::json;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractOptions, Opts, SearchOptions};
use crate::database::SearchResult;
use crate::extractor::{AKAZE_DIM, AkazeExtractor, FeatureExtractor};
use crate::persist::load;

/// 没有任何图片匹配时输出的标识
pub const UNKNOWN: &str = "Unknown";

#[derive(Parser, Debug, Clone)]
pub struct MatchCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 被匹配的图片路径
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for MatchCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let db = load::<AKAZE_DIM>(opts.conf_dir.database())?;
        let extractor = AkazeExtractor::from(&self.extract);

        let results = self
            .images
            .iter()
            .map(|image| {
                let result = match extractor.extract_path(image) {
                    Ok(extraction) => db.search(&extraction.descriptors, &self.search),
                    Err(e) => {
                        warn!("无法读取图片 {}：{e}", image.display());
                        SearchResult::default()
                    }
                };
                debug!(
                    "{}：相关视觉词 {}，候选特征 {}",
                    image.display(),
                    result.relevant_clusters,
                    result.pool_size
                );
                (image, result)
            })
            .collect::<Vec<_>>();

        print_result(&results, self.output_format)
    }
}

fn print_result(results: &[(&PathBuf, SearchResult)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let value = results
                .iter()
                .map(|(image, result)| json!({ "image": image, "result": result }))
                .collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Table => {
            for (image, result) in results {
                if result.matches.is_empty() {
                    println!("{}\t{UNKNOWN}", image.display());
                }
                for m in &result.matches {
                    println!("{}\t{}\t{}\t{:.2}", image.display(), m.id, m.matches, m.score);
                }
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}
