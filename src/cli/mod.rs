mod add;
mod build;
mod export;
mod r#match;
mod show;

pub use add::*;
pub use build::*;
pub use export::*;
pub use r#match::*;
pub use show::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}
