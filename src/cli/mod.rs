mod add;
mod ask;
mod remove;
mod search;
pub mod server;
mod video;

pub use add::*;
pub use ask::*;
pub use remove::*;
pub use search::*;
pub use server::*;
pub use video::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
