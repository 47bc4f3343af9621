use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts};
use crate::store::SearchHit;
use crate::utils::one_line;
use crate::{ImageStoreBuilder, provider};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    /// 搜索内容
    pub query: String,
    /// 返回结果数量
    #[arg(short, long, default_value_t = 5)]
    pub limit: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let embedder = provider::build_embedder(&opts.api, &self.embed)?;
        let store = ImageStoreBuilder::new(opts.conf_dir.clone())
            .dimension(self.embed.dimension as usize)
            .open()
            .await?;

        let result = store.search_text(embedder.as_ref(), &self.query, self.limit).await?;
        print_result(&result, &self.output_format)
    }
}

pub fn print_result(result: &[SearchHit], format: &OutputFormat) -> Result<()> {
    println!("{}", format_result(result, format)?);
    Ok(())
}

fn format_result(result: &[SearchHit], format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Table => result
            .iter()
            .map(|hit| {
                format!(
                    "{:.4}\t{}\t{}",
                    hit.similarity_score,
                    hit.image_path,
                    one_line(&hit.description)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}
