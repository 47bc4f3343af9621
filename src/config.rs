use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Args, Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "imvision", "imvision")
        .map(|dirs| dirs.config_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| ".imvision".to_string())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

/// 外部 API 的访问配置
#[derive(Args, Debug, Clone)]
pub struct ApiOptions {
    /// Google AI Studio API Key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    pub google_api_key: Option<String>,
    /// Groq API Key
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true, global = true)]
    pub groq_api_key: Option<String>,
    /// Gemini API 地址
    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        value_name = "URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta",
        global = true
    )]
    pub gemini_base_url: String,
    /// Groq API 地址（OpenAI 兼容接口）
    #[arg(
        long,
        env = "GROQ_BASE_URL",
        value_name = "URL",
        default_value = "https://api.groq.com/openai/v1",
        global = true
    )]
    pub groq_base_url: String,
    /// 请求超时时间，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 60, global = true)]
    pub timeout: u64,
}

/// 视觉模型参数
#[derive(Args, Debug, Clone)]
pub struct ModelOptions {
    /// 视觉模型服务商
    #[arg(long, value_enum, default_value_t = ProviderKind::Gemini)]
    pub provider: ProviderKind,
    /// 模型名称，不填则使用服务商的默认模型
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,
    /// 采样温度，不填则使用当前命令的默认值
    #[arg(long, value_name = "T")]
    pub temperature: Option<f32>,
    /// 单次回答的最大 token 数
    #[arg(long, value_name = "N", default_value_t = 1024)]
    pub max_tokens: u32,
    /// nucleus 采样概率
    #[arg(long, value_name = "P", default_value_t = 1.0)]
    pub top_p: f32,
}

impl ModelOptions {
    /// 返回实际使用的模型名称
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(self.provider.default_model())
    }
}

/// 文本向量化参数
#[derive(Args, Debug, Clone)]
pub struct EmbedOptions {
    /// 向量化模型名称
    #[arg(long, value_name = "NAME", default_value = "text-embedding-004")]
    pub embed_model: String,
    /// 向量维度，同一个数据库必须保持一致
    #[arg(long, value_name = "N", default_value_t = 128, value_parser = clap::value_parser!(u32).range(1..=3072))]
    pub dimension: u32,
}

/// 向量数据库参数
#[derive(Args, Debug, Clone)]
pub struct StoreOptions {
    /// 仅在内存中保存数据，进程退出后丢失
    #[arg(long)]
    pub in_memory: bool,
}

/// 图片预处理参数
#[derive(Args, Debug, Clone)]
pub struct ImageOptions {
    /// 图片最大尺寸，宽或高超过这个尺寸的图片会被等比缩放后再上传
    #[arg(short = 'S', long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1920x1080")]
    pub max_size: (i32, i32),
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imvision", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imvision 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
    #[command(flatten)]
    pub api: ApiOptions,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 向视觉模型提问一张图片
    Ask(AskCommand),
    /// 描述图片并添加到向量数据库
    Add(AddCommand),
    /// 使用文本搜索图片
    Search(SearchCommand),
    /// 从向量数据库中删除图片
    Remove(RemoveCommand),
    /// 逐秒描述一段视频
    Video(VideoCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Google Gemini
    Gemini,
    /// Groq
    Groq,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash-lite",
            Self::Groq => "meta-llama/llama-4-scout-17b-16e-instruct",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imvision.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_size(s: &str) -> anyhow::Result<(i32, i32)> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    let (width, height) = (parts[0].parse()?, parts[1].parse()?);
    if width <= 0 || height <= 0 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert!(parse_size("1920").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("ax10").is_err());
    }

    #[test]
    fn test_default_model() {
        let opts = Opts::try_parse_from(["imvision", "ask", "a.jpg"]).unwrap();
        let SubCommand::Ask(ask) = opts.subcmd else { panic!("unexpected subcommand") };
        assert_eq!(ask.vision.model_name(), "gemini-2.0-flash-lite");

        let opts =
            Opts::try_parse_from(["imvision", "ask", "--provider", "groq", "a.jpg"]).unwrap();
        let SubCommand::Ask(ask) = opts.subcmd else { panic!("unexpected subcommand") };
        assert_eq!(ask.vision.model_name(), ProviderKind::Groq.default_model());
    }

    #[test]
    fn test_dimension_range() {
        assert!(Opts::try_parse_from(["imvision", "search", "--dimension", "0", "q"]).is_err());
        let opts = Opts::try_parse_from(["imvision", "-c", "/tmp/x", "search", "q"]).unwrap();
        assert_eq!(opts.conf_dir.database(), PathBuf::from("/tmp/x/imvision.db"));
    }
}
