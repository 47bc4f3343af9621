use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use log::{error, info, warn};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::{IMAGE_TEMPERATURE, SubCommandExtend, VIDEO_TEMPERATURE};
use crate::config::{EmbedOptions, ImageOptions, ModelOptions, StoreOptions};
use crate::{ImageStoreBuilder, Opts, provider, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub vision: ModelOptions,
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub store: StoreOptions,
    #[command(flatten)]
    pub image: ImageOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:5050")]
    pub addr: String,
    /// 同时进行的画面描述请求数量
    #[arg(long, default_value_t = 8)]
    pub max_concurrent: usize,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let auth = match &self.prometheus_auth {
            Some(auth) => {
                let (username, password) =
                    auth.split_once(':').ok_or_else(|| anyhow!("prometheus 认证信息格式错误"))?;
                Some((username.to_string(), password.to_string()))
            }
            None => None,
        };

        let vision = provider::build_vision(&opts.api, &self.vision, IMAGE_TEMPERATURE)?;
        let frame_vision = provider::build_vision(&opts.api, &self.vision, VIDEO_TEMPERATURE)?;
        let embedder = match provider::build_embedder(&opts.api, &self.embed) {
            Ok(embedder) => Some(embedder),
            Err(e) => {
                warn!("图片搜索不可用: {e}");
                None
            }
        };
        let store = ImageStoreBuilder::new(opts.conf_dir.clone())
            .in_memory(self.store.in_memory)
            .dimension(self.embed.dimension as usize)
            .open()
            .await?;

        // 创建应用状态
        let state = server::AppState::new(vision, store)
            .frame_vision(frame_vision)
            .embedder(embedder)
            .max_concurrent(self.max_concurrent)
            .client(provider::http_client(&opts.api)?)
            .max_size(self.image.max_size);

        // 创建应用
        let app = server::create_app(Arc::new(state));

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            tokio::spawn(async move {
                loop {
                    let metric_families = prometheus::gather();
                    let url = url.clone();
                    let instance = instance.clone();
                    let auth = auth.clone();
                    let r = spawn_blocking(move || {
                        prometheus::push_metrics(
                            "imvision",
                            labels! {
                                "instance".to_string() => instance.clone(),
                            },
                            &url,
                            metric_families,
                            auth.map(|(username, password)| BasicAuthentication {
                                username,
                                password,
                            }),
                        )
                    })
                    .await;
                    match r {
                        Ok(Err(e)) => error!("推送指标失败: {e}"),
                        Err(e) => error!("推送指标失败: {e}"),
                        Ok(Ok(())) => {}
                    }
                    sleep(Duration::from_secs(30)).await;
                }
            });
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
