use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream;
use log::{debug, error, info};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{Sender, UnboundedSender, channel};
use tokio::task::spawn_blocking;

use super::DEFAULT_FRAME_PROMPT;
use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::image::{EncodedImage, encode_mat, imencode_jpeg};
use crate::metrics;
use crate::video::VideoReader;

const BOUNDARY: &str = "frame";

fn video_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Video file not found").into_response()
}

/// 以 `multipart/x-mixed-replace` 的形式按原始帧率播放视频
///
/// 每一秒的第一帧会在后台交给视觉模型描述，结果写入对应的描述队列。
#[utoipa::path(
    get,
    path = "/video_feed",
    params(VideoQuery),
    responses(
        (status = 200, description = "JPEG frames", content_type = "multipart/x-mixed-replace; boundary=frame"),
        (status = 404, description = "Video file not found"),
    )
)]
pub async fn video_feed_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VideoQuery>,
) -> Result<Response> {
    let path = PathBuf::from(&query.video_path);
    if !path.is_file() {
        return Ok(video_not_found());
    }
    let reader = spawn_blocking(move || VideoReader::open(path)).await??;
    info!("开始播放视频: {} ({:?})", query.video_path, reader.info());

    let (tx, rx) = channel::<Bytes>(4);
    let handle = Handle::current();
    spawn_blocking(move || play_video(reader, tx, handle, state, query));

    let body = Body::from_stream(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    }));
    Ok((
        [(header::CONTENT_TYPE, format!("multipart/x-mixed-replace; boundary={BOUNDARY}"))],
        body,
    )
        .into_response())
}

/// 逐帧读取视频并发送给客户端，客户端断开后停止
fn play_video(
    mut reader: VideoReader,
    tx: Sender<Bytes>,
    handle: Handle,
    state: Arc<AppState>,
    query: VideoQuery,
) {
    let interval = Duration::from_secs_f64(1. / reader.info().fps as f64);
    let prompt = match query.prompt.trim() {
        "" => DEFAULT_FRAME_PROMPT.to_string(),
        prompt => prompt.to_string(),
    };
    let sender = state.hub.sender(&query.video_path, &query.prompt);

    loop {
        let started = Instant::now();
        let frame = match reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                error!("读取视频帧失败 {}: {e:#}", query.video_path);
                break;
            }
        };

        if frame.sampled {
            match encode_mat(&frame.mat, state.max_size) {
                Ok(image) => {
                    let second = frame.second;
                    let task =
                        describe_frame(state.clone(), image, prompt.clone(), second, sender.clone());
                    handle.spawn(task);
                }
                Err(e) => error!("第 {} 秒的画面编码失败: {e:#}", frame.second),
            }
        }

        let jpeg = match imencode_jpeg(&frame.mat) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                error!("第 {} 帧编码失败: {e:#}", frame.number);
                continue;
            }
        };
        if tx.blocking_send(multipart_chunk(&jpeg)).is_err() {
            debug!("客户端已断开: {}", query.video_path);
            return;
        }

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    info!("视频播放结束: {}", query.video_path);
}

fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    Bytes::from(chunk)
}

async fn describe_frame(
    state: Arc<AppState>,
    image: EncodedImage,
    prompt: String,
    second: u64,
    sender: UnboundedSender<FrameDescription>,
) {
    let Ok(_permit) = state.limiter.acquire().await else {
        return;
    };
    match state.frame_vision.ask(&image, &prompt).await {
        Ok(description) => {
            metrics::inc_frame_described(true);
            debug!("第 {second} 秒: {description}");
            let _ = sender.send(FrameDescription { timestamp: second, description });
        }
        Err(e) => {
            metrics::inc_frame_described(false);
            error!("第 {second} 秒的画面描述失败: {e:#}");
        }
    }
}

/// 以 SSE 的形式推送视频画面的描述
#[utoipa::path(
    get,
    path = "/descriptions",
    params(VideoQuery),
    responses(
        (status = 200, content_type = "text/event-stream", body = FrameDescription),
        (status = 404, description = "Video file not found"),
    )
)]
pub async fn descriptions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VideoQuery>,
) -> Response {
    if !Path::new(&query.video_path).is_file() {
        return video_not_found();
    }
    let rx = state.hub.receiver(&query.video_path, &query.prompt);
    let events = stream::unfold(rx, |rx| async move {
        let description = rx.lock().await.recv().await?;
        Some((Event::default().json_data(&description), rx))
    });
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_chunk() {
        let chunk = multipart_chunk(b"JPEG");
        assert_eq!(&chunk[..], b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n");
    }
}
