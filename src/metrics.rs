use std::sync::LazyLock;

use prometheus::*;

static METRIC_PROVIDER_REQUEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imvision_provider_request_count",
        "count of the requests sent to model providers",
        &["provider", "model", "status"]
    )
    .expect("failed to register imvision_provider_request_count")
});

static METRIC_PROVIDER_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "imvision_provider_request_duration",
        "duration of the per-request model call in seconds",
        &["provider", "model"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("failed to register imvision_provider_request_duration")
});

static METRIC_FRAME_DESCRIBED_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imvision_frame_described_count",
        "count of the video frames sent for description",
        &["status"]
    )
    .expect("failed to register imvision_frame_described_count")
});

/// 记录一次模型调用
pub fn observe_request(provider: &str, model: &str, ok: bool, duration: f32) {
    METRIC_PROVIDER_REQUEST_COUNT.with_label_values(&[provider, model, status(ok)]).inc();
    METRIC_PROVIDER_REQUEST_DURATION
        .with_label_values(&[provider, model])
        .observe(duration as f64);
}

/// 记录一次视频帧描述
pub fn inc_frame_described(ok: bool) {
    METRIC_FRAME_DESCRIBED_COUNT.with_label_values(&[status(ok)]).inc();
}

fn status(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}
