use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use opencv::core::{self, Mat, Vector};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};

/// 图片来源，可以是本地文件或者网络地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
}

impl FromStr for ImageSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Url(s.to_string()))
        } else {
            Ok(Self::Path(PathBuf::from(s)))
        }
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// 编码后准备上传的图片
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl EncodedImage {
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self { mime_type: "image/jpeg".to_string(), data }
    }

    pub fn base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// 返回 `data:<mime>;base64,<payload>` 形式的地址
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

/// 读取图片的原始字节
pub async fn read_source(client: &reqwest::Client, source: &ImageSource) -> Result<Vec<u8>> {
    match source {
        ImageSource::Path(path) => {
            if !path.is_file() {
                return Err(anyhow!("文件不存在: {}", path.display()));
            }
            Ok(tokio::fs::read(path).await?)
        }
        ImageSource::Url(url) => {
            debug!("下载图片: {url}");
            let bytes = client
                .get(url)
                .send()
                .await?
                .error_for_status()
                .with_context(|| format!("下载图片失败: {url}"))?
                .bytes()
                .await?;
            Ok(bytes.to_vec())
        }
    }
}

/// 解码图片，宽或高超过 `max_size` 时等比缩放
pub fn imdecode(bytes: &[u8], max_size: (i32, i32)) -> Result<Mat> {
    let mat = Mat::from_slice(bytes)?;
    let img = imgcodecs::imdecode(&mat, imgcodecs::IMREAD_COLOR)?;
    if img.rows() == 0 || img.cols() == 0 {
        return Err(anyhow!("无法识别的图片格式"));
    }
    let (width, height) = max_size;
    if img.cols() > width || img.rows() > height {
        return Ok(adjust_image_size(&img, width, height)?);
    }
    Ok(img)
}

pub fn adjust_image_size(img: &Mat, width: i32, height: i32) -> opencv::Result<Mat> {
    let (ow, oh) = (img.cols() as f64, img.rows() as f64);
    let scale = (height as f64 / oh).min(width as f64 / ow);
    let mut output = Mat::default();
    imgproc::resize(
        img,
        &mut output,
        core::Size::default(),
        scale,
        scale,
        imgproc::InterpolationFlags::INTER_AREA as i32,
    )?;
    Ok(output)
}

pub fn imencode_jpeg(img: &Mat) -> Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let flags = Vector::<i32>::new();
    if !imgcodecs::imencode(".jpg", img, &mut buf, &flags)? {
        return Err(anyhow!("JPEG 编码失败"));
    }
    Ok(buf.to_vec())
}

/// 将任意格式的图片字节转换为 JPEG
pub fn encode_image(bytes: &[u8], max_size: (i32, i32)) -> Result<EncodedImage> {
    let img = imdecode(bytes, max_size)?;
    Ok(EncodedImage::jpeg(imencode_jpeg(&img)?))
}

/// 将解码后的画面（如视频帧）按尺寸限制编码为 JPEG
pub fn encode_mat(img: &Mat, max_size: (i32, i32)) -> Result<EncodedImage> {
    let (width, height) = max_size;
    if img.cols() > width || img.rows() > height {
        let img = adjust_image_size(img, width, height)?;
        return Ok(EncodedImage::jpeg(imencode_jpeg(&img)?));
    }
    Ok(EncodedImage::jpeg(imencode_jpeg(img)?))
}

/// 读取、解码并重新编码一张图片
pub async fn load_image(
    client: &reqwest::Client,
    source: &ImageSource,
    max_size: (i32, i32),
) -> Result<EncodedImage> {
    let bytes = read_source(client, source).await?;
    tokio::task::spawn_blocking(move || encode_image(&bytes, max_size))
        .await?
        .with_context(|| format!("无法读取图片: {source}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use opencv::core::{CV_8UC3, Scalar};

    use super::*;

    /// 生成一张纯色测试图片
    pub fn sample_jpeg(width: i32, height: i32) -> Vec<u8> {
        let img =
            Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::new(0., 128., 255., 0.))
                .unwrap();
        imencode_jpeg(&img).unwrap()
    }

    #[test]
    fn test_image_source() {
        assert_eq!(
            "https://example.com/a.png".parse::<ImageSource>().unwrap(),
            ImageSource::Url("https://example.com/a.png".to_string())
        );
        assert_eq!(
            "HTTP://example.com/a.png".parse::<ImageSource>().unwrap(),
            ImageSource::Url("HTTP://example.com/a.png".to_string())
        );
        assert_eq!(
            "/tmp/http.png".parse::<ImageSource>().unwrap(),
            ImageSource::Path(PathBuf::from("/tmp/http.png"))
        );
    }

    #[test]
    fn test_data_url() {
        let image = EncodedImage::jpeg(b"hello".to_vec());
        assert_eq!(image.base64(), "aGVsbG8=");
        assert_eq!(image.data_url(), "data:image/jpeg;base64,aGVsbG8=");
    }

    #[test]
    fn test_imdecode_resize() {
        let jpeg = sample_jpeg(400, 100);
        let img = imdecode(&jpeg, (200, 200)).unwrap();
        assert_eq!((img.cols(), img.rows()), (200, 50));

        let img = imdecode(&jpeg, (1920, 1080)).unwrap();
        assert_eq!((img.cols(), img.rows()), (400, 100));
    }

    #[test]
    fn test_encode_mat() {
        let img = imdecode(&sample_jpeg(300, 300), (1920, 1080)).unwrap();
        let encoded = encode_mat(&img, (100, 100)).unwrap();
        assert_eq!(encoded.mime_type, "image/jpeg");
        let decoded = imdecode(&encoded.data, (1920, 1080)).unwrap();
        assert_eq!((decoded.cols(), decoded.rows()), (100, 100));
    }

    #[test]
    fn test_imdecode_garbage() {
        assert!(imdecode(b"definitely not an image", (100, 100)).is_err());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let client = reqwest::Client::new();
        let source = ImageSource::Path(PathBuf::from("/nonexistent/image.jpg"));
        let err = read_source(&client, &source).await.unwrap_err();
        assert!(err.to_string().contains("文件不存在"));
    }

    #[tokio::test]
    async fn test_read_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cat.jpg")
            .with_status(200)
            .with_body(sample_jpeg(8, 8))
            .create_async()
            .await;
        let missing = server.mock("GET", "/missing.jpg").with_status(404).create_async().await;

        let client = reqwest::Client::new();
        let source = ImageSource::Url(format!("{}/cat.jpg", server.url()));
        let bytes = read_source(&client, &source).await.unwrap();
        assert!(encode_image(&bytes, (100, 100)).is_ok());

        let source = ImageSource::Url(format!("{}/missing.jpg", server.url()));
        assert!(read_source(&client, &source).await.is_err());

        mock.assert_async().await;
        missing.assert_async().await;
    }
}
