use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use imvision::image::imencode_jpeg;
use opencv::core::{CV_8UC3, Mat, Scalar, Size};
use opencv::prelude::*;
use opencv::videoio;
use predicates::prelude::*;
use rstest::*;
use serde_json::json;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            cmd.env_remove("GOOGLE_API_KEY").env_remove("GROQ_API_KEY");
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

fn write_image(path: &Path) -> Result<()> {
    let img = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::new(0., 0., 255., 0.))?;
    fs::write(path, imencode_jpeg(&img)?)?;
    Ok(())
}

/// 生成一段 5 FPS 的 MJPG 视频，当前环境无法写入视频时返回 false
fn write_clip(path: &Path, frames: usize) -> Result<bool> {
    let size = Size::new(64, 48);
    let fourcc = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G')?;
    let mut writer = videoio::VideoWriter::new(&path.to_string_lossy(), fourcc, 5., size, true)?;
    if !writer.is_opened()? {
        return Ok(false);
    }
    for i in 0..frames {
        let frame = Mat::new_size_with_default(size, CV_8UC3, Scalar::all(i as f64 * 20.))?;
        writer.write(&frame)?;
    }
    writer.release()?;
    Ok(true)
}

struct MockGemini {
    server: mockito::ServerGuard,
    _mocks: Vec<mockito::Mock>,
}

impl MockGemini {
    fn start(answer: &str) -> Self {
        let mut server = mockito::Server::new();
        let generate = server
            .mock("POST", "/models/gemini-2.0-flash-lite:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_header("content-type", "application/json")
            .with_body(
                json!({"candidates": [{"content": {"parts": [{"text": answer}]}}]}).to_string(),
            )
            .create();
        let embed = server
            .mock("POST", "/models/text-embedding-004:embedContent")
            .match_header("x-goog-api-key", "test-key")
            .with_header("content-type", "application/json")
            .with_body(json!({"embedding": {"values": [0.1, 0.9, 0.2, 0.0]}}).to_string())
            .create();
        Self { server, _mocks: vec![generate, embed] }
    }

    fn url(&self) -> String {
        self.server.url()
    }
}

#[test]
fn help() -> Result<()> {
    cargo_run!("imvision", "--help")
        .success()
        .stdout(predicate::str::contains("ask").and(predicate::str::contains("server")));
    Ok(())
}

#[test]
fn ask_missing_key() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let image = dir.path().join("red.jpg");
    write_image(&image)?;

    cargo_run!("imvision", "ask", &image)
        .failure()
        .stderr(predicate::str::contains("GOOGLE_API_KEY"));
    cargo_run!("imvision", "ask", "--provider", "groq", &image)
        .failure()
        .stderr(predicate::str::contains("GROQ_API_KEY"));
    Ok(())
}

#[test]
fn ask_missing_file() -> Result<()> {
    cargo_run!("imvision", "--google-api-key", "k", "ask", "/nonexistent/image.jpg")
        .failure()
        .stderr(predicate::str::contains("文件不存在"));
    Ok(())
}

#[test]
fn ask_with_mock() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let image = dir.path().join("red.jpg");
    write_image(&image)?;
    let gemini = MockGemini::start("A plain red rectangle.");

    cargo_run!(
        "imvision",
        "--gemini-base-url",
        gemini.url(),
        "--google-api-key",
        "test-key",
        "ask",
        &image,
        "What colour is it?"
    )
    .success()
    .stdout(predicate::str::contains("A plain red rectangle."));
    Ok(())
}

#[rstest]
#[case::persistent(false)]
#[case::in_memory(true)]
fn add_then_search(#[case] in_memory: bool) -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    write_image(&images.path().join("red.jpg"))?;
    write_image(&images.path().join("nested.JPG"))?;
    fs::write(images.path().join("readme.txt"), "skip me")?;
    let gemini = MockGemini::start("A plain red rectangle.");

    let mut args = vec![
        "-c".to_string(),
        conf_dir.path().to_string_lossy().into_owned(),
        "--gemini-base-url".to_string(),
        gemini.url(),
        "--google-api-key".to_string(),
        "test-key".to_string(),
        "add".to_string(),
        images.path().to_string_lossy().into_owned(),
        "--dimension".to_string(),
        "4".to_string(),
        "--search".to_string(),
        "red things".to_string(),
    ];
    if in_memory {
        args.push("--in-memory".to_string());
    }
    Command::cargo_bin("imvision")?
        .env_remove("GOOGLE_API_KEY")
        .args(&args)
        .assert()
        .success()
        .stdout(predicate::str::contains("red.jpg").and(predicate::str::contains("nested.JPG")))
        .stdout(predicate::str::contains("readme.txt").not());

    let search = cargo_run!(
        "imvision",
        "-c",
        conf_dir.path(),
        "--gemini-base-url",
        gemini.url(),
        "--google-api-key",
        "test-key",
        "search",
        "--dimension",
        "4",
        "--output-format",
        "json",
        "red"
    )
    .success();
    if in_memory {
        search.stdout(predicate::str::contains("red.jpg").not());
    } else {
        search.stdout(
            predicate::str::contains("red.jpg")
                .and(predicate::str::contains("A plain red rectangle.")),
        );
    }
    Ok(())
}

#[test]
fn remove_images() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let red = images.path().join("red.jpg");
    write_image(&red)?;
    let gemini = MockGemini::start("A plain red rectangle.");

    cargo_run!("imvision", "-c", conf_dir.path(), "remove").failure();

    cargo_run!(
        "imvision",
        "-c",
        conf_dir.path(),
        "--google-api-key",
        "test-key",
        "--gemini-base-url",
        gemini.url(),
        "add",
        &red,
        "--dimension",
        "4",
        "--description",
        "a fixed description"
    )
    .success();

    let search = |conf_dir: &Path| -> Result<_> {
        Ok(cargo_run!(
            "imvision",
            "-c",
            conf_dir,
            "--google-api-key",
            "test-key",
            "--gemini-base-url",
            gemini.url(),
            "search",
            "--dimension",
            "4",
            "anything"
        ))
    };
    search(conf_dir.path())?.success().stdout(predicate::str::contains("a fixed description"));

    cargo_run!("imvision", "-c", conf_dir.path(), "remove", &red).success();
    search(conf_dir.path())?.success().stdout(predicate::str::contains("red.jpg").not());

    cargo_run!(
        "imvision",
        "-c",
        conf_dir.path(),
        "--google-api-key",
        "test-key",
        "--gemini-base-url",
        gemini.url(),
        "add",
        &red,
        "--dimension",
        "4",
        "--description",
        "a fixed description"
    )
    .success();
    cargo_run!("imvision", "-c", conf_dir.path(), "remove", "--all").success();
    search(conf_dir.path())?.success().stdout(predicate::str::contains("red.jpg").not());
    Ok(())
}

#[test]
fn video_missing_file() -> Result<()> {
    cargo_run!("imvision", "--google-api-key", "k", "video", "/nonexistent/clip.mp4")
        .failure()
        .stderr(predicate::str::contains("视频文件不存在"));
    Ok(())
}

#[test]
fn video_describe() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let clip = dir.path().join("clip.avi");
    if !write_clip(&clip, 10)? {
        return Ok(());
    }
    let gemini = MockGemini::start("A fading grey square.");

    cargo_run!(
        "imvision",
        "--gemini-base-url",
        gemini.url(),
        "--google-api-key",
        "test-key",
        "video",
        &clip
    )
    .success()
    .stdout(
        predicate::str::contains("FPS: 5")
            .and(predicate::str::contains("Total frames:"))
            .and(predicate::str::contains("Duration:"))
            .and(predicate::str::contains("Processing frame at 0 seconds..."))
            .and(predicate::str::contains("Processing frame at 1 seconds..."))
            .and(predicate::str::contains("Processing frame at 2 seconds...").not())
            .and(predicate::str::contains("Description: A fading grey square.")),
    );
    Ok(())
}

#[test]
fn video_path_from_stdin() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let clip = dir.path().join("clip.avi");
    if !write_clip(&clip, 5)? {
        return Ok(());
    }
    let gemini = MockGemini::start("A fading grey square.");

    Command::cargo_bin("imvision")?
        .env_remove("GOOGLE_API_KEY")
        .args(["--gemini-base-url", &gemini.url(), "--google-api-key", "test-key", "video"])
        .write_stdin(format!("{}\n", clip.display()))
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Enter the path to the video file: ")
                .and(predicate::str::contains("Processing frame at 0 seconds..."))
                .and(predicate::str::contains("Description: A fading grey square.")),
        );
    Ok(())
}
