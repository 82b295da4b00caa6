use std::{fs::File, io::Cursor, path::PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

fn write_image(path: &std::path::Path, img: DynamicImage, format: ImageFormat) {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    std::fs::write(path, buf).unwrap();
}

#[test]
fn cli_run_writes_group_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let art = tmp.path().join("art");
    let footers = tmp.path().join("footers");
    let out = tmp.path().join("out");
    let work = tmp.path().join("work");
    let config = tmp.path().join("config.json");

    std::fs::create_dir_all(&art).unwrap();
    std::fs::create_dir_all(footers.join("X")).unwrap();
    write_image(
        &art.join("a.jpg"),
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]))),
        ImageFormat::Jpeg,
    );
    write_image(
        &footers.join("X").join("f.png"),
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]))),
        ImageFormat::Png,
    );
    std::fs::write(
        &config,
        r#"{"overlay_size": {"width": 16, "height": 8}, "anchor": {"x": 4, "y": 20}}"#,
    )
    .unwrap();

    let exe = PathBuf::from(env!("CARGO_BIN_EXE_artstamp"));
    let output = std::process::Command::new(exe)
        .arg("--yes")
        .arg("--art")
        .arg(&art)
        .arg("--footers")
        .arg(&footers)
        .arg("--out")
        .arg(&out)
        .arg("--work")
        .arg(&work)
        .arg("--config")
        .arg(&config)
        .arg("--concurrency")
        .arg("2")
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Processing complete"));

    let zip = zip::ZipArchive::new(File::open(out.join("X.zip")).unwrap()).unwrap();
    assert_eq!(zip.len(), 1);
    assert!(!work.join("X").exists());
}

#[test]
fn cli_rejects_zero_concurrency() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = PathBuf::from(env!("CARGO_BIN_EXE_artstamp"));
    let status = std::process::Command::new(exe)
        .current_dir(tmp.path())
        .args(["--yes", "--concurrency", "0"])
        .status()
        .unwrap();
    assert!(!status.success());
}
