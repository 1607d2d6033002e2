//! PNG 変換のテスト
//!
//! フィクスチャはテスト内で image クレートを使って生成する。

use std::path::Path;

use convert_core::{ConvertError, SourcePath};
use image::{ImageFormat, Rgb, RgbImage};

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 0x80])
    })
}

fn write_fixture(dir: &Path, name: &str, format: ImageFormat) -> std::path::PathBuf {
    let path = dir.join(name);
    gradient(37, 21).save_with_format(&path, format).unwrap();
    path
}

#[test]
fn test_convert_preserves_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "source.bmp", ImageFormat::Bmp);
    let output = dir.path().join("source.png");

    let source = SourcePath::new(&input).unwrap();
    heic_converter::convert_file(&source, &output).unwrap();

    // PNG マジックバイトを確認
    let png_data = std::fs::read(&output).unwrap();
    assert_eq!(&png_data[..8], b"\x89PNG\r\n\x1a\n");

    let decoded = image::open(&output).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (37, 21));
    assert_eq!(decoded, gradient(37, 21));
}

#[test]
fn test_convert_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "source.jpg", ImageFormat::Jpeg);
    let output = dir.path().join("out.png");
    let source = SourcePath::new(&input).unwrap();

    heic_converter::convert_file(&source, &output).unwrap();
    let first = std::fs::read(&output).unwrap();

    heic_converter::convert_file(&source, &output).unwrap();
    let second = std::fs::read(&output).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_convert_in_memory() {
    let mut tiff_data = Vec::new();
    gradient(8, 8)
        .write_to(&mut std::io::Cursor::new(&mut tiff_data), ImageFormat::Tiff)
        .unwrap();

    let png_data = heic_converter::convert_heic_to_png(&tiff_data).unwrap();

    assert_eq!(&png_data[..4], b"\x89PNG");
    let decoded = image::load_from_memory_with_format(&png_data, ImageFormat::Png).unwrap();
    assert_eq!(decoded.to_rgb8(), gradient(8, 8));
}

#[test]
fn test_garbage_input_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.heic");
    std::fs::write(&input, b"definitely not an image").unwrap();
    let output = dir.path().join("broken.png");

    let source = SourcePath::new(&input).unwrap();
    let err = heic_converter::convert_file(&source, &output).unwrap_err();

    assert!(matches!(err, ConvertError::Decode { ref path, .. } if path == &input));
    assert!(!output.exists());
}

#[test]
fn test_missing_output_directory_is_encode_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "source.png", ImageFormat::Png);
    let output = dir.path().join("missing").join("out.png");

    let source = SourcePath::new(&input).unwrap();
    let err = heic_converter::convert_file(&source, &output).unwrap_err();

    assert!(matches!(err, ConvertError::Encode { ref path, .. } if path == &output));
}

#[cfg(unix)]
#[test]
fn test_convert_real_heic_to_png() {
    // 実機で撮影した HEIC を HEIC_SAMPLE で指定した場合のみ実行する
    let Ok(sample) = std::env::var("HEIC_SAMPLE") else {
        return;
    };

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("sample.png");

    let source = SourcePath::new(&sample).unwrap();
    heic_converter::convert_file(&source, &output).unwrap();

    let decoded = image::open(&output).unwrap();
    assert!(decoded.width() > 0);
    assert!(decoded.height() > 0);
}
