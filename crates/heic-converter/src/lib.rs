//! HEIC/HEIF 画像を PNG に変換するライブラリ。
//!
//! Unix 環境では libheif-rs のデコーダーフックを image クレートに登録するため、
//! HEIC/HEIF に加えて image クレートが扱える形式も入力にできる。
//! それ以外の環境では image クレート組み込みの形式のみデコードできる。

use std::{fs, io::Cursor, path::Path, sync::Once};

use convert_core::{ConvertError, SourcePath};
use image::{DynamicImage, ImageFormat, ImageReader, ImageResult};

/// 入力ファイルをデコードし、PNG として `dest` に書き出す。
///
/// `dest` が既に存在する場合は上書きする。読み込みとデコードの失敗は
/// [`ConvertError::Decode`]、エンコードと書き込みの失敗は [`ConvertError::Encode`] になる。
pub fn convert_file(source: &SourcePath, dest: &Path) -> Result<(), ConvertError> {
    let path = source.as_path();
    let data = fs::read(path).map_err(|e| ConvertError::decode(path, e))?;

    let img = decode(&data).map_err(|e| ConvertError::decode(path, e))?;
    let png_data = encode_png(&img).map_err(|e| ConvertError::encode(dest, e))?;

    fs::write(dest, &png_data).map_err(|e| ConvertError::encode(dest, e))?;

    tracing::info!(
        input = %path.display(),
        output = %dest.display(),
        width = img.width(),
        height = img.height(),
        "Image converted"
    );

    Ok(())
}

/// HEIC データを PNG に変換する。
pub fn convert_heic_to_png(heic_data: &[u8]) -> ImageResult<Vec<u8>> {
    let img = decode(heic_data)?;
    let png_data = encode_png(&img)?;

    tracing::debug!(
        input_size = heic_data.len(),
        output_size = png_data.len(),
        "HEIC to PNG conversion succeeded"
    );

    Ok(png_data)
}

fn decode(data: &[u8]) -> ImageResult<DynamicImage> {
    register_decoding_hooks();

    ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()
}

fn encode_png(img: &DynamicImage) -> ImageResult<Vec<u8>> {
    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)?;
    Ok(png_data)
}

fn register_decoding_hooks() {
    static HOOKS: Once = Once::new();

    HOOKS.call_once(|| {
        // libheif-rs のデコーダーフックを登録
        #[cfg(unix)]
        libheif_rs::integration::image::register_all_decoding_hooks();
    });
}
