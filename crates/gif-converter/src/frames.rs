use std::path::PathBuf;

use convert_core::ConvertError;
use image::{RgbaImage, imageops::FilterType};
use tracing::{debug, warn};

/// デコード対象の映像ストリームのサイズとタイミング。
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    /// フレームレート。コンテナが報告しない場合は `None`
    pub frame_rate: Option<f64>,
    /// 秒
    pub duration: Option<f64>,
}

/// デコード済みの RGBA フレームを返し、close されるまでリソースを保持するもの。
pub trait FrameSource {
    fn info(&self) -> &StreamInfo;

    /// 表示順で次のフレームを返す。ストリームの終端では `None` を返す。
    fn read_frame(&mut self) -> Result<Option<RgbaImage>, ConvertError>;

    /// デコーダーを解放する。[`FrameSequence`] から一度だけ呼ばれる。
    fn close(&mut self) -> Result<(), ConvertError>;
}

/// 所有権を持つフレーム列。必要に応じてリサイズする。
///
/// ソースは [`FrameSequence::close`] か、呼ばれなかった場合は drop 時に解放される。
pub struct FrameSequence {
    source: Box<dyn FrameSource>,
    size: (u32, u32),
    released: bool,
}

impl FrameSequence {
    pub fn new(source: impl FrameSource + 'static) -> Self {
        let size = (source.info().width, source.info().height);
        Self {
            source: Box::new(source),
            size,
            released: false,
        }
    }

    pub fn info(&self) -> &StreamInfo {
        self.source.info()
    }

    /// このフレーム列が返すフレームのサイズ。
    pub fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    /// 縦横を `factor` 倍にする。1.0 ちょうどの場合は何もしない。
    pub fn resized(mut self, factor: f64) -> Self {
        if factor == 1.0 {
            return self;
        }
        self.size = scaled_dimensions(self.size, factor);
        debug!(factor, width = self.size.0, height = self.size.1, "Frames will be resized");
        self
    }

    pub fn next_frame(&mut self) -> Result<Option<RgbaImage>, ConvertError> {
        if self.released {
            return Ok(None);
        }
        let Some(frame) = self.source.read_frame()? else {
            return Ok(None);
        };

        let (width, height) = self.size;
        if frame.dimensions() == (width, height) {
            Ok(Some(frame))
        } else {
            Ok(Some(image::imageops::resize(
                &frame,
                width,
                height,
                FilterType::Lanczos3,
            )))
        }
    }

    /// ソースを即座に解放し、失敗した場合はエラーを返す。
    pub fn close(mut self) -> Result<(), ConvertError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), ConvertError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.source.close()
    }
}

impl Drop for FrameSequence {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to release frame sequence");
        }
    }
}

/// 縦横それぞれ `floor(dimension * factor)` を計算する。最小 1 ピクセル。
pub fn scaled_dimensions((width, height): (u32, u32), factor: f64) -> (u32, u32) {
    let scale = |d: u32| ((d as f64 * factor).floor() as u32).max(1);
    (scale(width), scale(height))
}
