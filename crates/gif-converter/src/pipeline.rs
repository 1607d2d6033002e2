use std::path::Path;

use convert_core::ConvertError;
use tracing::{debug, info, warn};

use crate::{
    frames::FrameSequence,
    probe::{AccelHints, CapabilityProbe, HwAccelPolicy},
    resample::Resampled,
    writer::{EncodeSettings, GifWriter},
};

/// GIF 画像の最大辺長。論理画面サイズが u16 で表現される。
const MAX_GIF_DIMENSION: u32 = u16::MAX as u32;

/// 1 回の変換のパラメーター。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GifOptions {
    /// 出力フレームレート
    pub fps: u32,
    /// 縦横共通の倍率。1.0 なら元のサイズのまま
    pub resize: f64,
    pub hwaccel: HwAccelPolicy,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            fps: 10,
            resize: 1.0,
            hwaccel: HwAccelPolicy::default(),
        }
    }
}

impl GifOptions {
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.fps == 0 {
            return Err(ConvertError::InvalidArgument(
                "fps must be greater than zero".to_string(),
            ));
        }
        if !self.resize.is_finite() || self.resize <= 0.0 {
            return Err(ConvertError::InvalidArgument(format!(
                "resize factor must be a positive number, got {}",
                self.resize
            )));
        }
        Ok(())
    }
}

/// 変換結果。
#[derive(Debug, Clone, PartialEq)]
pub struct GifReport {
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    /// ライターに渡したヒント。ベンダーが選ばれなかった場合は `None`
    pub hints: Option<AccelHints>,
}

/// リサイズ、能力検出、フレームレート変換、エンコードを順に行う。
///
/// 成功時も失敗時もフレーム列は必ず解放される。
pub struct GifPipeline {
    probe: Box<dyn CapabilityProbe>,
    writer: Box<dyn GifWriter>,
}

impl GifPipeline {
    pub fn new(probe: Box<dyn CapabilityProbe>, writer: Box<dyn GifWriter>) -> Self {
        Self { probe, writer }
    }

    pub fn run(
        &self,
        frames: FrameSequence,
        dest: &Path,
        options: &GifOptions,
    ) -> Result<GifReport, ConvertError> {
        options.validate()?;

        let mut frames = if options.resize != 1.0 {
            frames.resized(options.resize)
        } else {
            frames
        };
        let (width, height) = frames.dimensions();
        if width > MAX_GIF_DIMENSION || height > MAX_GIF_DIMENSION {
            return Err(ConvertError::InvalidArgument(format!(
                "resized frames would be {width}x{height}, GIF allows at most \
                 {MAX_GIF_DIMENSION}x{MAX_GIF_DIMENSION}"
            )));
        }
        let source = frames.info().source.clone();

        let hints = options.hwaccel.select(self.probe.as_ref());
        match &hints {
            Some(h) => info!(vendor = %h.vendor, "Encoding with hardware acceleration hints"),
            None => debug!("Encoding without hardware acceleration hints"),
        }

        let settings = EncodeSettings {
            fps: options.fps,
            width,
            height,
            hints: hints.as_ref().map(|h| h.args.as_slice()).unwrap_or_default(),
        };
        let written = self.writer.write_gif(
            dest,
            &mut Resampled::new(&mut frames, options.fps),
            &settings,
        )?;

        if let Err(e) = frames.close() {
            warn!(error = %e, "Failed to release frame sequence");
        }

        if written == 0 {
            return Err(ConvertError::decode(source, "no frames decoded"));
        }

        info!(
            output = %dest.display(),
            frames = written,
            width,
            height,
            "GIF written"
        );

        Ok(GifReport {
            frames: written,
            width,
            height,
            hints,
        })
    }
}
