//! 動画をアニメーション GIF に変換するライブラリ。
//!
//! デコードとストリーム情報の取得は `ffmpeg`/`ffprobe` コマンドで行う。
//! フレームは image クレートでリサイズし、指定のフレームレートに変換してから
//! [`GifWriter`] に渡す。`ffmpeg -version` の出力を一度だけ調べ、
//! ライターに渡すハードウェアアクセラレーションのヒントを決める。
//!
//! ```no_run
//! use convert_core::SourcePath;
//! use gif_converter::{EncoderKind, FfmpegTools, FfmpegVersionProbe, GifOptions, GifPipeline};
//!
//! let tools = FfmpegTools::default();
//! let source = SourcePath::new("clip.mp4")?;
//! let pipeline = GifPipeline::new(
//!     Box::new(FfmpegVersionProbe::new(&tools.ffmpeg)),
//!     EncoderKind::Ffmpeg.writer(&tools.ffmpeg, 10),
//! );
//! let frames = gif_converter::open_video(&source, &tools)?;
//! pipeline.run(frames, &source.destination("gif"), &GifOptions::default())?;
//! # Ok::<(), convert_core::ConvertError>(())
//! ```

mod ffmpeg;
mod frames;
mod pipeline;
mod probe;
mod resample;
mod writer;

pub use ffmpeg::{FfmpegDecoder, FfmpegTools, ToolError, open_video, probe_stream};
pub use frames::{FrameSequence, FrameSource, StreamInfo, scaled_dimensions};
pub use pipeline::{GifOptions, GifPipeline, GifReport};
pub use probe::{
    AccelHints, AccelerationProfile, CapabilityProbe, FfmpegVersionProbe, HwAccelPolicy,
    ParsePolicyError, Vendor, detect_acceleration,
};
pub use resample::Resampled;
pub use writer::{
    EncodeSettings, EncoderKind, FfmpegGifWriter, FrameIter, GifWriter, NativeGifWriter,
    ParseEncoderError,
};
