//! GIF エンコーダー。
//!
//! どちらもフレームをパレットに減色するが、処理する場所が異なる。

use std::{
    ffi::OsString,
    fmt,
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    str::FromStr,
};

use convert_core::ConvertError;
use image::{
    Delay, Frame, RgbaImage,
    codecs::gif::{GifEncoder, Repeat},
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ffmpeg::FfmpegProcess;

/// 全フレームから 1 つのパレットを生成し、各フレームをそのパレットに割り当てる
const PALETTE_FILTER: &str = "[0:v]split[a][b];[a]palettegen[p];[b][p]paletteuse";

pub type FrameIter<'a> = dyn Iterator<Item = Result<RgbaImage, ConvertError>> + 'a;

/// [`GifWriter`] に渡すパラメーター。
#[derive(Debug, Clone)]
pub struct EncodeSettings<'a> {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// ffmpeg にそのまま渡すフラグ。中身は解釈しない
    pub hints: &'a [String],
}

pub trait GifWriter {
    /// `frames` を `dest` にエンコードし、書き込んだフレーム数を返す。
    fn write_gif(
        &self,
        dest: &Path,
        frames: &mut FrameIter<'_>,
        settings: &EncodeSettings<'_>,
    ) -> Result<usize, ConvertError>;
}

/// image クレートでプロセス内でエンコードする。
#[derive(Debug, Clone)]
pub struct NativeGifWriter {
    speed: i32,
}

impl NativeGifWriter {
    /// `speed` は 1 (高画質) から 30 (高速) の範囲に丸められる。
    pub fn new(speed: i32) -> Self {
        Self {
            speed: speed.clamp(1, 30),
        }
    }
}

impl Default for NativeGifWriter {
    fn default() -> Self {
        Self::new(10)
    }
}

impl GifWriter for NativeGifWriter {
    fn write_gif(
        &self,
        dest: &Path,
        frames: &mut FrameIter<'_>,
        settings: &EncodeSettings<'_>,
    ) -> Result<usize, ConvertError> {
        if !settings.hints.is_empty() {
            debug!(hints = ?settings.hints, "In-process encoder ignores toolchain hints");
        }

        let file = File::create(dest).map_err(|e| ConvertError::encode(dest, e))?;
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), self.speed);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| ConvertError::encode(dest, e))?;

        let delay = Delay::from_numer_denom_ms(1000, settings.fps.max(1));
        let mut written = 0;
        for frame in frames {
            let frame = frame?;
            encoder
                .encode_frame(Frame::from_parts(frame, 0, 0, delay))
                .map_err(|e| ConvertError::encode(dest, e))?;
            written += 1;
        }

        // drop 時にトレーラーが書き込まれ、ファイルがフラッシュされる
        drop(encoder);
        Ok(written)
    }
}

/// RGBA の生フレームを ffmpeg の palettegen/paletteuse にパイプで渡す。
#[derive(Debug, Clone)]
pub struct FfmpegGifWriter {
    program: PathBuf,
}

impl FfmpegGifWriter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn encoder_args(dest: &Path, settings: &EncodeSettings<'_>) -> Vec<OsString> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    args.push(format!("{}x{}", settings.width, settings.height));
    args.push("-framerate".to_string());
    args.push(settings.fps.to_string());
    args.extend(settings.hints.iter().cloned());
    args.extend(
        ["-i", "-", "-filter_complex", PALETTE_FILTER, "-loop", "0", "-f", "gif"]
            .into_iter()
            .map(String::from),
    );

    let mut args: Vec<OsString> = args.into_iter().map(OsString::from).collect();
    args.push(dest.as_os_str().to_owned());
    args
}

impl GifWriter for FfmpegGifWriter {
    fn write_gif(
        &self,
        dest: &Path,
        frames: &mut FrameIter<'_>,
        settings: &EncodeSettings<'_>,
    ) -> Result<usize, ConvertError> {
        // フレームが無ければ ffmpeg を起動せず、出力先も作らない
        let first = match frames.next() {
            Some(frame) => frame?,
            None => return Ok(0),
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(encoder_args(dest, settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null());

        let mut process = FfmpegProcess::spawn(&mut cmd).map_err(|e| ConvertError::encode(dest, e))?;
        let Some(stdin) = process.take_stdin() else {
            return Err(ConvertError::encode(dest, "ffmpeg stdin unavailable"));
        };
        let mut stdin = BufWriter::new(stdin);

        let mut written = 0;
        let mut pipe_error = None;
        for frame in std::iter::once(Ok(first)).chain(frames) {
            let frame = frame?;
            if frame.dimensions() != (settings.width, settings.height) {
                return Err(ConvertError::encode(
                    dest,
                    format!(
                        "frame {written} is {}x{}, expected {}x{}",
                        frame.width(),
                        frame.height(),
                        settings.width,
                        settings.height
                    ),
                ));
            }
            if let Err(e) = stdin.write_all(frame.as_raw()) {
                pipe_error = Some(e);
                break;
            }
            written += 1;
        }
        if pipe_error.is_none() {
            pipe_error = stdin.flush().err();
        }
        drop(stdin);

        // ffmpeg が途中で入力を閉じた場合、原因は終了コードと stderr に出る
        process.finish().map_err(|e| ConvertError::encode(dest, e))?;
        if let Some(e) = pipe_error {
            warn!(error = %e, "ffmpeg closed its input early");
            return Err(ConvertError::encode(dest, e));
        }

        Ok(written)
    }
}

/// 使用する [`GifWriter`] の種類。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncoderKind {
    #[default]
    Ffmpeg,
    Native,
}

impl EncoderKind {
    /// ライターを作成する。`speed` は native エンコーダーにのみ影響する。
    pub fn writer(self, ffmpeg: &Path, speed: i32) -> Box<dyn GifWriter> {
        match self {
            EncoderKind::Ffmpeg => Box::new(FfmpegGifWriter::new(ffmpeg)),
            EncoderKind::Native => Box::new(NativeGifWriter::new(speed)),
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderKind::Ffmpeg => write!(f, "ffmpeg"),
            EncoderKind::Native => write!(f, "native"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown encoder `{0}` (expected ffmpeg or native)")]
pub struct ParseEncoderError(String);

impl FromStr for EncoderKind {
    type Err = ParseEncoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(EncoderKind::Ffmpeg),
            "native" => Ok(EncoderKind::Native),
            _ => Err(ParseEncoderError(s.to_string())),
        }
    }
}
