//! ffmpeg/ffprobe の子プロセス管理。
//!
//! ストリーム情報の取得、フレームのデコード、stderr の読み出しを扱う。

use std::{
    ffi::OsString,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
};

use convert_core::{ConvertError, SourcePath};
use image::RgbaImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::frames::{FrameSequence, FrameSource, StreamInfo};

/// エラーメッセージに含める stderr の行数
const STDERR_TAIL_LINES: usize = 8;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("unexpected output from {program}: {reason}")]
    Output { program: String, reason: String },
}

/// 外部コマンドのパス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// stderr を別スレッドで読み続ける ffmpeg 子プロセス。
///
/// stdout だけを読んでいると stderr のパイプが詰まってデッドロックするため、
/// stderr は常にバックグラウンドで読み出す。
pub(crate) struct FfmpegProcess {
    program: String,
    child: Child,
    stderr_thread: Option<JoinHandle<String>>,
}

impl FfmpegProcess {
    pub(crate) fn spawn(cmd: &mut Command) -> Result<Self, ToolError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        debug!(command = ?cmd, "Spawning ffmpeg process");

        cmd.stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stderr_thread = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        Ok(Self {
            program,
            child,
            stderr_thread,
        })
    }

    pub(crate) fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub(crate) fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// 終了を待ち、0 以外の終了コードを [`ToolError::Failed`] にする。
    pub(crate) fn finish(mut self) -> Result<(), ToolError> {
        let status = self.child.wait().map_err(|source| ToolError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let stderr = self.join_stderr();

        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                program: self.program.clone(),
                status,
                stderr: stderr_tail(&stderr),
            })
        }
    }

    /// 実行中なら kill し、終了を回収する。
    pub(crate) fn terminate(mut self) {
        self.kill_and_reap();
    }

    fn kill_and_reap(&mut self) {
        if let Ok(None) = self.child.try_wait()
            && let Err(e) = self.child.kill()
        {
            warn!(program = %self.program, error = %e, "Failed to kill ffmpeg process");
        }
        if let Err(e) = self.child.wait() {
            warn!(program = %self.program, error = %e, "Failed to reap ffmpeg process");
        }
        self.join_stderr();
    }

    fn join_stderr(&mut self) -> String {
        self.stderr_thread
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if self.stderr_thread.is_some() {
            self.kill_and_reap();
        }
    }
}

/// stderr の末尾の空でない行だけを残す。
pub(crate) fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// 最初の映像ストリームのサイズ、フレームレート、長さを取得する。
pub fn probe_stream(ffprobe: &Path, source: &Path) -> Result<StreamInfo, ToolError> {
    let program = ffprobe.display().to_string();
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate:format=duration",
            "-of",
            "json",
            "-i",
        ])
        .arg(source)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status,
            stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
        });
    }

    parse_probe_output(source, &output.stdout).map_err(|reason| ToolError::Output { program, reason })
}

fn parse_probe_output(source: &Path, json: &[u8]) -> Result<StreamInfo, String> {
    let output: ProbeOutput = serde_json::from_slice(json).map_err(|e| e.to_string())?;

    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no dimensions".to_string()),
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

    let duration = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(StreamInfo {
        source: source.to_path_buf(),
        width,
        height,
        frame_rate,
        duration,
    })
}

/// `30000/1001` のような ffprobe の分数表記をパースする。`0/0` は不明を表す。
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// ffmpeg が stdout に書き出す RGBA の生フレームを読むフレームソース。
pub struct FfmpegDecoder {
    info: StreamInfo,
    process: Option<FfmpegProcess>,
    stdout: Option<ChildStdout>,
}

impl FfmpegDecoder {
    pub fn spawn(ffmpeg: &Path, info: StreamInfo) -> Result<Self, ToolError> {
        let mut cmd = Command::new(ffmpeg);
        cmd.args(decoder_args(&info))
            .stdin(Stdio::null())
            .stdout(Stdio::piped());

        let mut process = FfmpegProcess::spawn(&mut cmd)?;
        let stdout = process.take_stdout();

        Ok(Self {
            info,
            process: Some(process),
            stdout,
        })
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 4
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        self.stdout = None;
        match self.process.take() {
            Some(process) => process
                .finish()
                .map_err(|e| ConvertError::decode(&self.info.source, e)),
            None => Ok(()),
        }
    }
}

fn decoder_args(info: &StreamInfo) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(info.source.as_os_str().to_owned());
    args.extend(["-map", "0:v:0", "-an"].into_iter().map(OsString::from));
    // 可変フレームレートの入力も StreamInfo と同じレートの固定フレームレートで出力させる
    if let Some(rate) = info.frame_rate {
        args.push(OsString::from("-r"));
        args.push(OsString::from(rate.to_string()));
    }
    args.extend(
        ["-f", "rawvideo", "-pix_fmt", "rgba", "-"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

impl FrameSource for FfmpegDecoder {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frame(&mut self) -> Result<Option<RgbaImage>, ConvertError> {
        let frame_len = self.frame_len();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; frame_len];
        let filled =
            read_full(stdout, &mut buf).map_err(|e| ConvertError::decode(&self.info.source, e))?;

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < frame_len {
            self.finish()?;
            return Err(ConvertError::decode(
                &self.info.source,
                format!("truncated frame: got {filled} of {frame_len} bytes"),
            ));
        }

        RgbaImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| ConvertError::decode(&self.info.source, "frame buffer size mismatch"))
    }

    fn close(&mut self) -> Result<(), ConvertError> {
        self.stdout = None;
        if let Some(process) = self.process.take() {
            process.terminate();
            debug!(source = %self.info.source.display(), "Decoder released");
        }
        Ok(())
    }
}

/// `buf` が埋まるか EOF まで読み、読んだバイト数を返す。
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// `source` のストリーム情報を取得し、デコードを開始する。
pub fn open_video(source: &SourcePath, tools: &FfmpegTools) -> Result<FrameSequence, ConvertError> {
    let path = source.as_path();
    let info = probe_stream(&tools.ffprobe, path).map_err(|e| ConvertError::decode(path, e))?;
    debug!(
        source = %path.display(),
        width = info.width,
        height = info.height,
        frame_rate = ?info.frame_rate,
        duration = ?info.duration,
        "Video stream probed"
    );

    let decoder = FfmpegDecoder::spawn(&tools.ffmpeg, info).map_err(|e| ConvertError::decode(path, e))?;
    Ok(FrameSequence::new(decoder))
}
