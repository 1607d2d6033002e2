//! 出力側のタイムスタンプでソースを間引き、フレームレートを変換する。

use convert_core::ConvertError;
use image::RgbaImage;

use crate::frames::FrameSequence;

/// フレーム境界ちょうどのタイムスタンプが丸め誤差で手前にずれるのを防ぐ
const EPSILON: f64 = 1e-6;

/// [`FrameSequence`] を固定フレームレートに変換するイテレーター。
///
/// 出力の `i` 枚目は、タイムスタンプが `i / fps` 以下の最後のソースフレームになる。
/// ソースが尽きるかエラーになった時点で終了する。
pub struct Resampled<'a> {
    frames: &'a mut FrameSequence,
    /// 出力 1 フレームあたりに進むソースフレーム数
    step: f64,
    next_target: u64,
    source_index: Option<u64>,
    current: Option<RgbaImage>,
    done: bool,
}

impl<'a> Resampled<'a> {
    pub fn new(frames: &'a mut FrameSequence, fps: u32) -> Self {
        let step = match frames.info().frame_rate {
            Some(rate) if fps > 0 => rate / fps as f64,
            _ => 1.0,
        };
        Self {
            frames,
            step,
            next_target: 0,
            source_index: None,
            current: None,
            done: false,
        }
    }

    fn source_index_for(&self, target: u64) -> u64 {
        (target as f64 * self.step + EPSILON).floor() as u64
    }
}

impl Iterator for Resampled<'_> {
    type Item = Result<RgbaImage, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let wanted = self.source_index_for(self.next_target);
        while self.source_index.is_none_or(|i| i < wanted) {
            match self.frames.next_frame() {
                Ok(Some(frame)) => {
                    self.current = Some(frame);
                    self.source_index = Some(self.source_index.map_or(0, |i| i + 1));
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        self.next_target += 1;

        // 次の出力も同じソースフレームを指す場合だけ複製する
        let reused = self.source_index_for(self.next_target) == wanted;
        let frame = if reused {
            self.current.clone()
        } else {
            self.current.take()
        };
        frame.map(Ok)
    }
}
