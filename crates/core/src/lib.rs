//! 画像と動画の変換で共通して使う型。
//!
//! どちらの変換も入力を [`SourcePath`] で一度だけ検証し、失敗は [`ConvertError`] で返す。
//! 終了コードへの変換は呼び出し側が行う。

mod error;
mod path;

pub use error::{BoxError, ConvertError, Result};
pub use path::{SourcePath, default_destination};
