use std::path::{Path, PathBuf};

use crate::{ConvertError, Result};

/// 変換開始時に存在を確認した入力パス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath(PathBuf);

impl SourcePath {
    /// `path` の存在を確認する。変換処理での存在確認はここだけで行う。
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(ConvertError::InputNotFound(path));
        }
        Ok(Self(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// 出力先が指定されなかった場合に使うパス。
    pub fn destination(&self, extension: &str) -> PathBuf {
        default_destination(&self.0, extension)
    }
}

impl AsRef<Path> for SourcePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// ディレクトリはそのままに、`input` の拡張子を `extension` に置き換える。
pub fn default_destination(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}
