use std::path::PathBuf;
use thiserror::Error;

use crate::project::ConfigError;

pub type Result<T> = std::result::Result<T, TwoPhaseError>;

/// ワークフロー実行時のエラー
#[derive(Debug, Error)]
pub enum TwoPhaseError {
    #[error("無効な時間刻み: {0}分 (60の約数または倍数を指定してください)")]
    InvalidTimestep(u32),

    #[error("未対応の気象ファイル形式: {} (.epw または .wea)", .0.display())]
    UnsupportedClimate(PathBuf),

    #[error("ファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/Oエラー {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("外部コマンド `{program}` の起動に失敗しました: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("外部コマンドが失敗しました: {command}")]
    ToolFailed { command: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TwoPhaseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TwoPhaseError::Io {
            path: path.into(),
            source,
        }
    }
}
