use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TwoPhaseError};

/// 作業ディレクトリ配下の出力レイアウト
///
/// - `temp/`: 変換済み気象データ、天空行列、白色天空ファイル
/// - `dc/`: デイライト係数行列（キャッシュ）
/// - `res/`: 結果ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn dc_dir(&self) -> PathBuf {
        self.root.join("dc")
    }

    pub fn res_dir(&self) -> PathBuf {
        self.root.join("res")
    }

    pub fn whitesky_path(&self) -> PathBuf {
        self.temp_dir().join("whitesky.rad")
    }

    /// 出力ディレクトリをすべて作成
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.temp_dir(), self.dc_dir(), self.res_dir()] {
            fs::create_dir_all(&dir).map_err(|e| TwoPhaseError::io(&dir, e))?;
        }
        Ok(())
    }

    /// 地面と天空の発光源を定義した白色天空ファイルを書き出す
    pub fn write_whitesky(&self, subdivision: u32) -> Result<PathBuf> {
        let path = self.whitesky_path();
        fs::write(&path, whitesky_contents(subdivision)).map_err(|e| TwoPhaseError::io(&path, e))?;
        debug!("白色天空ファイルを作成: {}", path.display());
        Ok(path)
    }

    /// `dc/` と `res/` の空ファイルを削除し、削除したパスを返す
    pub fn sweep_empty_outputs(&self) -> Result<Vec<PathBuf>> {
        let mut removed = sweep_empty_files(&self.dc_dir())?;
        removed.extend(sweep_empty_files(&self.res_dir())?);
        Ok(removed)
    }
}

pub fn whitesky_contents(subdivision: u32) -> String {
    format!(
        "#@rfluxmtx h=u u=Y\n\
         void glow ground_glow 0 0 4 1 1 1 0\n\
         ground_glow source ground 0 0 4 0 0 -1 180\n\
         #@rfluxmtx h=r{} u=Y\n\
         void glow sky_glow 0 0 4 1 1 1 0\n\
         sky_glow source sky 0 0 4 0 0 1 180\n",
        subdivision
    )
}

/// ディレクトリ直下のサイズ0の通常ファイルを削除
pub fn sweep_empty_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !dir.is_dir() {
        return Ok(removed);
    }

    let entries = fs::read_dir(dir).map_err(|e| TwoPhaseError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TwoPhaseError::io(dir, e))?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| TwoPhaseError::io(&path, e))?;
        if metadata.is_file() && metadata.len() == 0 {
            info!("{} は空のため削除します", path.display());
            fs::remove_file(&path).map_err(|e| TwoPhaseError::io(&path, e))?;
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}
