use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::TwoPhaseError;
use crate::models::{SkyParams, Timestep};

/// プロジェクトメタデータ
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectMeta {
    pub name: String,
    pub description: String,
}

/// 入力ファイル
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    /// シーンのoctreeファイル
    pub octree: Option<PathBuf>,
    /// 気象ファイル (.epw / .wea)
    pub climate: Option<PathBuf>,
    /// rfluxmtx の ambient パラメータファイル
    pub options: Option<PathBuf>,
    /// センサー点ファイル
    pub points: Vec<PathBuf>,
}

/// 天空設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SkyConfig {
    /// 天空分割係数
    pub subdivision: u32,
    /// 時間刻み（分）
    pub timestep_min: u32,
    /// 天空回転（北から西回り、度）
    pub rotation_deg: i32,
}

impl Default for SkyConfig {
    fn default() -> Self {
        Self {
            subdivision: 2,
            timestep_min: 60,
            rotation_deg: 0,
        }
    }
}

/// 計算モード
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModeConfig {
    pub irradiance: bool,
    pub direct: bool,
}

/// 実行設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// temp/ dc/ res/ を作成する作業ディレクトリ
    pub work_dir: PathBuf,
    /// rfluxmtx のプロセス数（未指定なら論理CPU数）
    pub nproc: Option<usize>,
    /// 外部コマンドの失敗で中断する
    pub strict: bool,
    /// .wea を移動せずにコピーする
    pub copy_wea: bool,
    /// コマンドを表示するだけで実行しない
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            nproc: None,
            strict: false,
            copy_wea: false,
            dry_run: false,
        }
    }
}

/// 完全なプロジェクト設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub meta: ProjectMeta,
    pub inputs: InputConfig,
    pub sky: SkyConfig,
    pub mode: ModeConfig,
    pub run: RunConfig,
}

impl ProjectConfig {
    /// YAMLファイルからプロジェクト設定を読み込み
    ///
    /// 入力ファイルはコマンドライン引数で後から補えるため、ここでは検証しません。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        let config: ProjectConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

        Ok(config)
    }

    /// 設定の検証
    pub fn validate(&self) -> Result<(), TwoPhaseError> {
        Timestep::new(self.sky.timestep_min)?;

        if self.sky.subdivision == 0 {
            return Err(ConfigError::Validation("subdivision must be at least 1".to_string()).into());
        }
        if self.inputs.octree.is_none() {
            return Err(ConfigError::Validation("octree file is not specified".to_string()).into());
        }
        if self.inputs.climate.is_none() {
            return Err(ConfigError::Validation("climate file is not specified".to_string()).into());
        }
        if self.inputs.options.is_none() {
            return Err(ConfigError::Validation("options file is not specified".to_string()).into());
        }
        if self.inputs.points.is_empty() {
            return Err(ConfigError::Validation("at least one points file is required".to_string()).into());
        }
        if self.run.nproc == Some(0) {
            return Err(ConfigError::Validation("nproc must be at least 1".to_string()).into());
        }

        Ok(())
    }

    /// 天空行列・結果ファイルのパラメータ
    pub fn sky_params(&self) -> Result<SkyParams, TwoPhaseError> {
        Ok(SkyParams::new(
            self.sky.subdivision,
            Timestep::new(self.sky.timestep_min)?,
            self.sky.rotation_deg,
            self.mode.irradiance,
            self.mode.direct,
        ))
    }

    /// プロジェクト名（octreeのファイル名から拡張子を除いたもの）
    pub fn project_name(&self) -> String {
        self.inputs
            .octree
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// プロジェクトの概要を表示
    pub fn print_summary(&self) {
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(未指定)".to_string())
        };

        println!("=== プロジェクト情報 ===");
        if !self.meta.name.is_empty() {
            println!("名前: {}", self.meta.name);
        }
        if !self.meta.description.is_empty() {
            println!("説明: {}", self.meta.description);
        }
        println!("プロジェクト名: {}", self.project_name());
        println!();

        println!("=== 入力 ===");
        println!("octree: {}", show(&self.inputs.octree));
        println!("気象ファイル: {}", show(&self.inputs.climate));
        println!("オプション: {}", show(&self.inputs.options));
        println!("センサー点ファイル: {}個", self.inputs.points.len());
        for p in &self.inputs.points {
            println!("  {}", p.display());
        }
        println!();

        println!("=== 天空・計算設定 ===");
        println!("天空分割係数: MF{}", self.sky.subdivision);
        println!("時間刻み: {}分", self.sky.timestep_min);
        println!("天空回転: {}度", self.sky.rotation_deg);
        println!("日射量計算: {}", self.mode.irradiance);
        println!("直達成分のみ: {}", self.mode.direct);
        println!("作業ディレクトリ: {}", self.run.work_dir.display());
    }
}

/// プロジェクト設定の読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("設定ファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("設定検証エラー: {0}")]
    Validation(String),
}
