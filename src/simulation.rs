//! # Simulation モジュール
//!
//! 2フェーズ法による昼光シミュレーションの実行手順を管理します。
//!
//! 計算そのものはすべて外部ツール（Radiance）が行い、このモジュールは
//! ファイル名の決定、コマンドの組み立て、実行順序の制御を担当します。
//!
//! ## 処理順序
//!
//! 1. **初期化**: 時間刻みの検証、出力ディレクトリと白色天空ファイルの作成、
//!    CPU数の取得（1回のみ）
//! 2. **天空行列**: 気象ファイルを .wea に揃え、`gendaymtx | rmtxop` で作成
//! 3. **センサー点ごと**: DC行列を作成（既存なら再利用）し、天空行列と乗算
//! 4. **後片付け**: `dc/` と `res/` の空ファイルを削除
//!
//! 外部コマンドの失敗は既定では警告として記録し、処理を続行します。
//! `strict` 設定時はその場でエラーとして中断します。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::error::{Result, TwoPhaseError};
use crate::models::sky::{relocate_wea, sky_matrix_path, sky_matrix_pipeline};
use crate::models::*;
use crate::process::Pipeline;
use crate::project::{ConfigError, ProjectConfig};

/// センサー点ファイル1つ分の処理結果
#[derive(Debug, Clone, PartialEq)]
pub struct PointOutcome {
    pub points: PathBuf,
    pub sensor_count: usize,
    pub dc_path: PathBuf,
    /// 既存のDC行列を再利用した
    pub dc_reused: bool,
    pub result_path: PathBuf,
    /// このファイルに関する外部コマンドがすべて成功した
    pub succeeded: bool,
}

/// 実行全体の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub sky_matrix: PathBuf,
    pub points: Vec<PointOutcome>,
    /// 失敗した外部コマンド
    pub failed_commands: Vec<String>,
    /// 削除した空ファイル
    pub removed_files: Vec<PathBuf>,
}

impl RunSummary {
    pub fn print(&self) {
        println!("=== 実行結果 ===");
        println!("天空行列: {}", self.sky_matrix.display());
        for outcome in &self.points {
            let dc_note = if outcome.dc_reused { " (再利用)" } else { "" };
            let status = if outcome.succeeded { "OK" } else { "失敗" };
            println!(
                "  [{}] {} ({}点) -> {}{} / {}",
                status,
                outcome.points.display(),
                outcome.sensor_count,
                outcome.dc_path.display(),
                dc_note,
                outcome.result_path.display()
            );
        }
        if !self.failed_commands.is_empty() {
            println!("失敗したコマンド: {}件", self.failed_commands.len());
            for cmd in &self.failed_commands {
                println!("  {}", cmd);
            }
        }
        if !self.removed_files.is_empty() {
            println!("削除した空ファイル: {}件", self.removed_files.len());
        }
    }
}

pub struct TwoPhaseEngine<R: IToolRunner> {
    pub params: SkyParams,
    pub layout: OutputLayout,
    pub project: String,
    pub octree: PathBuf,
    pub options: PathBuf,
    pub climate: ClimateSource,
    pub point_files: Vec<PointFile>,
    /// rfluxmtx のプロセス数
    pub nproc: usize,
    pub strict: bool,
    pub copy_wea: bool,
    pub verbose_level: u8,

    runner: R,
    failed_commands: Vec<String>,
}

impl<R: IToolRunner> TwoPhaseEngine<R> {
    /// 設定を検証してエンジンを作成
    ///
    /// ファイルシステムには何も書き込みません。
    pub fn new(config: ProjectConfig, runner: R, verbose_level: u8) -> Result<Self> {
        config.validate()?;
        let params = config.sky_params()?;
        let project = config.project_name();

        let octree = required(config.inputs.octree, "octree")?;
        let climate = ClimateSource::new(required(config.inputs.climate, "climate")?)?;
        let options = required(config.inputs.options, "options")?;

        let nproc = match config.run.nproc {
            Some(n) => n,
            None => detect_nproc(),
        };

        Ok(Self {
            params,
            layout: OutputLayout::new(config.run.work_dir),
            project,
            octree,
            options,
            climate,
            point_files: config.inputs.points.into_iter().map(PointFile::new).collect(),
            nproc,
            strict: config.run.strict,
            copy_wea: config.run.copy_wea,
            verbose_level,
            runner,
            failed_commands: Vec::new(),
        })
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn initialize(&mut self) -> Result<()> {
        info!(
            "プロジェクト: {} ({}, {}, MF{}, 時間刻み{}分, 回転{}度)",
            self.project,
            self.params.mode,
            self.params.component,
            self.params.subdivision,
            self.params.timestep,
            self.params.rotation
        );
        debug!("年間時間刻み数: {}", self.params.timestep.steps_per_year());
        debug!("rfluxmtx プロセス数: {}", self.nproc);

        if !self.options.exists() {
            return Err(TwoPhaseError::FileNotFound(self.options.clone()));
        }
        let options = fs::read_to_string(&self.options).map_err(|e| TwoPhaseError::io(&self.options, e))?;
        debug!("ambient パラメータ: {}", options.trim());

        if self.runner.is_dry_run() {
            return Ok(());
        }

        self.layout.ensure_dirs()?;
        self.layout.write_whitesky(self.params.subdivision)?;
        Ok(())
    }

    /// 気象ファイルを準備して天空行列を作成し、そのパスを返す
    pub fn make_sky_matrix(&mut self) -> Result<PathBuf> {
        match self.climate.preparation(&self.layout) {
            ClimatePreparation::Convert(pipeline) => {
                info!("気象ファイルを変換: {}", self.climate.path.display());
                self.execute(&pipeline)?;
            }
            ClimatePreparation::Relocate { from, to } => {
                if self.runner.is_dry_run() {
                    info!("[dry-run] {} -> {}", from.display(), to.display());
                } else {
                    relocate_wea(&from, &to, self.copy_wea)?;
                }
            }
            ClimatePreparation::InPlace => {
                debug!("気象ファイルは作業ディレクトリにあります");
            }
        }

        let wea = self.climate.wea_path(&self.layout);
        let smx = sky_matrix_path(&self.layout, &self.climate.name, &self.params);
        info!("天空行列を作成: {}", smx.display());
        self.execute(&sky_matrix_pipeline(&wea, &smx, &self.params))?;
        Ok(smx)
    }

    /// 1つのセンサー点ファイルについてDC行列と結果を作成
    pub fn run_point(&mut self, points: &PointFile, sky_matrix: &Path) -> Result<PointOutcome> {
        let sensor_count = points.sensor_count()?;
        info!("{}: センサー点数 {}", points.path.display(), sensor_count);

        let job = PointJob {
            project: &self.project,
            octree: &self.octree,
            options: &self.options,
            points,
            params: &self.params,
        };
        let dc_path = job.dc_path(&self.layout);
        let result_path = job.result_path(&self.layout);
        let dc_pipeline = job.dc_pipeline(&self.layout, self.nproc, sensor_count);
        let result_pipeline = job.result_pipeline(&self.layout, sky_matrix);

        // 空のDC行列はキャッシュとみなさない
        let dc_reused = fs::metadata(&dc_path).map(|m| m.len() > 0).unwrap_or(false);
        let mut succeeded = true;
        if dc_reused {
            info!("既存のDC行列を使用します: {}", dc_path.display());
        } else {
            succeeded &= self.execute(&dc_pipeline)?;
        }

        succeeded &= self.execute(&result_pipeline)?;
        if self.verbose_level > 0 {
            info!("結果: {}", result_path.display());
        }

        Ok(PointOutcome {
            points: points.path.clone(),
            sensor_count,
            dc_path,
            dc_reused,
            result_path,
            succeeded,
        })
    }

    /// `dc/` と `res/` の空ファイルを削除
    pub fn sweep(&mut self) -> Result<Vec<PathBuf>> {
        if self.runner.is_dry_run() {
            return Ok(Vec::new());
        }
        self.layout.sweep_empty_outputs()
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        info!("=== 2フェーズ計算開始 ===");

        let processed = self.run_all_points();

        // 中断時も失敗したツールが残した空ファイルを削除する
        let swept = self.sweep();
        let (sky_matrix, outcomes) = processed?;
        let removed_files = swept?;

        info!("=== 2フェーズ計算完了 ===");
        if !self.failed_commands.is_empty() {
            warn!("{}件の外部コマンドが失敗しました", self.failed_commands.len());
        }

        Ok(RunSummary {
            sky_matrix,
            points: outcomes,
            failed_commands: self.failed_commands.clone(),
            removed_files,
        })
    }

    fn run_all_points(&mut self) -> Result<(PathBuf, Vec<PointOutcome>)> {
        let sky_matrix = self.make_sky_matrix()?;

        let point_files = self.point_files.clone();
        let mut outcomes = Vec::with_capacity(point_files.len());
        for (i, points) in point_files.iter().enumerate() {
            trace!("センサー点ファイル {}/{}", i + 1, point_files.len());
            outcomes.push(self.run_point(points, &sky_matrix)?);
        }
        Ok((sky_matrix, outcomes))
    }

    /// 生成されるファイル名の一覧を表示
    pub fn print_plan(&self) {
        println!("=== 出力予定 ===");
        println!("rfluxmtx プロセス数: {}", self.nproc);
        println!("気象データ: {}", self.climate.wea_path(&self.layout).display());
        println!(
            "天空行列: {}",
            sky_matrix_path(&self.layout, &self.climate.name, &self.params).display()
        );
        for points in &self.point_files {
            let job = PointJob {
                project: &self.project,
                octree: &self.octree,
                options: &self.options,
                points,
                params: &self.params,
            };
            println!("  {}", points.path.display());
            println!("    DC行列: {}", job.dc_path(&self.layout).display());
            println!("    結果:   {}", job.result_path(&self.layout).display());
        }
    }

    /// パイプラインを実行し、成功したかどうかを返す
    fn execute(&mut self, pipeline: &Pipeline) -> Result<bool> {
        let failure = match self.runner.run(pipeline) {
            Ok(report) if report.success() => return Ok(true),
            Ok(report) => TwoPhaseError::ToolFailed {
                command: format!("{} [{}]", report.command, report.failures().join(", ")),
            },
            Err(e @ TwoPhaseError::Spawn { .. }) => e,
            Err(e) => return Err(e),
        };

        if self.strict {
            return Err(failure);
        }
        warn!("{}", failure);
        self.failed_commands.push(failure.to_string());
        Ok(false)
    }
}

fn required(path: Option<PathBuf>, what: &str) -> Result<PathBuf> {
    path.ok_or_else(|| ConfigError::Validation(format!("{} file is not specified", what)).into())
}

/// 論理CPU数
fn detect_nproc() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            warn!("CPU数を取得できません ({}). 1を使用します", e);
            1
        }
    }
}
