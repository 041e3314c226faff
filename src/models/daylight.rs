use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{Result, TwoPhaseError};
use crate::models::common::{CalcMode, SkyParams};
use crate::models::layout::OutputLayout;
use crate::process::{Pipeline, ToolCommand};

/// センサー点ファイル
///
/// 1行につき1センサー（位置と方向ベクトル）を記述したテキストファイルです。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointFile {
    pub path: PathBuf,
    /// 拡張子を除いたファイル名（出力ファイル名に使用）
    pub name: String,
}

impl PointFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    /// センサー数（改行の数、`wc -l` と同じ数え方）
    pub fn sensor_count(&self) -> Result<usize> {
        count_lines(&self.path)
    }
}

pub fn count_lines(path: &Path) -> Result<usize> {
    let file = File::open(path).map_err(|e| TwoPhaseError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; 8192];
    let mut count = 0;
    loop {
        let n = reader.read(&mut buf).map_err(|e| TwoPhaseError::io(path, e))?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count();
    }
    Ok(count)
}

/// 1つのセンサー点ファイルに対する計算ジョブ
#[derive(Debug, Clone)]
pub struct PointJob<'a> {
    pub project: &'a str,
    pub octree: &'a Path,
    pub options: &'a Path,
    pub points: &'a PointFile,
    pub params: &'a SkyParams,
}

impl<'a> PointJob<'a> {
    /// DC行列のパス `dc/<prj>-<pts>-MF<分割>[-d].dc`
    pub fn dc_path(&self, layout: &OutputLayout) -> PathBuf {
        layout.dc_dir().join(format!(
            "{}-{}-MF{}{}.dc",
            self.project,
            self.points.name,
            self.params.subdivision,
            self.params.component.suffix()
        ))
    }

    /// 結果ファイルのパス `res/<prj>-<pts>-MF<分割>-t<刻み>-<回転>[-d].<ill|irr>`
    pub fn result_path(&self, layout: &OutputLayout) -> PathBuf {
        layout.res_dir().join(format!(
            "{}-{}-MF{}-t{}-{:03}{}.{}",
            self.project,
            self.points.name,
            self.params.subdivision,
            self.params.timestep,
            self.params.rotation,
            self.params.component.suffix(),
            self.params.mode.extension()
        ))
    }

    /// `rfluxmtx ... | rmtxop -c ...` でDC行列を作成するパイプライン
    pub fn dc_pipeline(
        &self,
        layout: &OutputLayout,
        nproc: usize,
        sensor_count: usize,
    ) -> Pipeline {
        let mut rfluxmtx = ToolCommand::new("rfluxmtx")
            .arg("-faf")
            .arg("-n")
            .arg(nproc.to_string())
            .arg(format!("@{}", self.options.display()));
        if self.params.component.is_direct() {
            rfluxmtx = rfluxmtx.args(["-ab", "1"]);
        }
        rfluxmtx = rfluxmtx
            .arg("-I+")
            .arg("-y")
            .arg(sensor_count.to_string())
            .arg("-")
            .path_arg(&layout.whitesky_path())
            .arg("-i")
            .path_arg(self.octree);

        let rmtxop = ToolCommand::new("rmtxop")
            .arg("-c")
            .args(self.params.mode.dc_weights().to_args())
            .arg("-");

        Pipeline::new(rfluxmtx)
            .pipe(rmtxop)
            .stdin_from(&self.points.path)
            .stdout_to(self.dc_path(layout))
    }

    /// `rmtxop DC SMX | rmtxop -fa [-s 179] -` で結果を作成するパイプライン
    pub fn result_pipeline(&self, layout: &OutputLayout, sky_matrix: &Path) -> Pipeline {
        let multiply = ToolCommand::new("rmtxop")
            .path_arg(&self.dc_path(layout))
            .path_arg(sky_matrix);

        let mut sum = ToolCommand::new("rmtxop").arg("-fa");
        if self.params.mode == CalcMode::Illuminance {
            // W/m2 -> lux の発光効率
            sum = sum.args(["-s", "179"]);
        }
        sum = sum.arg("-");

        Pipeline::new(multiply)
            .pipe(sum)
            .stdout_to(self.result_path(layout))
    }
}
