use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TwoPhaseError};
use crate::models::common::{CalcMode, SkyParams};
use crate::models::layout::OutputLayout;
use crate::process::{Pipeline, ToolCommand};

/// 気象ファイルの形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClimateFormat {
    /// EnergyPlus Weather (.epw)、`epw2wea` で変換が必要
    Epw,
    /// Radiance weather (.wea)
    Wea,
}

impl ClimateFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| TwoPhaseError::UnsupportedClimate(path.to_path_buf()))?;
        if ext.eq_ignore_ascii_case("epw") {
            Ok(ClimateFormat::Epw)
        } else if ext.eq_ignore_ascii_case("wea") {
            Ok(ClimateFormat::Wea)
        } else {
            Err(TwoPhaseError::UnsupportedClimate(path.to_path_buf()))
        }
    }
}

/// 入力気象ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClimateSource {
    pub path: PathBuf,
    pub format: ClimateFormat,
    /// 拡張子を除いたファイル名
    pub name: String,
}

/// `temp/` へ .wea を用意するための処理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClimatePreparation {
    /// `epw2wea` で変換
    Convert(Pipeline),
    /// 既存の .wea を `temp/` へ移動（またはコピー）
    Relocate { from: PathBuf, to: PathBuf },
    /// すでに `temp/` にある
    InPlace,
}

impl ClimateSource {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = ClimateFormat::detect(&path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| TwoPhaseError::UnsupportedClimate(path.clone()))?;
        Ok(Self { path, format, name })
    }

    /// 変換後の .wea パス
    pub fn wea_path(&self, layout: &OutputLayout) -> PathBuf {
        layout.temp_dir().join(format!("{}.wea", self.name))
    }

    pub fn preparation(&self, layout: &OutputLayout) -> ClimatePreparation {
        let target = self.wea_path(layout);
        match self.format {
            ClimateFormat::Epw => ClimatePreparation::Convert(Pipeline::new(
                ToolCommand::new("epw2wea").path_arg(&self.path).path_arg(&target),
            )),
            ClimateFormat::Wea if same_file(&self.path, &target) => ClimatePreparation::InPlace,
            ClimateFormat::Wea => ClimatePreparation::Relocate {
                from: self.path.clone(),
                to: target,
            },
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// .wea を `temp/` へ配置する
///
/// `copy` が偽の場合は移動します。別デバイス間で rename できない場合は
/// コピー後に元ファイルを削除します。
pub fn relocate_wea(from: &Path, to: &Path, copy: bool) -> Result<()> {
    if copy {
        fs::copy(from, to).map_err(|e| TwoPhaseError::io(from, e))?;
        debug!("気象ファイルをコピー: {} -> {}", from.display(), to.display());
        return Ok(());
    }

    if fs::rename(from, to).is_err() {
        fs::copy(from, to).map_err(|e| TwoPhaseError::io(from, e))?;
        fs::remove_file(from).map_err(|e| TwoPhaseError::io(from, e))?;
    }
    debug!("気象ファイルを移動: {} -> {}", from.display(), to.display());
    Ok(())
}

/// 天空行列ファイルのパス
///
/// `temp/<気象名>-t<刻み>-MF<分割>-r<回転>[-d][-irr].smx`
pub fn sky_matrix_path(layout: &OutputLayout, climate_name: &str, params: &SkyParams) -> PathBuf {
    let irr = match params.mode {
        CalcMode::Irradiance => "-irr",
        CalcMode::Illuminance => "",
    };
    layout.temp_dir().join(format!(
        "{}-t{}-MF{}-r{:03}{}{}.smx",
        climate_name,
        params.timestep,
        params.subdivision,
        params.rotation,
        params.component.suffix(),
        irr
    ))
}

/// `gendaymtx | rmtxop -c ...` パイプライン
pub fn sky_matrix_pipeline(wea: &Path, output: &Path, params: &SkyParams) -> Pipeline {
    let mut gendaymtx = ToolCommand::new("gendaymtx").arg("-of");
    if params.component.is_direct() {
        gendaymtx = gendaymtx.arg("-d");
    }
    gendaymtx = gendaymtx
        .arg("-m")
        .arg(params.subdivision.to_string())
        .arg("-r")
        .arg(params.rotation.to_string());
    if params.mode == CalcMode::Irradiance {
        gendaymtx = gendaymtx.arg("-O1");
    }
    gendaymtx = gendaymtx.path_arg(wea);

    let rmtxop = ToolCommand::new("rmtxop")
        .arg("-c")
        .args(params.sky_weights().to_args())
        .arg("-");

    Pipeline::new(gendaymtx).pipe(rmtxop).stdout_to(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::Timestep;

    fn params(irr: bool, direct: bool) -> SkyParams {
        SkyParams::new(2, Timestep::new(60).unwrap(), 0, irr, direct)
    }

    #[test]
    fn test_climate_format_detection() {
        assert_eq!(ClimateFormat::detect(Path::new("a/b.epw")).unwrap(), ClimateFormat::Epw);
        assert_eq!(ClimateFormat::detect(Path::new("b.WEA")).unwrap(), ClimateFormat::Wea);
        assert!(matches!(
            ClimateFormat::detect(Path::new("b.csv")),
            Err(TwoPhaseError::UnsupportedClimate(_))
        ));
        assert!(ClimateFormat::detect(Path::new("noext")).is_err());
    }

    #[test]
    fn test_epw_conversion_command() {
        let layout = OutputLayout::new("w");
        let climate = ClimateSource::new("clim/GEN_Geneva.epw").unwrap();
        assert_eq!(climate.name, "GEN_Geneva");
        match climate.preparation(&layout) {
            ClimatePreparation::Convert(p) => {
                assert_eq!(p.to_string(), "epw2wea clim/GEN_Geneva.epw w/temp/GEN_Geneva.wea")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wea_is_relocated() {
        let layout = OutputLayout::new("w");
        let climate = ClimateSource::new("clim/site.wea").unwrap();
        assert_eq!(
            climate.preparation(&layout),
            ClimatePreparation::Relocate {
                from: PathBuf::from("clim/site.wea"),
                to: PathBuf::from("w/temp/site.wea"),
            }
        );
    }

    #[test]
    fn test_wea_already_in_temp() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        let wea = layout.temp_dir().join("site.wea");
        fs::write(&wea, "place x\n").unwrap();
        let climate = ClimateSource::new(&wea).unwrap();
        assert_eq!(climate.preparation(&layout), ClimatePreparation::InPlace);
    }

    #[test]
    fn test_relocate_wea_moves_or_copies() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.wea");
        let moved = dir.path().join("moved.wea");
        let copied = dir.path().join("copied.wea");
        fs::write(&src, "data").unwrap();

        relocate_wea(&src, &copied, true).unwrap();
        assert!(src.exists());
        assert_eq!(fs::read_to_string(&copied).unwrap(), "data");

        relocate_wea(&src, &moved, false).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&moved).unwrap(), "data");
    }

    #[test]
    fn test_sky_matrix_names_for_all_modes() {
        let layout = OutputLayout::new("w");
        let name = |irr, direct| {
            sky_matrix_path(&layout, "geneva", &params(irr, direct))
                .to_string_lossy()
                .into_owned()
        };
        assert_eq!(name(false, false), "w/temp/geneva-t60-MF2-r000.smx");
        assert_eq!(name(false, true), "w/temp/geneva-t60-MF2-r000-d.smx");
        assert_eq!(name(true, false), "w/temp/geneva-t60-MF2-r000-irr.smx");
        assert_eq!(name(true, true), "w/temp/geneva-t60-MF2-r000-d-irr.smx");

        let rotated = SkyParams::new(4, Timestep::new(30).unwrap(), 15, false, false);
        assert_eq!(
            sky_matrix_path(&layout, "geneva", &rotated),
            PathBuf::from("w/temp/geneva-t30-MF4-r015.smx")
        );
    }

    #[test]
    fn test_sky_matrix_pipeline_for_all_modes() {
        let wea = Path::new("temp/g.wea");
        let out = Path::new("temp/g.smx");
        let cmd = |irr, direct| sky_matrix_pipeline(wea, out, &params(irr, direct)).to_string();

        assert_eq!(
            cmd(true, true),
            "gendaymtx -of -d -m 2 -r 0 -O1 temp/g.wea | rmtxop -c .33 .33 .34 - > temp/g.smx"
        );
        assert_eq!(
            cmd(true, false),
            "gendaymtx -of -m 2 -r 0 -O1 temp/g.wea | rmtxop -c .33 .33 .34 - > temp/g.smx"
        );
        assert_eq!(
            cmd(false, true),
            "gendaymtx -of -d -m 2 -r 0 temp/g.wea | rmtxop -c 47.4 119.9 11.6 - > temp/g.smx"
        );
        assert_eq!(
            cmd(false, false),
            "gendaymtx -of -m 2 -r 0 temp/g.wea | rmtxop -c .27 .66 .07 - > temp/g.smx"
        );
    }

    #[test]
    fn test_sky_matrix_pipeline_negative_rotation() {
        let p = SkyParams::new(1, Timestep::default(), -30, false, false);
        let pipeline = sky_matrix_pipeline(Path::new("a.wea"), Path::new("a.smx"), &p);
        assert_eq!(pipeline.stages[0].args, vec!["-of", "-m", "1", "-r", "-30", "a.wea"]);
    }
}
