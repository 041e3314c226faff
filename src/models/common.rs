use std::fmt;

use crate::error::TwoPhaseError;

/// 計算量の種類（照度または日射量）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcMode {
    /// 照度 [lux]、結果ファイルは `.ill`
    Illuminance,
    /// 日射量 [W/m2]、結果ファイルは `.irr`
    Irradiance,
}

impl CalcMode {
    pub fn from_flag(irradiance: bool) -> Self {
        if irradiance {
            CalcMode::Irradiance
        } else {
            CalcMode::Illuminance
        }
    }

    /// 結果ファイルの拡張子
    pub fn extension(&self) -> &'static str {
        match self {
            CalcMode::Illuminance => "ill",
            CalcMode::Irradiance => "irr",
        }
    }

    /// DC行列を1チャンネルに変換する際の重み
    pub fn dc_weights(&self) -> Weights {
        match self {
            CalcMode::Illuminance => Weights::PHOTOPIC,
            CalcMode::Irradiance => Weights::EQUAL,
        }
    }
}

impl fmt::Display for CalcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcMode::Illuminance => write!(f, "照度"),
            CalcMode::Irradiance => write!(f, "日射量"),
        }
    }
}

/// 天空成分（全天または直達のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkyComponent {
    Total,
    Direct,
}

impl SkyComponent {
    pub fn from_flag(direct: bool) -> Self {
        if direct {
            SkyComponent::Direct
        } else {
            SkyComponent::Total
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, SkyComponent::Direct)
    }

    /// ファイル名に付加するサフィックス
    pub fn suffix(&self) -> &'static str {
        match self {
            SkyComponent::Total => "",
            SkyComponent::Direct => "-d",
        }
    }
}

impl fmt::Display for SkyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkyComponent::Total => write!(f, "全天"),
            SkyComponent::Direct => write!(f, "直達"),
        }
    }
}

/// `rmtxop -c` に渡すRGBチャンネルの重み
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights(pub [f64; 3]);

impl Weights {
    /// 等分（日射量）
    pub const EQUAL: Weights = Weights([0.33, 0.33, 0.34]);
    /// 視感度重み（照度）
    pub const PHOTOPIC: Weights = Weights([0.27, 0.66, 0.07]);
    /// 直達照度用の発光効率込みの重み
    pub const DIRECT_EFFICACY: Weights = Weights([47.4, 119.9, 11.6]);

    /// 天空行列の変換に使う重みを選択
    pub fn for_sky(mode: CalcMode, component: SkyComponent) -> Self {
        match (mode, component) {
            (CalcMode::Irradiance, _) => Weights::EQUAL,
            (CalcMode::Illuminance, SkyComponent::Direct) => Weights::DIRECT_EFFICACY,
            (CalcMode::Illuminance, SkyComponent::Total) => Weights::PHOTOPIC,
        }
    }

    /// コマンド引数用の文字列表現（1未満は `.33` のように先頭の0を省く）
    pub fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|w| {
                let s = w.to_string();
                match s.strip_prefix("0.") {
                    Some(frac) => format!(".{}", frac),
                    None => s,
                }
            })
            .collect()
    }
}

/// 時間刻み（分）
///
/// 60の約数または倍数のみを受け付けます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestep(u32);

impl Timestep {
    pub fn new(minutes: u32) -> Result<Self, TwoPhaseError> {
        if minutes == 0 || (60 % minutes != 0 && minutes % 60 != 0) {
            return Err(TwoPhaseError::InvalidTimestep(minutes));
        }
        Ok(Self(minutes))
    }

    /// 1年間（365日）の時間刻み数
    pub fn steps_per_year(&self) -> f64 {
        (60.0 / self.0 as f64) * 24.0 * 365.0
    }
}

impl Default for Timestep {
    fn default() -> Self {
        Self(60)
    }
}

impl fmt::Display for Timestep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 天空行列と結果ファイルを特定するパラメータ一式
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyParams {
    /// 天空分割係数（Reinhart MF）
    pub subdivision: u32,
    pub timestep: Timestep,
    /// 天空回転角（北から西回り、度）
    pub rotation: i32,
    pub mode: CalcMode,
    pub component: SkyComponent,
}

impl SkyParams {
    pub fn new(
        subdivision: u32,
        timestep: Timestep,
        rotation: i32,
        irradiance: bool,
        direct: bool,
    ) -> Self {
        Self {
            subdivision,
            timestep,
            rotation,
            mode: CalcMode::from_flag(irradiance),
            component: SkyComponent::from_flag(direct),
        }
    }

    /// 天空行列変換の重み
    pub fn sky_weights(&self) -> Weights {
        Weights::for_sky(self.mode, self.component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestep_accepts_divisors_and_multiples_of_60() {
        for ts in [1, 5, 10, 15, 30, 60, 120, 180] {
            assert!(Timestep::new(ts).is_ok(), "ts={} should be valid", ts);
        }
    }

    #[test]
    fn test_timestep_rejects_other_values() {
        for ts in [0, 7, 45, 90, 100] {
            assert!(
                matches!(Timestep::new(ts), Err(TwoPhaseError::InvalidTimestep(v)) if v == ts),
                "ts={} should be rejected",
                ts
            );
        }
    }

    #[test]
    fn test_steps_per_year() {
        assert_eq!(Timestep::new(60).unwrap().steps_per_year(), 8760.0);
        assert_eq!(Timestep::new(30).unwrap().steps_per_year(), 17520.0);
        assert_eq!(Timestep::new(120).unwrap().steps_per_year(), 4380.0);
    }

    #[test]
    fn test_sky_weights_per_mode() {
        let ts = Timestep::default();
        assert_eq!(SkyParams::new(2, ts, 0, true, true).sky_weights(), Weights::EQUAL);
        assert_eq!(SkyParams::new(2, ts, 0, true, false).sky_weights(), Weights::EQUAL);
        assert_eq!(
            SkyParams::new(2, ts, 0, false, true).sky_weights(),
            Weights::DIRECT_EFFICACY
        );
        assert_eq!(SkyParams::new(2, ts, 0, false, false).sky_weights(), Weights::PHOTOPIC);
    }

    #[test]
    fn test_dc_weights_per_mode() {
        assert_eq!(CalcMode::Irradiance.dc_weights(), Weights::EQUAL);
        assert_eq!(CalcMode::Illuminance.dc_weights(), Weights::PHOTOPIC);
    }

    #[test]
    fn test_weights_to_args() {
        assert_eq!(Weights::DIRECT_EFFICACY.to_args(), vec!["47.4", "119.9", "11.6"]);
        assert_eq!(Weights::PHOTOPIC.to_args(), vec![".27", ".66", ".07"]);
        assert_eq!(Weights::EQUAL.to_args(), vec![".33", ".33", ".34"]);
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(SkyComponent::Direct.suffix(), "-d");
        assert_eq!(SkyComponent::Total.suffix(), "");
        assert_eq!(CalcMode::Irradiance.extension(), "irr");
        assert_eq!(CalcMode::Illuminance.extension(), "ill");
    }
}
