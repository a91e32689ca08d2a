//! # Scenario モジュール
//!
//! YAMLシナリオファイルからシミュレーション設定を読み込みます。
//!
//! 全てのセクションは省略可能で、省略時は標準の演出パラメータが使われます。
//! 読み込み後に `validate` で値の整合性を検査します。

use std::fs;
use std::path::{Path, PathBuf};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::camera::CameraMode;
use crate::input::{InputEvent, ScheduledInput};
use crate::models::TrailStyle;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

impl Default for ScenarioMeta {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: "default".to_string(),
            description: "戦闘機とミサイル群の標準デモ".to_string(),
        }
    }
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 1フレームの時間刻み[s]（realtime時は上限値）
    pub frame_dt_s: f64,
    pub duration_s: f64,
    pub seed: u64,
    /// 壁時計に合わせてフレームを進める
    pub realtime: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_dt_s: 1.0 / 60.0,
            duration_s: 30.0,
            seed: 42,
            realtime: false,
        }
    }
}

/// 戦闘機モデル設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetConfig {
    pub model_path: PathBuf,
    pub model_scale: f64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("data/fighter.glb"),
            model_scale: 0.5,
        }
    }
}

/// 通常飛行経路（円軌道＋上下動）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlightPathConfig {
    pub radius: f64,
    pub bob_amplitude: f64,
    pub base_altitude: f64,
    pub bank_amplitude_rad: f64,
    /// 経路時間の進み[rad/s]
    pub path_rate: f64,
    pub engine_offset: [f64; 3],
}

impl Default for FlightPathConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            bob_amplitude: 2.0,
            base_altitude: 2.0,
            bank_amplitude_rad: 0.3,
            path_rate: 0.6,
            engine_offset: [0.0, -0.05, -0.3],
        }
    }
}

/// 回避機動設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvasionConfig {
    pub enabled: bool,
    pub danger_distance: f64,
    pub maneuver_duration_s: f64,
    pub return_duration_s: f64,
    /// 軌道復帰時の1フレームあたりの補間係数
    pub return_blend_factor: f64,
    pub include_kulbit: bool,
}

impl Default for EvasionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            danger_distance: 4.0,
            maneuver_duration_s: 1.0,
            return_duration_s: 1.0,
            return_blend_factor: 0.1,
            include_kulbit: false,
        }
    }
}

/// ミサイル設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MissileConfig {
    pub speed: f64,
    /// 前方ベクトルをターゲット方向へ寄せる補間係数
    pub turn_factor: f64,
    pub max_lifetime_s: f64,
    pub proximity_radius: f64,
    /// 最接近通過と判定する距離
    pub pass_detect_radius: f64,
    /// 通過後に自爆する離脱距離
    pub separation_radius: f64,
    pub exhaust_offset: [f64; 3],
}

impl Default for MissileConfig {
    fn default() -> Self {
        Self {
            speed: 9.0,
            turn_factor: 0.03,
            max_lifetime_s: 5.0,
            proximity_radius: 1.5,
            pass_detect_radius: 2.0,
            separation_radius: 3.0,
            exhaust_offset: [0.0, -0.2, 0.0],
        }
    }
}

/// バースト発射設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BurstConfig {
    pub burst_size: u32,
    pub spawn_interval_s: f64,
    pub burst_delay_s: f64,
    pub spawn_distance_min: f64,
    pub spawn_distance_max: f64,
    /// ターゲット高度からの高さオフセット幅（±）
    pub spawn_height_range: f64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            burst_size: 10,
            spawn_interval_s: 0.05,
            burst_delay_s: 0.5,
            spawn_distance_min: 15.0,
            spawn_distance_max: 25.0,
            spawn_height_range: 5.0,
        }
    }
}

/// 爆発エフェクト設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExplosionConfig {
    pub particle_count: usize,
    pub lifetime_s: f64,
    pub speed_min: f64,
    pub speed_max: f64,
    pub base_size: f64,
    pub size_growth: f64,
}

impl Default for ExplosionConfig {
    fn default() -> Self {
        Self {
            particle_count: 8,
            lifetime_s: 0.8,
            speed_min: 0.3,
            speed_max: 0.8,
            base_size: 0.5,
            size_growth: 1.0,
        }
    }
}

/// 煙エフェクト設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrailConfig {
    pub particle_lifetime_s: f64,
    pub aircraft_capacity: usize,
    pub missile_capacity: usize,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            particle_lifetime_s: 2.0,
            aircraft_capacity: TrailStyle::Aircraft.default_capacity(),
            missile_capacity: TrailStyle::Missile.default_capacity(),
        }
    }
}

/// カメラ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    pub initial_mode: CameraMode,
    pub fov_deg: f64,
    pub dynamic_pattern_duration_s: f64,
    pub chase_offset: [f64; 3],
    pub overview_position: [f64; 3],
    pub overview_target: [f64; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            initial_mode: CameraMode::MissileTracking,
            fov_deg: 20.0,
            dynamic_pattern_duration_s: 5.0,
            chase_offset: [0.0, 2.0, -5.0],
            overview_position: [20.0, 30.0, 20.0],
            overview_target: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// キー割り当てと入力スクリプト
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub camera_cycle_key: char,
    pub evasion_toggle_key: char,
    pub events: Vec<ScheduledInput>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            camera_cycle_key: 'v',
            evasion_toggle_key: 'm',
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// フレームトレース(JSON Lines)の出力先
    pub trace_path: Option<PathBuf>,
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    pub asset: AssetConfig,
    pub flight_path: FlightPathConfig,
    pub evasion: EvasionConfig,
    pub missile: MissileConfig,
    pub burst: BurstConfig,
    pub explosion: ExplosionConfig,
    pub trail: TrailConfig,
    pub camera: CameraConfig,
    pub viewport: ViewportConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

pub fn vec3(v: [f64; 3]) -> DVec3 {
    DVec3::from_array(v)
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        fn positive(name: &str, value: f64) -> Result<(), ScenarioError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ScenarioError::ValidationError(format!("{} must be positive", name)))
            }
        }

        positive("sim.frame_dt_s", self.sim.frame_dt_s)?;
        positive("sim.duration_s", self.sim.duration_s)?;
        positive("flight_path.radius", self.flight_path.radius)?;
        positive("missile.speed", self.missile.speed)?;
        positive("missile.max_lifetime_s", self.missile.max_lifetime_s)?;
        positive("burst.spawn_interval_s", self.burst.spawn_interval_s)?;
        positive("explosion.lifetime_s", self.explosion.lifetime_s)?;
        positive("trail.particle_lifetime_s", self.trail.particle_lifetime_s)?;
        positive("evasion.maneuver_duration_s", self.evasion.maneuver_duration_s)?;
        positive("evasion.return_duration_s", self.evasion.return_duration_s)?;

        if !(0.0..=1.0).contains(&self.missile.turn_factor) {
            return Err(ScenarioError::ValidationError(
                "missile.turn_factor must be within [0, 1]".to_string(),
            ));
        }

        // 近接 < 通過判定 < 離脱 の順でなければ通過後自爆が成立しない
        let m = &self.missile;
        if !(m.proximity_radius < m.pass_detect_radius && m.pass_detect_radius < m.separation_radius) {
            return Err(ScenarioError::ValidationError(format!(
                "missile radii must satisfy proximity {} < pass_detect {} < separation {}",
                m.proximity_radius, m.pass_detect_radius, m.separation_radius
            )));
        }

        if self.burst.burst_size == 0 {
            return Err(ScenarioError::ValidationError("burst.burst_size must be at least 1".to_string()));
        }
        if self.burst.burst_delay_s < 0.0 {
            return Err(ScenarioError::ValidationError("burst.burst_delay_s must not be negative".to_string()));
        }
        if self.burst.spawn_distance_min > self.burst.spawn_distance_max {
            return Err(ScenarioError::ValidationError(
                "burst.spawn_distance_min exceeds spawn_distance_max".to_string(),
            ));
        }

        if self.explosion.speed_min > self.explosion.speed_max {
            return Err(ScenarioError::ValidationError(
                "explosion.speed_min exceeds speed_max".to_string(),
            ));
        }

        if self.trail.aircraft_capacity == 0 || self.trail.missile_capacity == 0 {
            return Err(ScenarioError::ValidationError("trail capacities must be at least 1".to_string()));
        }

        if self.input.camera_cycle_key.eq_ignore_ascii_case(&self.input.evasion_toggle_key) {
            return Err(ScenarioError::ValidationError(format!(
                "camera_cycle_key and evasion_toggle_key are both '{}'",
                self.input.camera_cycle_key
            )));
        }

        for scheduled in &self.input.events {
            if scheduled.at_s < 0.0 || scheduled.at_s >= self.sim.duration_s {
                return Err(ScenarioError::ValidationError(format!(
                    "input event at {}s outside simulation time {}s",
                    scheduled.at_s, self.sim.duration_s
                )));
            }
            if let InputEvent::Resize { width: 0, .. } | InputEvent::Resize { height: 0, .. } = scheduled.event {
                return Err(ScenarioError::ValidationError("resize event with zero size".to_string()));
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.4}秒", self.sim.frame_dt_s);
        println!("実行時間: {:.1}秒", self.sim.duration_s);
        println!("シード値: {}", self.sim.seed);
        println!("リアルタイム: {}", if self.sim.realtime { "有効" } else { "無効" });
        println!("モデル: {}", self.asset.model_path.display());
        println!();

        println!("=== ミサイル ===");
        println!(
            "バースト: {}発 / 間隔 {:.2}秒 / 待機 {:.2}秒",
            self.burst.burst_size, self.burst.spawn_interval_s, self.burst.burst_delay_s
        );
        println!(
            "速度: {:.1} / 旋回係数: {:.3} / 寿命: {:.1}秒",
            self.missile.speed, self.missile.turn_factor, self.missile.max_lifetime_s
        );
        println!();

        println!("=== 回避機動 ===");
        println!("有効: {}", if self.evasion.enabled { "はい" } else { "いいえ" });
        println!("危険距離: {:.1}", self.evasion.danger_distance);
        println!("初期カメラ: {:?}", self.camera.initial_mode);
        println!("入力イベント: {}件", self.input.events.len());
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {path}", path = .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {path}: {1}", path = .0.display())]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("YAML解析エラー {path}: {1}", path = .0.display())]
    ParseError(PathBuf, #[source] serde_yaml::Error),

    #[error("設定検証エラー: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ScenarioConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
sim:
  duration_s: 12.0
  seed: 7
missile:
  speed: 6.0
camera:
  initial_mode: overview
input:
  events:
    - at_s: 1.0
      event: { key_press: "v" }
    - at_s: 2.0
      event: { resize: { width: 800, height: 600 } }
"#;
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sim.seed, 7);
        assert_eq!(config.sim.duration_s, 12.0);
        assert_eq!(config.missile.speed, 6.0);
        assert_eq!(config.missile.proximity_radius, 1.5);
        assert_eq!(config.burst.burst_size, 10);
        assert_eq!(config.camera.initial_mode, CameraMode::Overview);
        assert_eq!(config.input.events.len(), 2);
        assert_eq!(config.input.events[0].event, InputEvent::KeyPress('v'));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bundled_default_scenario_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/default.yaml");
        let config = ScenarioConfig::from_file(path).unwrap();
        assert_eq!(config.input.events.len(), 4);
        assert_eq!(config.input.events[0].at_s, 8.0);
        assert_eq!(config.input.events[0].event, InputEvent::KeyPress('v'));
        assert_eq!(config.input.events[2].event, InputEvent::KeyPress('m'));
        assert_eq!(
            config.input.events[3].event,
            InputEvent::Resize { width: 1920, height: 1080 }
        );
        assert!(config.output.trace_path.is_some());
    }

    #[test]
    fn test_validate_rejects_inverted_radii() {
        let mut config = ScenarioConfig::default();
        config.missile.separation_radius = 1.0;
        assert!(matches!(config.validate(), Err(ScenarioError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_conflicting_keys() {
        let mut config = ScenarioConfig::default();
        config.input.evasion_toggle_key = 'V';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_reports_missing_and_invalid() {
        assert!(matches!(
            ScenarioConfig::from_file("no/such/scenario.yaml"),
            Err(ScenarioError::FileNotFound(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sim: [not, a, map]").unwrap();
        assert!(matches!(
            ScenarioConfig::from_file(file.path()),
            Err(ScenarioError::ParseError(_, _))
        ));
    }
}
