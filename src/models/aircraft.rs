use glam::{DQuat, DVec3};
use rand::Rng;
use tracing::{debug, info};

use crate::models::{
    common::{math_utils, EulerAxis, Pose},
    maneuver::EvasionPattern,
    smoke_trail::SmokeTrail,
};
use crate::scenario::{vec3, EvasionConfig, FlightPathConfig};
use crate::scene::{NodeId, NodeKind, NodeTransform, SceneGraph};

/// 戦闘機の飛行状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightMode {
    /// 通常の周回飛行
    Cruising,
    /// 緊急回避機動中
    Evading { pattern: EvasionPattern, timer: f64 },
    /// 回避後の軌道復帰中
    ReturningToOrbit { timer: f64 },
}

/// 戦闘機
///
/// 通常は経路時間の関数として円軌道を飛行し、ミサイルが危険距離に入ると
/// 回避機動 → 軌道復帰 → 通常飛行の順に遷移します。
/// ミサイルの誘導対象であり、セッション中に破棄されることはありません。
#[derive(Debug, Clone)]
pub struct Aircraft {
    pub id: String,
    pub pose: Pose,
    pub velocity: DVec3,
    /// 経路時間（通常飛行中のみ進む）
    pub path_time: f64,
    pub mode: FlightMode,
    pub evasion_enabled: bool,
    pub evade_start_position: DVec3,
    pub evade_end_orientation: DQuat,
    pub evasion_count: u32,
    pub model_scale: f64,

    path: FlightPathConfig,
    evasion: EvasionConfig,
    trail: SmokeTrail,
    node: Option<NodeId>,
}

impl Aircraft {
    pub fn new(id: String, path: &FlightPathConfig, evasion: &EvasionConfig, trail: SmokeTrail, model_scale: f64) -> Self {
        let mut aircraft = Self {
            id,
            pose: Pose::default(),
            velocity: DVec3::ZERO,
            path_time: 0.0,
            mode: FlightMode::Cruising,
            evasion_enabled: evasion.enabled,
            evade_start_position: DVec3::ZERO,
            evade_end_orientation: DQuat::IDENTITY,
            evasion_count: 0,
            model_scale,
            path: path.clone(),
            evasion: evasion.clone(),
            trail,
            node: None,
        };
        aircraft.pose = aircraft.nominal_pose(0.0);
        aircraft
    }

    pub fn position(&self) -> DVec3 {
        self.pose.position
    }

    #[cfg(test)]
    pub fn trail(&self) -> &SmokeTrail {
        &self.trail
    }

    /// 回避機動の有効/無効を切り替え、新しい状態を返す
    pub fn toggle_evasion(&mut self) -> bool {
        self.evasion_enabled = !self.evasion_enabled;
        info!(
            aircraft_id = %self.id,
            evasion_enabled = self.evasion_enabled,
            "EVASION_TOGGLED: 緊急回避機動の設定を切り替えました"
        );
        self.evasion_enabled
    }

    /// 経路時間 `t` における通常軌道上の位置
    pub fn nominal_position(&self, t: f64) -> DVec3 {
        let p = &self.path;
        DVec3::new(
            t.cos() * p.radius,
            (t * 2.0).sin() * p.bob_amplitude + p.base_altitude,
            t.sin() * p.radius,
        )
    }

    /// 経路の進行方向（位置の時間微分に相当）
    pub fn nominal_direction(&self, t: f64) -> DVec3 {
        let p = &self.path;
        DVec3::new(
            -t.sin() * p.radius,
            (t * 2.0).cos() * p.bob_amplitude * 2.0,
            t.cos() * p.radius,
        )
    }

    /// 進行方向を向き、バンク角を加えた姿勢（バンク係数 `bank_scale` 倍）
    fn nominal_orientation(&self, t: f64, bank_scale: f64, fallback: DQuat) -> DQuat {
        let heading = math_utils::look_rotation(self.nominal_direction(t), DVec3::Y).unwrap_or(fallback);
        let bank = t.sin() * self.path.bank_amplitude_rad * bank_scale;
        math_utils::with_euler_component(heading, EulerAxis::Z, bank)
    }

    pub fn nominal_pose(&self, t: f64) -> Pose {
        Pose::new(
            self.nominal_position(t),
            self.nominal_orientation(t, 1.0, self.pose.orientation),
        )
    }

    pub fn is_maneuvering(&self) -> bool {
        !matches!(self.mode, FlightMode::Cruising)
    }

    /// 1フレーム分の飛行更新
    ///
    /// `closest_threat` は最も近いミサイルまでの距離。回避機動を開始した場合は
    /// 選択した機動パターンを返す。
    pub fn update_flight<R: Rng>(&mut self, dt: f64, closest_threat: Option<f64>, rng: &mut R) -> Option<EvasionPattern> {
        let triggered = self.check_evasion_trigger(closest_threat, rng);

        match self.mode {
            FlightMode::Evading { pattern, timer } => self.update_evading(pattern, timer + dt, dt),
            FlightMode::ReturningToOrbit { timer } => self.update_returning(timer + dt),
            FlightMode::Cruising => self.update_cruising(dt),
        }

        triggered
    }

    fn check_evasion_trigger<R: Rng>(&mut self, closest_threat: Option<f64>, rng: &mut R) -> Option<EvasionPattern> {
        let distance = closest_threat?;
        if !self.evasion_enabled || self.is_maneuvering() || distance >= self.evasion.danger_distance {
            return None;
        }

        let pattern = EvasionPattern::choose(rng, self.evasion.include_kulbit);
        self.mode = FlightMode::Evading { pattern, timer: 0.0 };
        self.evade_start_position = self.pose.position;
        self.evasion_count += 1;

        info!(
            aircraft_id = %self.id,
            pattern = pattern.name(),
            threat_distance = distance,
            position_x = self.pose.position.x,
            position_y = self.pose.position.y,
            position_z = self.pose.position.z,
            "EVASION_TRIGGERED: ミサイル接近のため緊急回避機動を開始しました"
        );

        Some(pattern)
    }

    fn update_evading(&mut self, pattern: EvasionPattern, timer: f64, dt: f64) {
        let duration = self.evasion.maneuver_duration_s;
        let sample = pattern.sample(timer, duration);
        self.velocity = sample.velocity;
        self.pose.orientation =
            math_utils::with_euler_component(self.pose.orientation, sample.rotation_axis, sample.rotation_angle);

        if timer > duration {
            self.mode = FlightMode::ReturningToOrbit { timer: 0.0 };
            self.evade_end_orientation = self.pose.orientation;
            debug!(
                aircraft_id = %self.id,
                pattern = pattern.name(),
                displacement = self.pose.position.distance(self.evade_start_position),
                "EVASION_COMPLETE: 回避機動を終了し軌道復帰に移行します"
            );
            return;
        }

        self.mode = FlightMode::Evading { pattern, timer };
        self.pose.position += self.velocity * dt;
    }

    /// 通常軌道へ寄せる
    ///
    /// 補間係数は `min(timer/duration, 1) × blend_factor` で、復帰時間内に
    /// 完全には追いつかない。完了時に経路時間を同期し、次フレームの通常飛行で
    /// 軌道上へスナップする。
    fn update_returning(&mut self, timer: f64) {
        let duration = self.evasion.return_duration_s;
        let t = (timer / duration).min(1.0);
        let blend = t * self.evasion.return_blend_factor;
        let target_time = self.path_time + timer * self.path.path_rate;

        let target_position = self.nominal_position(target_time);
        self.pose.position = self.pose.position.lerp(target_position, blend);

        let heading = math_utils::look_rotation(self.nominal_direction(target_time), DVec3::Y)
            .unwrap_or(self.evade_end_orientation);
        let blended = self.evade_end_orientation.slerp(heading, blend);
        let bank = target_time.sin() * self.path.bank_amplitude_rad * t;
        self.pose.orientation = math_utils::with_euler_component(blended, EulerAxis::Z, bank);

        if timer >= duration {
            self.path_time = target_time;
            self.mode = FlightMode::Cruising;
            debug!(
                aircraft_id = %self.id,
                path_time = self.path_time,
                residual_distance = self.pose.position.distance(target_position),
                "ORBIT_RESUMED: 通常軌道に復帰しました"
            );
        } else {
            self.mode = FlightMode::ReturningToOrbit { timer };
        }
    }

    fn update_cruising(&mut self, dt: f64) {
        self.path_time += self.path.path_rate * dt;
        self.pose = self.nominal_pose(self.path_time);
        self.velocity = DVec3::ZERO;
    }

    /// エンジン位置（機体後部）
    pub fn engine_position(&self) -> DVec3 {
        self.pose.position + self.pose.orientation * vec3(self.path.engine_offset)
    }

    /// シーン上の機体と飛行機雲を更新
    pub fn sync_scene(&mut self, scene: &mut dyn SceneGraph, dt: f64) {
        let transform = NodeTransform {
            position: self.pose.position,
            orientation: self.pose.orientation,
            scale: self.model_scale,
        };
        match self.node {
            Some(node) => scene.update_transform(node, transform),
            None => self.node = Some(scene.add_node(NodeKind::Aircraft, transform)),
        }

        let engine = self.engine_position();
        self.trail.update(scene, engine, dt);
    }
}
