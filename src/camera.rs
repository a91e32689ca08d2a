//! # Camera モジュール
//!
//! カメラモードごとにカメラ位置と注視点を計算します。
//!
//! - `MissileTracking`: 最新のミサイルに乗って戦闘機を見る
//! - `Dynamic`: 戦闘機の周囲を複数の軌道パターンで動き回る
//! - `Overview`: 固定位置から原点を見下ろす

use glam::DVec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, info};

use crate::models::{traits::IEffect, Missile, MissileKey};
use crate::scenario::{vec3, CameraConfig};
use crate::scene::CameraPose;

const DIVE_PERIOD_S: f64 = 5.0;
const SIDE_APPROACH_PERIOD_S: f64 = 4.0;

/// カメラモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    #[default]
    MissileTracking,
    Dynamic,
    Overview,
}

impl CameraMode {
    pub fn next(self) -> Self {
        match self {
            CameraMode::MissileTracking => CameraMode::Dynamic,
            CameraMode::Dynamic => CameraMode::Overview,
            CameraMode::Overview => CameraMode::MissileTracking,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CameraMode::MissileTracking => "missile_tracking",
            CameraMode::Dynamic => "dynamic",
            CameraMode::Overview => "overview",
        }
    }
}

/// ダイナミックカメラの軌道パターン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicPattern {
    /// 回転しながらズーム
    OrbitZoom,
    /// 上空から急降下
    Dive,
    /// 側方から接近
    SideApproach,
}

impl DynamicPattern {
    const ALL: [DynamicPattern; 3] = [
        DynamicPattern::OrbitZoom,
        DynamicPattern::Dive,
        DynamicPattern::SideApproach,
    ];

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn next(self) -> Self {
        match self {
            DynamicPattern::OrbitZoom => DynamicPattern::Dive,
            DynamicPattern::Dive => DynamicPattern::SideApproach,
            DynamicPattern::SideApproach => DynamicPattern::OrbitZoom,
        }
    }

    /// パターン内の経過時間 `t` におけるカメラ位置（戦闘機位置からの相対）
    fn offset(&self, t: f64) -> DVec3 {
        match self {
            DynamicPattern::OrbitZoom => {
                let angle = t * 0.5;
                let distance = 10.0 - (t * 0.3).sin() * 5.0;
                DVec3::new(angle.cos() * distance, 3.0 + (t * 0.2).sin() * 2.0, angle.sin() * distance)
            }
            DynamicPattern::Dive => {
                let phase = (t % DIVE_PERIOD_S) / DIVE_PERIOD_S;
                DVec3::new(
                    (phase * std::f64::consts::TAU).sin() * 5.0,
                    20.0 - phase * 15.0,
                    -5.0 + phase * 10.0,
                )
            }
            DynamicPattern::SideApproach => {
                let phase = (t % SIDE_APPROACH_PERIOD_S) / SIDE_APPROACH_PERIOD_S;
                let side = if (t / SIDE_APPROACH_PERIOD_S).floor() as i64 % 2 == 0 {
                    1.0
                } else {
                    -1.0
                };
                DVec3::new(
                    side * (15.0 - phase * 10.0),
                    2.0,
                    (phase * std::f64::consts::PI).sin() * 5.0,
                )
            }
        }
    }
}

/// カメラ制御
#[derive(Debug, Clone)]
pub struct CameraController {
    pub mode: CameraMode,
    pub dynamic_time: f64,
    pub dynamic_pattern: DynamicPattern,
    tracked: Option<MissileKey>,
    pattern_duration: f64,
    chase_offset: DVec3,
    overview_position: DVec3,
    overview_target: DVec3,
}

impl CameraController {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            mode: config.initial_mode,
            dynamic_time: 0.0,
            dynamic_pattern: DynamicPattern::OrbitZoom,
            tracked: None,
            pattern_duration: config.dynamic_pattern_duration_s,
            chase_offset: vec3(config.chase_offset),
            overview_position: vec3(config.overview_position),
            overview_target: vec3(config.overview_target),
        }
    }

    /// 追跡中のミサイル（破棄済みの可能性がある）
    #[cfg(test)]
    pub fn tracked(&self) -> Option<MissileKey> {
        self.tracked
    }

    /// 次のカメラモードへ切り替え
    ///
    /// ダイナミックモードに入るときはタイマーをリセットしパターンをランダムに選ぶ。
    pub fn cycle_mode<R: Rng>(&mut self, rng: &mut R) -> CameraMode {
        self.mode = self.mode.next();
        if self.mode == CameraMode::Dynamic {
            self.dynamic_time = 0.0;
            self.dynamic_pattern = DynamicPattern::random(rng);
        }
        info!(mode = self.mode.name(), "CAMERA_MODE_CHANGED: カメラモードを切り替えました");
        self.mode
    }

    /// 新しく発射されたミサイルを追跡対象にする
    pub fn on_missile_spawned(&mut self, key: MissileKey) {
        self.tracked = Some(key);
    }

    /// 現在のモードでカメラ姿勢を計算
    ///
    /// 戦闘機がまだ存在しない場合は `None`（カメラは前回の姿勢のまま）。
    pub fn compute(
        &mut self,
        missiles: &SlotMap<MissileKey, Missile>,
        aircraft_position: Option<DVec3>,
        dt: f64,
    ) -> Option<CameraPose> {
        let aircraft = aircraft_position?;

        let pose = match self.mode {
            CameraMode::MissileTracking => self.tracking_pose(missiles, aircraft),
            CameraMode::Dynamic => self.dynamic_pose(aircraft, dt),
            CameraMode::Overview => CameraPose {
                position: self.overview_position,
                look_at: self.overview_target,
            },
        };
        Some(pose)
    }

    fn tracking_pose(&mut self, missiles: &SlotMap<MissileKey, Missile>, aircraft: DVec3) -> CameraPose {
        let live = |key: MissileKey| missiles.get(key).filter(|m| m.is_alive());

        if self.tracked.and_then(live).is_none() {
            let newest = missiles
                .iter()
                .filter(|(_, m)| m.is_alive())
                .max_by_key(|(_, m)| m.spawn_seq)
                .map(|(key, _)| key);
            if newest.is_some() && newest != self.tracked {
                debug!("CAMERA_REACQUIRED: 追跡ミサイルを最新のミサイルに切り替えました");
            }
            self.tracked = newest;
        }

        match self.tracked.and_then(live) {
            Some(missile) => CameraPose {
                position: missile.position,
                look_at: aircraft,
            },
            None => CameraPose {
                position: aircraft + self.chase_offset,
                look_at: aircraft,
            },
        }
    }

    fn dynamic_pose(&mut self, aircraft: DVec3, dt: f64) -> CameraPose {
        self.dynamic_time += dt;
        let pose = CameraPose {
            position: aircraft + self.dynamic_pattern.offset(self.dynamic_time),
            look_at: aircraft,
        };

        if self.dynamic_time > self.pattern_duration {
            self.dynamic_time = 0.0;
            self.dynamic_pattern = self.dynamic_pattern.next();
        }
        pose
    }
}
