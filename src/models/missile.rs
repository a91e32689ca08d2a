use glam::{DQuat, DVec3};
use tracing::{debug, info, warn};

use crate::models::{
    common::{math_utils, EffectStatus, MissileEndReason},
    smoke_trail::{SmokeTrail, TrailStyle},
    traits::{IEffect, IHoming},
};
use crate::scenario::{vec3, MissileConfig};
use crate::scene::{NodeId, NodeKind, NodeTransform, SceneGraph};

slotmap::new_key_type! {
    /// ミサイル集合のハンドル（破棄後は無効になる弱参照として扱う）
    pub struct MissileKey;
}

/// ミサイル機体のローカル前方軸（円錐形状の先端方向）
pub const MISSILE_FORWARD_AXIS: DVec3 = DVec3::Y;

/// ホーミングミサイル
///
/// 毎フレーム前方ベクトルをターゲット方向へ一定係数で寄せ、一定速度で前進します。
/// 物理的な追尾解ではなく比例的な旋回の近似です。
/// 終了条件は寿命切れ・近接爆発・通過後の離脱自爆の3つで、
/// ターゲットが存在しない場合は即座に自爆します。
#[derive(Debug, Clone)]
pub struct Missile {
    pub id: String,
    /// 発射順の通し番号（カメラの最新ミサイル選択に使用）
    pub spawn_seq: u64,
    pub position: DVec3,
    pub orientation: DQuat,
    pub status: EffectStatus,

    pub speed: f64,
    pub turn_factor: f64,
    pub max_lifetime: f64,
    pub proximity_radius: f64,
    pub pass_detect_radius: f64,
    pub separation_radius: f64,
    pub exhaust_offset: DVec3,

    /// 飛翔時間（秒）
    pub age: f64,
    /// ターゲットの最接近点を通過したか
    pub has_passed_target: bool,
    /// 前フレームのターゲット距離
    pub previous_distance: f64,
    pub end_reason: Option<MissileEndReason>,

    target: Option<DVec3>,
    last_distance: Option<f64>,
    trail: SmokeTrail,
    node: Option<NodeId>,
}

impl Missile {
    /// 新しいミサイルを作成します（初期姿勢は前方軸が+Y）
    pub fn new(id: String, spawn_seq: u64, launch_position: DVec3, config: &MissileConfig, trail: SmokeTrail) -> Self {
        Self {
            id,
            spawn_seq,
            position: launch_position,
            orientation: DQuat::IDENTITY,
            status: EffectStatus::Alive,
            speed: config.speed,
            turn_factor: config.turn_factor,
            max_lifetime: config.max_lifetime_s,
            proximity_radius: config.proximity_radius,
            pass_detect_radius: config.pass_detect_radius,
            separation_radius: config.separation_radius,
            exhaust_offset: vec3(config.exhaust_offset),
            age: 0.0,
            has_passed_target: false,
            previous_distance: f64::INFINITY,
            end_reason: None,
            target: None,
            last_distance: None,
            trail,
            node: None,
        }
    }

    /// 初期進行方向を指定して作成
    #[cfg(test)]
    pub fn with_heading(mut self, heading: DVec3) -> Self {
        if let Some(forward) = heading.try_normalize() {
            self.orientation = math_utils::rotation_onto(MISSILE_FORWARD_AXIS, forward);
        }
        self
    }

    /// シーンにミサイル本体を登録
    pub fn attach(&mut self, scene: &mut dyn SceneGraph) {
        if self.node.is_none() {
            self.node = Some(scene.add_node(NodeKind::Missile, self.transform()));
        }
    }

    pub fn forward(&self) -> DVec3 {
        self.orientation * MISSILE_FORWARD_AXIS
    }

    #[cfg(test)]
    pub fn trail(&self) -> &SmokeTrail {
        &self.trail
    }

    fn transform(&self) -> NodeTransform {
        NodeTransform {
            position: self.position,
            orientation: self.orientation,
            scale: 1.0,
        }
    }

    /// 前方ベクトルをターゲット方向へ補間して姿勢を更新
    ///
    /// ターゲット方向や補間結果がゼロ長になる場合は現在の向きを保持する。
    pub fn steer_towards(&mut self, target: DVec3) {
        let forward = self.forward();
        let Some(to_target) = (target - self.position).try_normalize() else {
            return;
        };
        let blended = math_utils::safe_normalize(forward.lerp(to_target, self.turn_factor), forward);
        self.orientation = math_utils::rotation_onto(MISSILE_FORWARD_AXIS, blended);
    }

    fn exhaust_position(&self) -> DVec3 {
        self.position + self.orientation * self.exhaust_offset
    }

    fn end(&mut self, reason: MissileEndReason, distance: Option<f64>) {
        self.status = match reason {
            MissileEndReason::TimedOut => EffectStatus::Expired,
            _ => EffectStatus::Detonated,
        };
        self.end_reason = Some(reason);

        match reason {
            MissileEndReason::DirectHit => info!(
                missile_id = %self.id,
                position_x = self.position.x,
                position_y = self.position.y,
                position_z = self.position.z,
                age = self.age,
                distance = distance.unwrap_or(f64::NAN),
                "MISSILE_HIT: ミサイルがターゲット至近で爆発しました"
            ),
            MissileEndReason::FlybySelfDestruct => debug!(
                missile_id = %self.id,
                age = self.age,
                distance = distance.unwrap_or(f64::NAN),
                "MISSILE_FLYBY: ターゲット通過後に自爆しました"
            ),
            MissileEndReason::TimedOut => debug!(
                missile_id = %self.id,
                age = self.age,
                max_lifetime = self.max_lifetime,
                "MISSILE_TIMEOUT: 寿命切れで自爆しました"
            ),
            MissileEndReason::TargetLost => warn!(
                missile_id = %self.id,
                age = self.age,
                "MISSILE_TARGET_LOST: 誘導対象が存在しないため自爆しました"
            ),
        }
    }

    /// 距離に基づく終了判定。爆発する場合はtrue
    fn check_detonation(&mut self, distance: f64) -> bool {
        if distance < self.proximity_radius {
            self.end(MissileEndReason::DirectHit, Some(distance));
            return true;
        }

        // 最接近点を過ぎて距離が増加に転じたか
        if !self.has_passed_target {
            if distance > self.previous_distance && self.previous_distance < self.pass_detect_radius {
                self.has_passed_target = true;
                debug!(
                    missile_id = %self.id,
                    closest_distance = self.previous_distance,
                    "MISSILE_PASSED_TARGET: ミサイルが最接近点を通過しました"
                );
            }
            self.previous_distance = distance;
        }

        if self.has_passed_target && distance > self.separation_radius {
            self.end(MissileEndReason::FlybySelfDestruct, Some(distance));
            return true;
        }

        false
    }
}

impl IHoming for Missile {
    fn acquire_target(&mut self, target: Option<DVec3>) {
        self.target = target;
    }

    fn distance_to_target(&self) -> Option<f64> {
        self.last_distance
    }
}

impl IEffect for Missile {
    fn update(&mut self, scene: &mut dyn SceneGraph, dt: f64) -> bool {
        if self.status != EffectStatus::Alive {
            return false;
        }

        self.age += dt;
        if self.age > self.max_lifetime {
            self.end(MissileEndReason::TimedOut, self.last_distance);
            return false;
        }

        let Some(target) = self.target else {
            self.end(MissileEndReason::TargetLost, None);
            return false;
        };

        // 誘導 → 前進
        self.steer_towards(target);
        self.position += self.forward() * self.speed * dt;

        if let Some(node) = self.node {
            scene.update_transform(node, self.transform());
        }
        let exhaust = self.exhaust_position();
        self.trail.update(scene, exhaust, dt);

        let distance = self.position.distance(target);
        self.last_distance = Some(distance);

        !self.check_detonation(distance)
    }

    fn dispose(&mut self, scene: &mut dyn SceneGraph) {
        if let Some(node) = self.node.take() {
            scene.remove_node(node);
        }
        self.trail.dispose(scene);
        if self.status == EffectStatus::Alive {
            self.status = EffectStatus::Disposed;
        }
    }

    fn get_id(&self) -> String {
        self.id.clone()
    }

    fn is_alive(&self) -> bool {
        self.status == EffectStatus::Alive
    }
}

/// テストやデモ用のミサイル用煙
pub fn missile_trail(capacity: usize, particle_lifetime: f64) -> SmokeTrail {
    SmokeTrail::new(TrailStyle::Missile, capacity, particle_lifetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{HeadlessScene, Viewport};

    fn scene() -> HeadlessScene {
        HeadlessScene::new(Viewport::new(640, 480, 20.0))
    }

    fn missile_at(position: DVec3, config: &MissileConfig) -> Missile {
        Missile::new("T_M001".to_string(), 1, position, config, missile_trail(50, 2.0))
    }

    #[test]
    fn test_age_increases_by_dt_until_timeout() {
        let mut scene = scene();
        let config = MissileConfig {
            max_lifetime_s: 1.0,
            turn_factor: 0.0,
            ..MissileConfig::default()
        };
        // ターゲットは遠方に置き、寿命以外で終了しないようにする
        let mut missile = missile_at(DVec3::ZERO, &config).with_heading(DVec3::X);
        missile.acquire_target(Some(DVec3::new(0.0, 1000.0, 0.0)));

        let dt = 0.125;
        let mut expected_age = 0.0;
        for _ in 0..8 {
            assert!(missile.update(&mut scene, dt));
            expected_age += dt;
            assert_eq!(missile.age, expected_age);
        }
        // 9回目で寿命1.0を超える
        assert!(!missile.update(&mut scene, dt));
        assert_eq!(missile.end_reason, Some(MissileEndReason::TimedOut));
        assert!(!missile.update(&mut scene, dt));
    }

    #[test]
    fn test_closing_distance_decreases_until_direct_hit() {
        let mut scene = scene();
        let config = MissileConfig::default();
        let target = DVec3::new(0.0, 20.0, 0.0);
        let mut missile = missile_at(DVec3::ZERO, &config);
        missile.acquire_target(Some(target));

        let dt = 1.0 / 60.0;
        let mut previous = missile.position.distance(target);
        let mut frames = 0;
        loop {
            frames += 1;
            assert!(frames < 1000, "missile never reached the target");
            let alive = missile.update(&mut scene, dt);
            let distance = missile.position.distance(target);
            assert!(distance < previous);
            if distance < config.proximity_radius {
                assert!(!alive, "must detonate on the update that crosses the proximity radius");
                break;
            }
            assert!(alive);
            previous = distance;
        }
        assert_eq!(missile.end_reason, Some(MissileEndReason::DirectHit));
        assert!(missile.distance_to_target().is_some_and(|d| d < config.proximity_radius));
    }

    #[test]
    fn test_guided_missile_turns_towards_offset_target() {
        let mut scene = scene();
        let config = MissileConfig::default();
        let target = DVec3::new(10.0, 8.0, 0.0);
        let mut missile = missile_at(DVec3::ZERO, &config);
        missile.acquire_target(Some(target));

        let initial_alignment = missile.forward().dot((target - missile.position).normalize());
        for _ in 0..30 {
            if !missile.update(&mut scene, 1.0 / 60.0) {
                break;
            }
        }
        let alignment = missile.forward().dot((target - missile.position).normalize());
        assert!(alignment > initial_alignment);
        assert!((missile.forward().length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flyby_detonates_after_separation() {
        let mut scene = scene();
        // 誘導なしで+Y方向に直進し、ターゲット脇 1.8 を通過させる
        let config = MissileConfig {
            speed: 1.0,
            turn_factor: 0.0,
            max_lifetime_s: 100.0,
            ..MissileConfig::default()
        };
        let target = DVec3::new(1.8, 5.0, 0.0);
        let mut missile = missile_at(DVec3::ZERO, &config);
        missile.acquire_target(Some(target));

        let dt = 0.1;
        let mut closest = f64::INFINITY;
        let mut past_closest = false;
        for _ in 0..200 {
            let alive = missile.update(&mut scene, dt);
            let distance = missile.position.distance(target);
            if distance > closest {
                past_closest = true;
            }
            closest = closest.min(distance);

            if past_closest && distance > config.separation_radius {
                assert!(!alive);
                assert_eq!(missile.end_reason, Some(MissileEndReason::FlybySelfDestruct));
                assert!(closest > config.proximity_radius);
                return;
            }
            assert!(alive, "missile detonated early at distance {}", distance);
        }
        panic!("missile never separated from the target");
    }

    #[test]
    fn test_guided_flyby_detonates_after_separation() {
        let mut scene = scene();
        // 既定の旋回係数のまま高速で接近させ、曲がり切れずに脇を抜けさせる
        let config = MissileConfig {
            speed: 24.0,
            ..MissileConfig::default()
        };
        let target = DVec3::new(2.0, 3.0, 0.0);
        let mut missile = missile_at(DVec3::ZERO, &config);
        missile.acquire_target(Some(target));

        let dt = 1.0 / 60.0;
        let mut previous = missile.position.distance(target);
        let mut closest = previous;
        let mut receding = false;
        for _ in 0..60 {
            let alive = missile.update(&mut scene, dt);
            let distance = missile.position.distance(target);
            if distance > previous {
                receding = true;
            } else {
                assert!(!receding, "distance must not shrink again after the closest approach");
            }
            closest = closest.min(distance);
            previous = distance;

            if !alive {
                assert!(receding);
                assert_eq!(missile.end_reason, Some(MissileEndReason::FlybySelfDestruct));
                assert!(distance > config.separation_radius);
                assert!(closest > config.proximity_radius && closest < config.pass_detect_radius);
                // 誘導により+Yから目標側へ向きを変えている
                assert!(missile.forward().x > 0.2);
                return;
            }
        }
        panic!("guided missile never separated from the target");
    }

    #[test]
    fn test_missing_target_self_destructs() {
        let mut scene = scene();
        let mut missile = missile_at(DVec3::ZERO, &MissileConfig::default());
        missile.acquire_target(None);
        assert!(!missile.update(&mut scene, 0.016));
        assert_eq!(missile.end_reason, Some(MissileEndReason::TargetLost));
    }

    #[test]
    fn test_target_at_missile_position_keeps_heading() {
        let mut missile = missile_at(DVec3::ONE, &MissileConfig::default()).with_heading(DVec3::Z);
        let before = missile.forward();
        missile.steer_towards(DVec3::ONE);
        assert!((missile.forward() - before).length() < 1e-12);
    }

    #[test]
    fn test_dispose_removes_body_and_trail() {
        let mut scene = scene();
        let mut missile = missile_at(DVec3::ZERO, &MissileConfig::default());
        missile.attach(&mut scene);
        missile.acquire_target(Some(DVec3::new(0.0, 50.0, 0.0)));
        for _ in 0..10 {
            missile.update(&mut scene, 1.0 / 60.0);
        }
        assert_eq!(scene.live_node_count_of(NodeKind::Missile), 1);
        assert_eq!(missile.trail().len(), 10);

        missile.dispose(&mut scene);
        assert_eq!(scene.live_node_count(), 0);
    }
}
