use std::collections::VecDeque;

use glam::DVec3;

use crate::scene::{MaterialParams, NodeId, NodeKind, NodeTransform, SceneGraph};

/// 排出元ごとの煙の見た目
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailStyle {
    /// 戦闘機の飛行機雲（細く薄い）
    Aircraft,
    /// ミサイルの噴煙（太く濃い）
    Missile,
}

impl TrailStyle {
    pub fn default_capacity(&self) -> usize {
        match self {
            TrailStyle::Aircraft => 200,
            TrailStyle::Missile => 50,
        }
    }

    /// パーティクルの基本サイズ
    pub fn base_size(&self) -> f64 {
        match self {
            TrailStyle::Aircraft => 0.012,
            TrailStyle::Missile => 0.02,
        }
    }

    pub fn base_opacity(&self) -> f64 {
        match self {
            TrailStyle::Aircraft => 0.4,
            TrailStyle::Missile => 0.7,
        }
    }

    /// 寿命全体でのスケール成長量
    pub fn growth(&self) -> f64 {
        match self {
            TrailStyle::Aircraft => 0.3,
            TrailStyle::Missile => 0.2,
        }
    }
}

#[derive(Debug, Clone)]
struct TrailParticle {
    position: DVec3,
    age: f64,
    node: NodeId,
}

/// 飛行機雲・噴煙エフェクト
///
/// 排出位置の履歴をリングバッファで保持し、容量を超えた古いパーティクルは
/// シーンから削除されます。排出元（戦闘機・ミサイル）が単独で所有します。
#[derive(Debug, Clone)]
pub struct SmokeTrail {
    pub style: TrailStyle,
    pub capacity: usize,
    pub particle_lifetime: f64,
    particles: VecDeque<TrailParticle>,
}

impl SmokeTrail {
    pub fn new(style: TrailStyle, capacity: usize, particle_lifetime: f64) -> Self {
        Self {
            style,
            capacity: capacity.max(1),
            particle_lifetime,
            particles: VecDeque::with_capacity(capacity.max(1) + 1),
        }
    }

    #[cfg(test)]
    pub fn with_style(style: TrailStyle) -> Self {
        Self::new(style, style.default_capacity(), 2.0)
    }

    /// 新しい排出位置を追加して全パーティクルを更新
    pub fn update(&mut self, scene: &mut dyn SceneGraph, position: DVec3, dt: f64) {
        let node = scene.add_node(
            NodeKind::SmokeParticle,
            NodeTransform::at(position),
        );
        self.particles.push_back(TrailParticle {
            position,
            age: 0.0,
            node,
        });

        while self.particles.len() > self.capacity {
            if let Some(oldest) = self.particles.pop_front() {
                scene.remove_node(oldest.node);
            }
        }

        let base_opacity = self.style.base_opacity();
        let growth = self.style.growth();
        for particle in &mut self.particles {
            particle.age += dt;

            let life_ratio = particle.age / self.particle_lifetime;
            if life_ratio >= 1.0 {
                continue;
            }
            let mut transform = NodeTransform::at(particle.position);
            transform.scale = 1.0 + life_ratio * growth;
            scene.update_transform(particle.node, transform);
            scene.update_material(
                particle.node,
                MaterialParams {
                    opacity: (base_opacity * (1.0 - life_ratio)).max(0.0),
                    size: self.style.base_size(),
                },
            );
        }
    }

    /// 全パーティクルを即座に削除
    pub fn dispose(&mut self, scene: &mut dyn SceneGraph) {
        for particle in self.particles.drain(..) {
            scene.remove_node(particle.node);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// 最も新しいパーティクルの位置
    #[cfg(test)]
    pub fn newest_position(&self) -> Option<DVec3> {
        self.particles.back().map(|p| p.position)
    }

    /// 最も古いパーティクルの年齢
    #[cfg(test)]
    pub fn oldest_age(&self) -> Option<f64> {
        self.particles.front().map(|p| p.age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{HeadlessScene, Viewport};

    fn scene() -> HeadlessScene {
        HeadlessScene::new(Viewport::new(640, 480, 20.0))
    }

    #[test]
    fn test_trail_never_exceeds_capacity() {
        let mut scene = scene();
        let mut trail = SmokeTrail::new(TrailStyle::Missile, 50, 2.0);
        for i in 0..120 {
            trail.update(&mut scene, DVec3::new(i as f64, 0.0, 0.0), 1.0 / 60.0);
            assert!(trail.len() <= 50);
        }
        assert_eq!(trail.len(), 50);
        assert_eq!(scene.live_node_count_of(NodeKind::SmokeParticle), 50);
        assert_eq!(trail.newest_position(), Some(DVec3::new(119.0, 0.0, 0.0)));
    }

    #[test]
    fn test_trail_evicts_oldest_first() {
        let mut scene = scene();
        let mut trail = SmokeTrail::new(TrailStyle::Aircraft, 3, 2.0);
        for _ in 0..5 {
            trail.update(&mut scene, DVec3::ZERO, 0.5);
        }
        // 残るのは直近3回分: 年齢は 1.5, 1.0, 0.5
        assert_eq!(trail.len(), 3);
        assert!((trail.oldest_age().unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_dispose_releases_all_nodes() {
        let mut scene = scene();
        let mut trail = SmokeTrail::with_style(TrailStyle::Aircraft);
        for _ in 0..10 {
            trail.update(&mut scene, DVec3::ZERO, 0.1);
        }
        trail.dispose(&mut scene);
        assert!(trail.is_empty());
        assert_eq!(scene.live_node_count(), 0);
    }
}
