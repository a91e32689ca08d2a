use glam::DVec3;
use rand::Rng;

use crate::models::{common::EffectStatus, traits::IEffect};
use crate::scenario::ExplosionConfig;
use crate::scene::{MaterialParams, NodeId, NodeKind, NodeTransform, SceneGraph};

/// 爆発エフェクト
///
/// 固定数のパーティクルをランダムな方向へ飛散させ、寿命に応じて
/// 透明度を下げつつポイントサイズを大きくします。
#[derive(Debug, Clone)]
pub struct Explosion {
    pub id: String,
    pub origin: DVec3,
    pub status: EffectStatus,
    pub lifetime: f64,
    pub max_lifetime: f64,
    pub base_size: f64,
    pub size_growth: f64,
    positions: Vec<DVec3>,
    velocities: Vec<DVec3>,
    node: Option<NodeId>,
}

impl Explosion {
    pub fn new<R: Rng>(id: String, origin: DVec3, config: &ExplosionConfig, rng: &mut R) -> Self {
        let count = config.particle_count;
        let velocities = (0..count)
            .map(|_| {
                let raw = DVec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                let direction = raw.try_normalize().unwrap_or(DVec3::Y);
                let speed = if config.speed_max > config.speed_min {
                    rng.gen_range(config.speed_min..config.speed_max)
                } else {
                    config.speed_min
                };
                direction * speed
            })
            .collect();

        Self {
            id,
            origin,
            status: EffectStatus::Alive,
            lifetime: 0.0,
            max_lifetime: config.lifetime_s,
            base_size: config.base_size,
            size_growth: config.size_growth,
            positions: vec![origin; count],
            velocities,
            node: None,
        }
    }

    /// シーンにポイント群ノードを登録
    pub fn attach(&mut self, scene: &mut dyn SceneGraph) {
        if self.node.is_some() {
            return;
        }
        let node = scene.add_node(NodeKind::Explosion, NodeTransform::at(self.origin));
        scene.update_points(node, &self.positions);
        scene.update_material(
            node,
            MaterialParams {
                opacity: 1.0,
                size: self.base_size,
            },
        );
        self.node = Some(node);
    }

    #[cfg(test)]
    pub fn particle_positions(&self) -> &[DVec3] {
        &self.positions
    }

    #[cfg(test)]
    pub fn particle_velocities(&self) -> &[DVec3] {
        &self.velocities
    }

    /// 現在の透明度とサイズ
    pub fn material(&self) -> MaterialParams {
        let life_ratio = (self.lifetime / self.max_lifetime).min(1.0);
        MaterialParams {
            opacity: (1.0 - life_ratio).max(0.0),
            size: self.base_size + life_ratio * self.size_growth,
        }
    }
}

impl IEffect for Explosion {
    fn update(&mut self, scene: &mut dyn SceneGraph, dt: f64) -> bool {
        if self.status != EffectStatus::Alive {
            return false;
        }

        self.lifetime += dt;
        if self.lifetime > self.max_lifetime {
            self.status = EffectStatus::Expired;
            self.dispose(scene);
            return false;
        }

        for (position, velocity) in self.positions.iter_mut().zip(&self.velocities) {
            *position += *velocity * dt;
        }

        if let Some(node) = self.node {
            scene.update_points(node, &self.positions);
            scene.update_material(node, self.material());
        }

        true
    }

    fn dispose(&mut self, scene: &mut dyn SceneGraph) {
        if let Some(node) = self.node.take() {
            scene.remove_node(node);
        }
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
