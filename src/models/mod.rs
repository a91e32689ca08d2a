// 基本的なデータ型と数学ユーティリティ
pub mod common;

// エフェクト・誘導の共通インターフェース（trait）定義
pub mod traits;

// 各エンティティの実装
pub mod smoke_trail;
pub mod missile;
pub mod explosion;
pub mod maneuver;
pub mod aircraft;
pub mod spawner;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use smoke_trail::{SmokeTrail, TrailStyle};
pub use missile::{Missile, MissileKey};
pub use explosion::Explosion;
pub use aircraft::Aircraft;
pub use spawner::{BurstScheduler, SpawnOrder};
