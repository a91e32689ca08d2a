use glam::DVec3;

use crate::scene::SceneGraph;

/// 毎フレーム更新される全てのエフェクトが実装する基本インターフェース
pub trait IEffect {
    /// 1フレームの更新。動作を継続する場合はtrue
    fn update(&mut self, scene: &mut dyn SceneGraph, dt: f64) -> bool;

    /// シーンから描画リソースを解放
    fn dispose(&mut self, scene: &mut dyn SceneGraph);

    /// エフェクトIDの取得
    fn get_id(&self) -> String;

    /// エフェクトが動作中かどうか
    fn is_alive(&self) -> bool;
}

/// 誘導対象を追尾するエフェクトのインターフェース
pub trait IHoming {
    /// 今フレームのターゲット位置を設定（Noneはターゲット消失）
    fn acquire_target(&mut self, target: Option<DVec3>);

    /// 直近に観測したターゲットまでの距離
    fn distance_to_target(&self) -> Option<f64>;
}
