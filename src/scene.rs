//! # Scene モジュール
//!
//! 描画側（シーングラフ）との境界を定義します。
//!
//! シミュレーションはメッシュ管理やGPUバッファ更新を行わず、`SceneGraph`
//! トレイトを通してノードの追加・更新・削除とカメラ設定だけを依頼します。
//! ヘッドレス実行用の `HeadlessScene` はノードをslotmapで保持し、
//! 各フレームの状態をJSON Lines形式のトレースとして書き出せます。

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use glam::{DQuat, DVec3};
use serde::Serialize;
use slotmap::SlotMap;
use tracing::debug;

slotmap::new_key_type! {
    /// シーングラフ上のノードハンドル
    pub struct NodeId;
}

/// ノードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeKind {
    Aircraft,
    Missile,
    Explosion,
    SmokeParticle,
}

/// ノードの変換（位置・姿勢・一様スケール）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    pub position: DVec3,
    pub orientation: DQuat,
    pub scale: f64,
}

impl NodeTransform {
    pub fn at(position: DVec3) -> Self {
        Self {
            position,
            orientation: DQuat::IDENTITY,
            scale: 1.0,
        }
    }
}

/// 半透明マテリアルのパラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub opacity: f64,
    pub size: f64,
}

/// カメラの位置と注視点
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPose {
    pub position: DVec3,
    pub look_at: DVec3,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: DVec3::new(0.0, 5.0, 10.0),
            look_at: DVec3::ZERO,
        }
    }
}

/// 透視投影と出力サイズ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub fov_deg: f64,
    pub near: f64,
    pub far: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, fov_deg: f64) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fov_deg,
            near: 0.1,
            far: 1000.0,
        }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// リサイズ（0は1に丸める）
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("トレースファイルを作成できません {path}: {1}", path = .0.display())]
    TraceCreate(PathBuf, #[source] std::io::Error),

    #[error("トレース書き込みエラー: {0}")]
    TraceWrite(#[from] std::io::Error),

    #[error("トレースのシリアライズに失敗: {0}")]
    TraceEncode(#[from] serde_json::Error),
}

/// 外部の描画エンジンが担う機能
pub trait SceneGraph {
    fn add_node(&mut self, kind: NodeKind, transform: NodeTransform) -> NodeId;

    fn update_transform(&mut self, id: NodeId, transform: NodeTransform);

    fn update_material(&mut self, id: NodeId, material: MaterialParams);

    /// ポイント群ノードの頂点位置を更新
    fn update_points(&mut self, id: NodeId, points: &[DVec3]);

    /// ノードを削除して描画リソースを解放（存在しなければfalse）
    fn remove_node(&mut self, id: NodeId) -> bool;

    fn set_camera(&mut self, pose: CameraPose);

    fn resize(&mut self, width: u32, height: u32);

    fn viewport(&self) -> Viewport;

    fn render(&mut self, frame: u64, time: f64) -> Result<(), SceneError>;

    /// バッファ済みの出力を書き出す
    fn flush(&mut self) -> Result<(), SceneError> {
        Ok(())
    }

    fn live_node_count(&self) -> usize;

    fn live_node_count_of(&self, kind: NodeKind) -> usize;
}

#[derive(Debug, Clone)]
struct SceneNode {
    kind: NodeKind,
    transform: NodeTransform,
    material: Option<MaterialParams>,
    points: Vec<DVec3>,
}

/// 1フレーム分のトレースレコード
#[derive(Debug, Serialize)]
struct FrameRecord {
    frame: u64,
    time: f64,
    camera: CameraPose,
    aspect: f64,
    aircraft: Option<DVec3>,
    missiles: Vec<DVec3>,
    node_counts: BTreeMap<NodeKind, usize>,
}

/// 描画を行わずにノード状態だけを保持するシーン
pub struct HeadlessScene {
    nodes: SlotMap<NodeId, SceneNode>,
    camera: CameraPose,
    viewport: Viewport,
    trace: Option<BufWriter<File>>,
    frames_rendered: u64,
}

impl HeadlessScene {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            camera: CameraPose::default(),
            viewport,
            trace: None,
            frames_rendered: 0,
        }
    }

    /// フレームトレースを書き出すシーンを作成
    pub fn with_trace<P: AsRef<Path>>(viewport: Viewport, path: P) -> Result<Self, SceneError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SceneError::TraceCreate(path.to_path_buf(), e))?;
        }
        let file = File::create(path).map_err(|e| SceneError::TraceCreate(path.to_path_buf(), e))?;
        let mut scene = Self::new(viewport);
        scene.trace = Some(BufWriter::new(file));
        Ok(scene)
    }

    fn positions_of(&self, kind: NodeKind) -> Vec<DVec3> {
        self.nodes
            .values()
            .filter(|n| n.kind == kind)
            .map(|n| n.transform.position)
            .collect()
    }
}

impl SceneGraph for HeadlessScene {
    fn add_node(&mut self, kind: NodeKind, transform: NodeTransform) -> NodeId {
        self.nodes.insert(SceneNode {
            kind,
            transform,
            material: None,
            points: Vec::new(),
        })
    }

    fn update_transform(&mut self, id: NodeId, transform: NodeTransform) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.transform = transform;
        }
    }

    fn update_material(&mut self, id: NodeId, material: MaterialParams) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.material = Some(material);
        }
    }

    fn update_points(&mut self, id: NodeId, points: &[DVec3]) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.points.clear();
            node.points.extend_from_slice(points);
        }
    }

    fn remove_node(&mut self, id: NodeId) -> bool {
        self.nodes.remove(id).is_some()
    }

    fn set_camera(&mut self, pose: CameraPose) {
        self.camera = pose;
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.viewport.resize(width, height);
        debug!(
            width = self.viewport.width,
            height = self.viewport.height,
            aspect = self.viewport.aspect(),
            "VIEWPORT_RESIZED: 描画サイズを更新しました"
        );
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn render(&mut self, frame: u64, time: f64) -> Result<(), SceneError> {
        self.frames_rendered += 1;
        if self.trace.is_none() {
            return Ok(());
        }

        let mut node_counts = BTreeMap::new();
        for node in self.nodes.values() {
            *node_counts.entry(node.kind).or_insert(0) += 1;
        }
        let record = FrameRecord {
            frame,
            time,
            camera: self.camera,
            aspect: self.viewport.aspect(),
            aircraft: self.positions_of(NodeKind::Aircraft).first().copied(),
            missiles: self.positions_of(NodeKind::Missile),
            node_counts,
        };

        if let Some(trace) = self.trace.as_mut() {
            serde_json::to_writer(&mut *trace, &record)?;
            trace.write_all(b"\n")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SceneError> {
        if let Some(trace) = self.trace.as_mut() {
            trace.flush()?;
            debug!(frames = self.frames_rendered, "フレームトレースを書き出しました");
        }
        Ok(())
    }

    fn live_node_count(&self) -> usize {
        self.nodes.len()
    }

    fn live_node_count_of(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|n| n.kind == kind).count()
    }
}
