//! # Assets モジュール
//!
//! 戦闘機モデル（glTF/GLB）の非同期読み込みを行います。
//!
//! 読み込みはtokioランタイム上で実行され、フレームループは毎フレーム
//! `PendingModel::poll` で完了を確認します。読み込み中もループは進み続け、
//! 完了するまで戦闘機は存在しません。

use std::path::{Path, PathBuf};

use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("モデルファイルを読み込めません {path}: {1}", path = .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("glTFの解析に失敗しました {path}: {1}", path = .0.display())]
    Gltf(PathBuf, #[source] gltf::Error),

    #[error("モデル読み込みタスクが中断されました")]
    LoadAborted,
}

/// 読み込み済みモデルの概要
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    pub path: PathBuf,
    pub mesh_count: usize,
    pub node_count: usize,
    pub scene_count: usize,
}

/// モデルファイルを非同期に読み込んで解析
pub async fn load_model(path: &Path) -> Result<ModelAsset, AssetError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AssetError::Io(path.to_path_buf(), e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "モデルファイルを読み込みました");

    let document = gltf::Gltf::from_slice(&bytes).map_err(|e| AssetError::Gltf(path.to_path_buf(), e))?;
    let asset = ModelAsset {
        path: path.to_path_buf(),
        mesh_count: document.meshes().len(),
        node_count: document.nodes().len(),
        scene_count: document.scenes().len(),
    };

    info!(
        path = %path.display(),
        meshes = asset.mesh_count,
        nodes = asset.node_count,
        "MODEL_LOADED: 戦闘機モデルの読み込みが完了しました"
    );
    Ok(asset)
}

/// 読み込み中のモデル
#[derive(Debug)]
pub struct PendingModel {
    receiver: Option<oneshot::Receiver<Result<ModelAsset, AssetError>>>,
}

impl PendingModel {
    /// 完了済みの結果から作成
    #[cfg(test)]
    pub fn ready(result: Result<ModelAsset, AssetError>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(result);
        Self {
            receiver: Some(receiver),
        }
    }

    /// 完了していれば結果を一度だけ返す
    pub fn poll(&mut self) -> Option<Result<ModelAsset, AssetError>> {
        let receiver = self.receiver.as_mut()?;
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(AssetError::LoadAborted),
        };
        self.receiver = None;
        Some(result)
    }

    pub fn is_settled(&self) -> bool {
        self.receiver.is_none()
    }
}

/// ランタイム上でモデル読み込みを開始
pub fn spawn_model_load(runtime: &Handle, path: PathBuf) -> PendingModel {
    let (sender, receiver) = oneshot::channel();
    runtime.spawn(async move {
        let result = load_model(&path).await;
        let _ = sender.send(result);
    });
    PendingModel {
        receiver: Some(receiver),
    }
}
