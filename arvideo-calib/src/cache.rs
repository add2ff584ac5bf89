//! 本地内参缓存
//!
//! 键为 (设备身份串, 摄像头序号)，每个键下可以有多个分辨率的内参。
//! 设置了缓存目录时，每次写入都会持久化到 `<cache_dir>/cparam_cache.json`。

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::params::CameraParams;

pub const CACHE_FILE_NAME: &str = "cparam_cache.json";
const CACHE_FILE_VERSION: u32 = 1;

static PERSIST_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    device_id: String,
    camera_index: i32,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    device_id: String,
    camera_index: i32,
    params: CameraParams,
}

#[derive(Debug, Default)]
pub struct ParamCache {
    entries: RwLock<HashMap<CacheKey, Vec<CameraParams>>>,
    path: Option<PathBuf>,
}

impl ParamCache {
    /// 仅内存缓存
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 打开目录中的缓存文件；文件不存在或损坏时从空缓存开始
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(CACHE_FILE_NAME);
        let map = read_cache_file(&path)?;
        tracing::debug!(target: "arvideo::calib", path = %path.display(), keys = map.len(), "loaded calibration cache");

        Ok(Self {
            entries: RwLock::new(map),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 查找内参
    ///
    /// 1. 分辨率完全匹配的条目
    /// 2. 宽高比一致的条目，缩放到请求的分辨率
    pub fn lookup(&self, device_id: &str, camera_index: i32, width: u32, height: u32) -> Option<CameraParams> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let list = entries.get(&CacheKey {
            device_id: device_id.to_owned(),
            camera_index,
        })?;

        if let Some(exact) = list.iter().find(|p| p.width == width && p.height == height) {
            return Some(exact.clone());
        }
        list.iter()
            .filter(|p| p.aspect_matches(width, height))
            .find_map(|p| p.change_size(width, height).ok())
    }

    /// 写入 (同分辨率的旧条目被替换)，有缓存文件时持久化
    pub fn insert(&self, device_id: &str, camera_index: i32, params: CameraParams) -> std::io::Result<()> {
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let list = entries
                .entry(CacheKey {
                    device_id: device_id.to_owned(),
                    camera_index,
                })
                .or_default();
            list.retain(|p| !(p.width == params.width && p.height == params.height));
            list.push(params);
        }
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 持久化
    ///
    /// 多个会话可以共用同一个缓存目录，所以写入前先合并磁盘上的条目。
    /// 同一键同一分辨率以内存中的为准。
    fn persist(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        // 进程内串行化 "读取-合并-写入"
        let _guard = PERSIST_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let on_disk = read_cache_file(path)?;
        let file = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            for (key, list) in on_disk {
                let mine = entries.entry(key).or_default();
                for p in list {
                    if !mine.iter().any(|m| m.width == p.width && m.height == p.height) {
                        mine.push(p);
                    }
                }
            }
            CacheFile {
                version: CACHE_FILE_VERSION,
                entries: entries
                    .iter()
                    .flat_map(|(k, list)| {
                        list.iter().map(move |p| CacheEntry {
                            device_id: k.device_id.clone(),
                            camera_index: k.camera_index,
                            params: p.clone(),
                        })
                    })
                    .collect(),
            }
        };
        let json = serde_json::to_vec_pretty(&file).map_err(std::io::Error::other)?;

        // 先写唯一命名的临时文件再改名，避免留下半个文件
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// 读取缓存文件；不存在、版本不符或内容损坏时返回空表
fn read_cache_file(path: &Path) -> std::io::Result<HashMap<CacheKey, Vec<CameraParams>>> {
    let mut map: HashMap<CacheKey, Vec<CameraParams>> = HashMap::new();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(map),
        Err(e) => return Err(e),
    };
    match serde_json::from_slice::<CacheFile>(&bytes) {
        Ok(file) if file.version == CACHE_FILE_VERSION => {
            for e in file.entries {
                map.entry(CacheKey {
                    device_id: e.device_id,
                    camera_index: e.camera_index,
                })
                .or_default()
                .push(e.params);
            }
        }
        Ok(file) => {
            tracing::warn!(target: "arvideo::calib", "ignoring calibration cache with version {}", file.version);
        }
        Err(e) => {
            tracing::warn!(target: "arvideo::calib", path = %path.display(), "ignoring corrupt calibration cache: {}", e);
        }
    }
    Ok(map)
}
