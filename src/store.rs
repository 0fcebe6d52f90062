use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use redis::AsyncCommands;
use thiserror::Error;
use tracing::warn;

use crate::config::{StoreBackend, StoreConfig};

/// トークンID採番カウンターのキー
pub const COUNTER_KEY: &str = "nft:counter";

const METADATA_KEY_PREFIX: &str = "nft:metadata:";

/// 正規化済みトークンIDに対応する保存キー
pub fn metadata_key(token_id: &str) -> String {
    format!("{METADATA_KEY_PREFIX}{token_id}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid store key: {0}")]
    InvalidKey(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(value: redis::RedisError) -> Self {
        Self::Unavailable(value.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

/// 設定で選んだバックエンドに委譲するメタデータストア
pub enum MetadataStore {
    Redis(RedisStore),
    File(FileStore),
    Memory(MemoryStore),
}

impl MetadataStore {
    pub fn from_config(cfg: &StoreConfig) -> Result<Self, StoreError> {
        match cfg.backend {
            StoreBackend::Redis => Ok(Self::Redis(RedisStore::connect(&cfg.redis_url)?)),
            StoreBackend::File => Ok(Self::File(FileStore::open(&cfg.data_dir)?)),
            StoreBackend::Memory => Ok(Self::Memory(MemoryStore::new())),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Redis(store) => store.get(key).await,
            Self::File(store) => store.get(key),
            Self::Memory(store) => store.get(key),
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            Self::Redis(store) => store.set(key, value).await,
            Self::File(store) => store.set(key, value),
            Self::Memory(store) => store.set(key, value),
        }
    }

    /// キーの整数値を1増やし、増加後の値を返す
    pub async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        match self {
            Self::Redis(store) => store.incr(key).await,
            Self::File(store) => store.incr(key),
            Self::Memory(store) => store.incr(key),
        }
    }

    /// カウンターを進めて新しいトークンIDを払い出す
    pub async fn next_token_id(&self) -> Result<String, StoreError> {
        Ok(self.incr(COUNTER_KEY).await?.to_string())
    }

    /// カウンターを "0" に戻す(次の採番は1)
    pub async fn reset_counter(&self) -> Result<(), StoreError> {
        self.set(COUNTER_KEY, "0").await
    }
}

/// Redisバックエンド。接続はリクエスト毎に取得する
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                warn!(error = %err, "redis connection failed");
                Err(err.into())
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    pub async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection().await?;
        // RedisのINCRは読み書きを挟めないため採番が競合しない
        Ok(conn.incr(key, 1).await?)
    }
}

/// ファイルバックエンド。`{dir}/{token_id}.json` と `{dir}/counter` に保存する
pub struct FileStore {
    dir: PathBuf,
    counter_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            counter_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key == COUNTER_KEY {
            return Ok(self.dir.join("counter"));
        }
        let Some(token_id) = key.strip_prefix(METADATA_KEY_PREFIX) else {
            return Err(StoreError::InvalidKey(key.to_string()));
        };
        // ファイル名に使えない文字を含むIDはディレクトリ外を指せてしまう
        let safe = !token_id.is_empty()
            && !token_id.contains("..")
            && token_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{token_id}.json")))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::write(path, value)?;
        Ok(())
    }

    pub fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let path = self.path_for(key)?;
        let _guard = self
            .counter_lock
            .lock()
            .expect("カウンターロックの取得に失敗しました");
        let current = match fs::read_to_string(&path) {
            Ok(text) => text.trim().parse::<i64>().unwrap_or(0),
            Err(err) if err.kind() == ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        };
        let next = current + 1;
        fs::write(&path, next.to_string())?;
        Ok(next)
    }
}

/// インメモリバックエンド。テストと開発用
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    incr_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.lock().expect("エントリロックの取得に失敗しました");
        Ok(entries.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_calls.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().expect("エントリロックの取得に失敗しました");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_calls.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().expect("エントリロックの取得に失敗しました");
        let current = entries
            .get(key)
            .and_then(|text| text.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::Relaxed)
    }

    pub fn set_call_count(&self) -> usize {
        self.set_calls.load(Ordering::Relaxed)
    }

    pub fn incr_call_count(&self) -> usize {
        self.incr_calls.load(Ordering::Relaxed)
    }
}
