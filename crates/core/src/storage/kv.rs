use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(10);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// String key/value store backing the toggles and fired markers.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Sets `key` to `value` unless it already holds it. Returns true when this call changed
    /// it. Atomic across every handle on the same backing store.
    async fn claim(&self, key: &str, value: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn claim(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}

/// Flat JSON object on disk.
///
/// Writes go through a temp file in the same directory and an atomic rename. Read-modify-write
/// cycles hold `<path>.lock`, created exclusively, so processes sharing the file serialize.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    async fn update<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let _g = self.guard.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let dir = parent_dir(&path);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create {} failed", dir.display()))?;

            let _lock = LockFile::acquire(&lock_path(&path))?;
            let mut all = match std::fs::read_to_string(&path) {
                Ok(data) => parse_map(&data, &path)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
                Err(e) => {
                    return Err(e).with_context(|| format!("read {} failed", path.display()))
                }
            };
            let out = f(&mut all);
            write_atomic(&path, &dir, &all)?;
            Ok(out)
        })
        .await
        .context("state file task failed")?
    }
}

#[async_trait::async_trait]
impl KvStore for FileKvStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read {} failed", self.path.display()))
            }
        };
        Ok(parse_map(&data, &self.path)?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(move |all| {
            all.insert(key, value);
        })
        .await
    }

    async fn claim(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(move |all| {
            if all.get(&key) == Some(&value) {
                return false;
            }
            all.insert(key, value);
            true
        })
        .await
    }
}

fn parse_map(data: &str, path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(data).with_context(|| format!("parse {} failed", path.display()))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn write_atomic(path: &Path, dir: &Path, all: &BTreeMap<String, String>) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(all).context("serialize kv state failed")?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {} failed", dir.display()))?;
    tmp.write_all(data.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .context("write temp state file failed")?;
    tmp.persist(path)
        .with_context(|| format!("replace {} failed", path.display()))?;
    Ok(())
}

/// Exclusive `.lock` file, removed on drop. A lock older than `LOCK_STALE_AFTER` is assumed
/// to belong to a crashed process and is broken.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: &Path) -> anyhow::Result<Self> {
        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path) {
                        tracing::warn!(path = %path.display(), "breaking stale state lock");
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    anyhow::ensure!(
                        Instant::now() < deadline,
                        "timed out waiting for {}",
                        path.display()
                    );
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("create {} failed", path.display()))
                }
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

#[derive(Debug, Clone)]
pub struct PgKvStore {
    pool: sqlx::PgPool,
}

impl PgKvStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KvStore for PgKvStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM app_kv WHERE key = $1")
            .persistent(false)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("select app_kv failed (key={key})"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO app_kv (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert app_kv failed (key={key})"))?;
        Ok(())
    }

    async fn claim(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        // The conflicting row is locked by the upsert; a concurrent claim of the same value
        // sees it already set and returns no row.
        let claimed: Option<String> = sqlx::query_scalar(
            "INSERT INTO app_kv (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at \
             WHERE app_kv.value <> EXCLUDED.value \
             RETURNING key",
        )
        .persistent(false)
        .bind(key)
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("claim app_kv failed (key={key})"))?;
        Ok(claimed.is_some())
    }
}
