use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;

/// 日期（YYYY-MM-DD）到当日请求次数的映射，即日志文件的内容
pub type UsageLog = BTreeMap<String, u32>;

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("daily limit of {limit} reached for {date}")]
    LimitReached { date: String, limit: u32 },
    #[error("failed to access usage log {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("usage log {} is not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 按天计数的请求闸门，计数持久化在一个 JSON 文件里
pub struct UsageGate {
    path: PathBuf,
    daily_limit: u32,
    // 串行化本进程内的读-改-写；跨进程仍然没有锁
    lock: Mutex<()>,
}

impl UsageGate {
    pub fn new(path: impl Into<PathBuf>, daily_limit: u32) -> Self {
        Self {
            path: path.into(),
            daily_limit,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// 读取日志，文件不存在时返回空映射
    pub async fn load(&self) -> Result<UsageLog, UsageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(UsageLog::new()),
            Err(source) => {
                return Err(UsageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| UsageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// 先写临时文件再 rename 覆盖
    pub async fn save(&self, log: &UsageLog) -> Result<(), UsageError> {
        let json = serde_json::to_vec(log).map_err(|source| UsageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err = |source: std::io::Error| UsageError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    pub async fn count_on(&self, date: NaiveDate) -> Result<u32, UsageError> {
        let log = self.load().await?;
        Ok(log.get(&date_key(date)).copied().unwrap_or(0))
    }

    /// 以本地日期检查并记录一次请求
    pub async fn check_limit(&self) -> Result<u32, UsageError> {
        self.check_limit_on(Local::now().date_naive()).await
    }

    /// 达到上限时拒绝，否则计数加一并返回新的计数
    pub async fn check_limit_on(&self, date: NaiveDate) -> Result<u32, UsageError> {
        let _guard = self.lock.lock().await;

        let mut log = self.load().await?;
        let key = date_key(date);
        let count = log.get(&key).copied().unwrap_or(0);

        if count >= self.daily_limit {
            tracing::warn!(date = %key, count, limit = self.daily_limit, "daily usage limit reached");
            return Err(UsageError::LimitReached {
                date: key,
                limit: self.daily_limit,
            });
        }

        log.insert(key, count + 1);
        self.save(&log).await?;
        tracing::debug!(count = count + 1, limit = self.daily_limit, "usage recorded");
        Ok(count + 1)
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
