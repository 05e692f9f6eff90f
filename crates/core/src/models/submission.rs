use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 客户端提交的待分析文件
///
/// 文件内容由外部上传层落盘，这里只持有路径和已计算好的内容哈希。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: Uuid,
    pub file_name: String,
    pub payload_path: PathBuf,
    pub sha256: String,
    pub md5: Option<String>,
    pub submitted_at: DateTime<Utc>,
    /// 在积压队列中的过期时间
    pub expires_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn new(
        file_name: impl Into<String>,
        payload_path: impl Into<PathBuf>,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            payload_path: payload_path.into(),
            sha256: sha256.into(),
            md5: None,
            submitted_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// 校验提交是否可被调度
    pub fn validate(&self) -> Result<(), String> {
        if self.sha256.trim().is_empty() {
            return Err("内容哈希不能为空".to_string());
        }
        if self.file_name.trim().is_empty() {
            return Err("文件名不能为空".to_string());
        }
        Ok(())
    }
}
