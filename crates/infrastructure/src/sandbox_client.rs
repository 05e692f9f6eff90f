//! 沙箱节点 REST 客户端
//!
//! 直接通过 HTTP 与节点通信，替代外部命令行上传工具。所有请求都带有
//! 客户端级别的超时，文件上传使用单独配置的更长超时。

use std::time::Duration;

use async_trait::async_trait;
use fleet_core::config::SandboxConfig;
use fleet_core::models::{SandboxStatus, Submission, SubmitResponse, TaskViewResponse, Worker};
use fleet_core::{FleetError, FleetResult, SandboxClient};
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

pub struct HttpSandboxClient {
    http_client: reqwest::Client,
    scheme: String,
    port: u16,
    submit_timeout: Duration,
}

impl HttpSandboxClient {
    pub fn new(config: &SandboxConfig) -> FleetResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| FleetError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            http_client,
            scheme: config.scheme.clone(),
            port: config.port,
            submit_timeout: Duration::from_secs(config.submit_timeout_seconds),
        })
    }

    fn base_url(&self, host: &str) -> String {
        format!("{}://{}:{}", self.scheme, host, self.port)
    }
}

#[async_trait]
impl SandboxClient for HttpSandboxClient {
    async fn fetch_status(&self, worker: &Worker) -> FleetResult<SandboxStatus> {
        let url = format!("{}/cuckoo/status", self.base_url(&worker.host));
        debug!("查询Worker状态: {} ({})", worker.name, url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FleetError::unreachable(&worker.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FleetError::unreachable(
                &worker.name,
                format!("HTTP {status}"),
            ));
        }

        response
            .json::<SandboxStatus>()
            .await
            .map_err(|e| FleetError::unreachable(&worker.name, format!("状态响应格式错误: {e}")))
    }

    async fn submit(&self, worker: &Worker, submission: &Submission) -> FleetResult<u64> {
        let content = tokio::fs::read(&submission.payload_path)
            .await
            .map_err(|e| {
                FleetError::InvalidSubmission(format!(
                    "读取提交文件 {} 失败: {e}",
                    submission.payload_path.display()
                ))
            })?;

        let part = Part::bytes(content).file_name(submission.file_name.clone());
        let form = Form::new().part("file", part);
        let url = format!("{}/tasks/create/file", self.base_url(&worker.host));

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .timeout(self.submit_timeout)
            .send()
            .await
            .map_err(|e| FleetError::forward_failed(&worker.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Worker {} 拒绝提交: HTTP {} - {}", worker.name, status, body);
            return Err(FleetError::forward_failed(
                &worker.name,
                format!("HTTP {status} - {body}"),
            ));
        }

        let accepted = response
            .json::<SubmitResponse>()
            .await
            .map_err(|e| FleetError::forward_failed(&worker.name, format!("提交响应格式错误: {e}")))?;

        debug!(
            "Worker {} 接收提交 {}，远端任务ID: {}",
            worker.name, submission.sha256, accepted.task_id
        );
        Ok(accepted.task_id)
    }

    async fn fetch_task_status(&self, host: &str, remote_task_id: u64) -> FleetResult<String> {
        let url = format!("{}/tasks/view/{}", self.base_url(host), remote_task_id);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FleetError::unreachable(host, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FleetError::unreachable(host, format!("HTTP {status}")));
        }

        let view = response
            .json::<TaskViewResponse>()
            .await
            .map_err(|e| FleetError::unreachable(host, format!("任务响应格式错误: {e}")))?;

        Ok(view.task.status)
    }
}
