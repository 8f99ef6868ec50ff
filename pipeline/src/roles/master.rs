// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `master` orchestration role (§4.J/§6): walks a worklist of input
//! filenames, launching throttled ECS workers for whichever pipeline stages
//! (`raw/`, `json/`) a given file hasn't reached yet, and an
//! unthrottled one for the final sort stage. Grounded in `master_get`/
//! `master_sort` in `examples/original_source/src/index.py`.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use pipeline_domain::element::Element;
use pipeline_domain::error::PipelineResult;
use pipeline_domain::funnel::stage_handle;
use pipeline_domain::pipeline::Pipeline;
use pipeline_domain::ports::{ObjectStore, TaskRunner};

use crate::stages::basic::Conditional;
use crate::stages::remote::EcsTask;
use crate::stages::throttling::{AcquireToken, ReleaseToken, TokenQueue};

use super::key_naming;

fn bridge_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build master-role bridge runtime")
}

/// Builds a `Conditional`'s predicate: `!head(bucket, key(item)).is_some()`,
/// the inline equivalent of running `S3KeyExists` synchronously (the
/// `Conditional` contract here is a plain predicate rather than a nested
/// `Stage`, see DESIGN.md).
fn missing_key(store: Arc<dyn ObjectStore>, bucket: String, key: impl Fn(&Element) -> String + 'static) -> impl Fn(&Element) -> bool {
    move |item: &Element| {
        let runtime = bridge_runtime();
        let k = key(item);
        runtime.block_on(store.head(&bucket, &k)).expect("head request failed").is_none()
    }
}

#[allow(clippy::too_many_arguments)]
pub fn master_get(
    store: Arc<dyn ObjectStore>,
    runner: Arc<dyn TaskRunner>,
    ftp_queue: Arc<TokenQueue>,
    json_queue: Arc<TokenQueue>,
    filename: impl Into<String>,
    rowtag: impl Into<String>,
    bucket: impl Into<String>,
    cluster: impl Into<String>,
    task: impl Into<String>,
    security_group: impl Into<String>,
    vpc_subnet: impl Into<String>,
) -> PipelineResult<Vec<Element>> {
    let filename = filename.into();
    let rowtag = rowtag.into();
    let bucket = bucket.into();
    let cluster = cluster.into();
    let task = task.into();
    let security_group = security_group.into();
    let vpc_subnet = vpc_subnet.into();

    let ftp_branch = {
        let bucket = bucket.clone();
        vec![
            stage_handle(AcquireToken::new(ftp_queue.clone(), Duration::from_secs(300))),
            stage_handle(EcsTask::new(runner.clone(), cluster.clone(), task.clone(), security_group.clone(), vpc_subnet.clone(), move |item: &Element| {
                let token = item.as_token().expect("AcquireToken always emits a Token");
                let host = token.item.0.get("Host").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let directory = token.item.0.get("Directory").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                vec![
                    ("TYPE".to_string(), "worker-ftp".to_string()),
                    ("NAME".to_string(), token.value.clone()),
                    ("BUCKET".to_string(), bucket.clone()),
                    ("INPUT".to_string(), token.value.clone()),
                    ("OUTPUT".to_string(), key_naming::raw_key(&token.value)),
                    ("HOST".to_string(), host),
                    ("DIRECTORY".to_string(), directory),
                ]
            })),
            stage_handle(ReleaseToken::new(ftp_queue.clone())),
        ]
    };

    let json_branch = {
        let bucket = bucket.clone();
        let rowtag = rowtag.clone();
        vec![
            stage_handle(AcquireToken::new(json_queue.clone(), Duration::from_secs(300))),
            stage_handle(EcsTask::new(runner, cluster, task, security_group, vpc_subnet, move |item: &Element| {
                let token = item.as_token().expect("AcquireToken always emits a Token");
                vec![
                    ("TYPE".to_string(), "worker-json".to_string()),
                    ("NAME".to_string(), token.value.clone()),
                    ("ROWTAG".to_string(), rowtag.clone()),
                    ("BUCKET".to_string(), bucket.clone()),
                    ("INPUT".to_string(), key_naming::raw_key(&token.value)),
                    ("OUTPUT".to_string(), key_naming::json_key_from_name(&token.value)),
                ]
            })),
            stage_handle(ReleaseToken::new(json_queue.clone())),
        ]
    };

    let raw_missing = missing_key(store.clone(), bucket.clone(), |item: &Element| {
        key_naming::raw_key(item.as_text().unwrap_or_default())
    });
    let json_missing = missing_key(store, bucket, |item: &Element| {
        key_naming::json_key_from_name(item.as_text().unwrap_or_default())
    });

    let steps = vec![
        stage_handle(Conditional::new(ftp_branch, raw_missing, false)),
        stage_handle(Conditional::new(json_branch, json_missing, false)),
    ];

    let mut pipeline = Pipeline::new(filename.clone(), steps);
    pipeline.start(Element::Text(filename))
}

#[allow(clippy::too_many_arguments)]
pub fn master_sort(
    store: Arc<dyn ObjectStore>,
    runner: Arc<dyn TaskRunner>,
    filename: impl Into<String>,
    tag: impl Into<String>,
    bucket: impl Into<String>,
    cluster: impl Into<String>,
    task: impl Into<String>,
    security_group: impl Into<String>,
    vpc_subnet: impl Into<String>,
) -> PipelineResult<Vec<Element>> {
    let filename = filename.into();
    let tag = tag.into();
    let bucket = bucket.into();

    let steps = {
        let bucket = bucket.clone();
        vec![stage_handle(EcsTask::new(runner, cluster, task, security_group, vpc_subnet, move |item: &Element| {
            let name = item.as_text().unwrap_or_default().to_string();
            vec![
                ("TYPE".to_string(), "worker-sort".to_string()),
                ("NAME".to_string(), name.clone()),
                ("TAG".to_string(), tag.clone()),
                ("BUCKET".to_string(), bucket.clone()),
                ("INPUT".to_string(), key_naming::json_key_from_json_name(&name)),
                ("OUTPUT".to_string(), key_naming::sort_key_from_json_name(&name)),
            ]
        }))]
    };

    let sort_missing = missing_key(store, bucket, |item: &Element| {
        key_naming::sort_key_from_json_name(item.as_text().unwrap_or_default())
    });

    let mut pipeline = Pipeline::new(filename.clone(), vec![stage_handle(Conditional::new(steps, sort_missing, false))]);
    pipeline.start(Element::Text(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_domain::ports::LaunchedTask;
    use std::sync::Mutex;

    struct RecordingRunner {
        seen: Mutex<Vec<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl TaskRunner for RecordingRunner {
        async fn run(
            &self,
            _task_def: &str,
            _cluster: &str,
            _security_group: &str,
            _vpc_subnet: &str,
            env: Vec<(String, String)>,
        ) -> PipelineResult<LaunchedTask> {
            self.seen.lock().unwrap().push(env);
            Ok(LaunchedTask {
                task_arn: "arn:aws:ecs:task/1".into(),
                log_stream: "stream/1".into(),
            })
        }
        async fn wait(&self, _task: &LaunchedTask, _on_log: &mut dyn FnMut(&str)) -> PipelineResult<()> {
            Ok(())
        }
    }

    #[test]
    fn master_get_launches_both_workers_when_nothing_exists_yet() {
        let store = Arc::new(crate::infrastructure::object_store::InMemoryObjectStore::default());
        let runner = Arc::new(RecordingRunner { seen: Mutex::new(Vec::new()) });
        let ftp_queue = TokenQueue::new(vec![pipeline_domain::token::TokenResource(serde_json::json!({
            "Host": "ftp.example.com",
            "Directory": "/dumps",
        }))]);
        let json_queue = TokenQueue::new(vec![pipeline_domain::token::TokenResource(serde_json::json!({}))]);

        let out = master_get(
            store,
            runner.clone(),
            ftp_queue,
            json_queue,
            "enwiki-20201120-stub-meta-current24.xml.gz",
            "page",
            "bucket",
            "cluster",
            "task",
            "sg",
            "subnet",
        )
        .unwrap();
        // Both branches are taken (nothing exists yet), and each branch's
        // `ReleaseToken` forwards the filename unchanged, so the pipeline's
        // tail carries exactly one element through both Conditionals.
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_text(), Some("enwiki-20201120-stub-meta-current24.xml.gz"));

        let calls = runner.seen.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].iter().any(|(k, v)| k == "TYPE" && v == "worker-ftp"));
        assert!(calls[1].iter().any(|(k, v)| k == "TYPE" && v == "worker-json"));
    }
}
