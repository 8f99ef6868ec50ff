// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Remote compute stages (§4.I): `Lambda` invocation and `EcsTask`
//! orchestration, grounded in
//! `examples/original_source/binarian/amazon/lmbd.py` and
//! `examples/original_source/binarian/amazon/ecs.py`.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::ports::{RemoteFunction, TaskRunner};
use pipeline_domain::stage::{AnyPipe, Stage};

fn bridge_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build remote-stage bridge runtime")
}

/// Invokes a Lambda function per item with a synchronous request/response
/// contract. An `errorMessage` key in the response payload is treated as
/// fatal (the function itself failed); a non-200 status is logged and the
/// item is dropped rather than forwarded.
pub struct Lambda {
    client: Arc<dyn RemoteFunction>,
    runtime: Runtime,
    function: String,
    parameters: Box<dyn Fn(&Element) -> serde_json::Value>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
}

impl Lambda {
    pub fn new(
        client: Arc<dyn RemoteFunction>,
        function: impl Into<String>,
        parameters: impl Fn(&Element) -> serde_json::Value + 'static,
    ) -> Self {
        Self {
            client,
            runtime: bridge_runtime(),
            function: function.into(),
            parameters: Box::new(parameters),
            prev: None,
            next: None,
            metrics: None,
        }
    }
}

impl Stage for Lambda {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
        self.metrics = Some(metrics);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(&prev, -1) {
            for item in &items {
                if let Some(metrics) = &self.metrics {
                    metrics.log("calling lambda function ...".to_string());
                }
                let payload = (self.parameters)(item);
                let invocation = self
                    .runtime
                    .block_on(self.client.invoke(&self.function, payload))
                    .expect("lambda invoke failed");
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("calling lambda function completed {}", invocation.status));
                }
                if invocation.payload.get("errorMessage").is_some() {
                    panic!("lambda function returned an error: {}", invocation.payload);
                }
                if invocation.status == 200 {
                    Pipe::append(next, vec![Element::Json(invocation.payload)]);
                } else if let Some(metrics) = &self.metrics {
                    metrics.log(format!("lambda call did not succeed: {}", invocation.payload));
                }
            }
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Launches one ECS task per item and blocks until it stops, streaming its
/// logs through `Metrics::raw`, then forwards the item unchanged (this
/// stage is a side-effecting gate, not a transform — its output is "the
/// remote work for this item is done").
pub struct EcsTask {
    runner: Arc<dyn TaskRunner>,
    runtime: Runtime,
    cluster: String,
    task_def: String,
    security_group: String,
    vpc_subnet: String,
    environment: Box<dyn Fn(&Element) -> Vec<(String, String)>>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
}

impl EcsTask {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        cluster: impl Into<String>,
        task_def: impl Into<String>,
        security_group: impl Into<String>,
        vpc_subnet: impl Into<String>,
        environment: impl Fn(&Element) -> Vec<(String, String)> + 'static,
    ) -> Self {
        Self {
            runner,
            runtime: bridge_runtime(),
            cluster: cluster.into(),
            task_def: task_def.into(),
            security_group: security_group.into(),
            vpc_subnet: vpc_subnet.into(),
            environment: Box::new(environment),
            prev: None,
            next: None,
            metrics: None,
        }
    }
}

impl Stage for EcsTask {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
        self.metrics = Some(metrics);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(prev, 1) {
            for item in items {
                let env = (self.environment)(&item);
                let launched = self
                    .runtime
                    .block_on(self.runner.run(
                        &self.task_def,
                        &self.cluster,
                        &self.security_group,
                        &self.vpc_subnet,
                        env,
                    ))
                    .expect("ecs run_task failed");
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("waiting {}", launched.task_arn));
                }
                let metrics_for_logs = self.metrics.clone();
                self.runtime
                    .block_on(self.runner.wait(&launched, &mut |line: &str| {
                        if let Some(metrics) = &metrics_for_logs {
                            metrics.raw(line);
                        }
                    }))
                    .expect("ecs wait failed");
                Pipe::append(next, vec![item]);
            }
        }
    }
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_domain::error::PipelineResult;
    use pipeline_domain::pipe::new_item_pipe;
    use pipeline_domain::ports::{LaunchedTask, RemoteInvocation};

    struct StubLambda;

    #[async_trait]
    impl RemoteFunction for StubLambda {
        async fn invoke(&self, _function: &str, payload: serde_json::Value) -> PipelineResult<RemoteInvocation> {
            Ok(RemoteInvocation {
                status: 200,
                payload: serde_json::json!({"echo": payload}),
            })
        }
    }

    struct StubTaskRunner;

    #[async_trait]
    impl TaskRunner for StubTaskRunner {
        async fn run(
            &self,
            _task_def: &str,
            _cluster: &str,
            _security_group: &str,
            _vpc_subnet: &str,
            _env: Vec<(String, String)>,
        ) -> PipelineResult<LaunchedTask> {
            Ok(LaunchedTask {
                task_arn: "arn:aws:ecs:task/1".into(),
                log_stream: "stream/1".into(),
            })
        }

        async fn wait(&self, _task: &LaunchedTask, on_log: &mut dyn FnMut(&str)) -> PipelineResult<()> {
            on_log("task finished");
            Ok(())
        }
    }

    #[test]
    fn lambda_forwards_successful_invocations() {
        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = Lambda::new(Arc::new(StubLambda), "fn-name", |e| {
            serde_json::json!({"value": e.as_text()})
        });
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::Text("x".into())]);
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn ecs_task_forwards_the_item_after_waiting() {
        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = EcsTask::new(Arc::new(StubTaskRunner), "cluster", "task-def", "sg-1", "subnet-1", |_e| {
            vec![("KEY".to_string(), "VALUE".to_string())]
        });
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::Text("job".into())]);
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out[0].as_text(), Some("job"));
    }
}
