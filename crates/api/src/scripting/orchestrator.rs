//! Central script invocation service.
//!
//! Coordinates access checks, definition lookup, parsing and validation,
//! locking, staging, rendering, execution and cleanup. Held in
//! [`AppState`](crate::state::AppState) as an `Arc<ScriptOrchestrator>`.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use shellgate_core::access::check_access;
use shellgate_core::config::ExecutionConfig;
use shellgate_core::definitions::ScriptLoader;
use shellgate_core::error::{CoreError, InvocationError, InvocationResult};
use shellgate_core::execution::{
    BufferedOutput, DiscardOutput, ExecutionJob, ExecutionResult, ExecutionStrategy,
    RedactingSink,
};
use shellgate_core::invocation::{
    parse_invocation, validate_invocation, Grants, RawInvocation, ScriptInvocationContext,
    UploadedFile,
};
use shellgate_core::lock::LockService;
use shellgate_core::model::Token;
use shellgate_core::process::ProcessRunner;
use shellgate_core::redact::Redactor;
use shellgate_core::staging::Stager;
use shellgate_core::transform::{render_command, render_script, script_file_name, write_script_file};
use shellgate_core::types::JobId;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::ws::hub::{ConnectionHub, HubError, HubEvent, SessionSink};

/// Everything the caller supplied for one invocation.
#[derive(Debug)]
pub struct InvocationRequest {
    pub raw: RawInvocation,
    pub uploads: Vec<UploadedFile>,
    /// Bearer value the token was loaded with; identifies the caller for
    /// per-token locking.
    pub token_id: String,
    pub token: Token,
    pub caller_ip: Option<IpAddr>,
    /// Request id to carry through logs; the job id is used when absent.
    pub correlation_id: Option<String>,
}

/// Runs the invoke pipeline:
/// 1. Check the token's access to the script.
/// 2. Load the script definition.
/// 3. Parse and validate the caller input.
/// 4. Acquire the script's concurrency lock.
/// 5. Create the working directory, stage files, render the script.
/// 6. Execute via the selected strategy, streaming or buffering output.
/// 7. Remove the working directory and release the lock.
pub struct ScriptOrchestrator {
    scripts: ScriptLoader,
    locks: LockService,
    runner: Arc<dyn ProcessRunner>,
    hub: Arc<ConnectionHub>,
    config: ExecutionConfig,
}

impl ScriptOrchestrator {
    pub fn new(
        scripts: ScriptLoader,
        locks: LockService,
        runner: Arc<dyn ProcessRunner>,
        hub: Arc<ConnectionHub>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            scripts,
            locks,
            runner,
            hub,
            config,
        }
    }

    pub async fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> InvocationResult<ExecutionResult> {
        let job_id = uuid::Uuid::now_v7();
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| job_id.to_string());
        let span = tracing::info_span!(
            "invocation",
            script = %request.raw.script_name,
            %job_id,
            correlation_id = %correlation_id,
        );

        self.invoke_inner(request, job_id, correlation_id, cancel)
            .instrument(span)
            .await
    }

    async fn invoke_inner(
        &self,
        request: InvocationRequest,
        job_id: JobId,
        correlation_id: String,
        cancel: CancellationToken,
    ) -> InvocationResult<ExecutionResult> {
        let InvocationRequest {
            raw,
            uploads,
            token_id,
            token,
            caller_ip,
            ..
        } = request;
        let script_name = raw.script_name.clone();

        // 1. Access.
        let declaration = check_access(&token, &script_name, caller_ip).inspect_err(|e| {
            tracing::info!(token = %token.name, error = %e, "Invocation denied");
        })?;

        // 2. Definition.
        let script = self
            .scripts
            .load(&script_name)
            .await?
            .ok_or_else(|| InvocationError::ScriptNotFound(script_name.clone()))?;

        // 3. Parse and validate.
        let parsed = parse_invocation(raw, uploads)?;
        let grants = Grants {
            declaration,
            token_ssh: token.ssh.as_ref(),
        };
        let context = validate_invocation(
            script,
            grants,
            parsed,
            self.config.default_file_preprocessing.as_deref(),
            correlation_id,
        )?;

        // 4. Lock.
        let lock = self
            .locks
            .acquire(
                &context.script.name,
                context.script.concurrency,
                Some(&token_id),
            )
            .await?;

        tracing::info!(token = %token.name, "Invocation started");
        let result = self.run_in_working_dir(&context, job_id, &cancel).await;
        lock.release().await;

        match &result {
            Ok(r) => tracing::info!(exit_code = r.exit_code, "Invocation finished"),
            Err(e) => tracing::warn!(error = %e, "Invocation failed"),
        }
        result
    }

    async fn run_in_working_dir(
        &self,
        context: &ScriptInvocationContext,
        job_id: JobId,
        cancel: &CancellationToken,
    ) -> InvocationResult<ExecutionResult> {
        let working_dir = self.config.temp_root.join(job_id.to_string());
        tokio::fs::create_dir_all(&working_dir).await?;

        let result = match tokio::fs::canonicalize(&working_dir).await {
            Ok(absolute) => self.run(context, &absolute, cancel).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&working_dir).await {
            tracing::warn!(
                working_dir = %working_dir.display(),
                error = %e,
                "Failed to remove working directory",
            );
        }
        result
    }

    async fn run(
        &self,
        context: &ScriptInvocationContext,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> InvocationResult<ExecutionResult> {
        let script = &context.script;
        let redactor = Redactor::new(context.secret_values());

        let session = match context.websocket_session_id {
            Some(session_id) if script.show_output => {
                Some(self.hub.open(session_id).map_err(|e| match e {
                    HubError::SessionInUse | HubError::SessionSpent => InvocationError::Core(
                        CoreError::Conflict(format!("Websocket session {session_id}: {e}")),
                    ),
                    other => InvocationError::Core(CoreError::Internal(other.to_string())),
                })?)
            }
            _ => None,
        };

        let stager = Stager {
            runner: self.runner.as_ref(),
            shell: &self.config.shell,
            redactor: &redactor,
        };
        let mut arguments = context.arguments.clone();
        arguments.extend(stager.stage_all(working_dir, &context.files, cancel).await?);

        let script_text = render_script(
            &script.command,
            &arguments,
            &context.environment_variables,
            &self.config.env_var_format,
        );
        write_script_file(working_dir, &self.config.script_extension, &script_text).await?;

        let command = if script.show_command {
            redactor.redact_owned(render_command(&script.command, &arguments))
        } else {
            String::new()
        };

        if cancel.is_cancelled() {
            return Err(InvocationError::Cancelled);
        }

        let strategy = ExecutionStrategy::select(context.ssh.as_ref());
        let script_file = script_file_name(&self.config.script_extension);
        let job = ExecutionJob {
            runner: self.runner.as_ref(),
            config: &self.config,
            working_dir,
            script_file: &script_file,
        };
        tracing::debug!(strategy = strategy.name(), "Executing script");

        let (exit_code, output) = match &session {
            Some(handle) => {
                let attached = handle.wait_for_attach(cancel).await;
                if cancel.is_cancelled() {
                    return Err(InvocationError::Cancelled);
                }
                if attached && script.show_command {
                    let _ = handle.push(HubEvent::Script(command.clone()));
                }

                let mut live = SessionSink::new(handle);
                let exit_code = {
                    let mut sink = RedactingSink::new(&mut live, &redactor);
                    strategy.run(&job, &mut sink, cancel).await?
                };
                (exit_code, live.into_buffered())
            }
            None if script.show_output => {
                let mut buffer = BufferedOutput::new();
                let exit_code = {
                    let mut sink = RedactingSink::new(&mut buffer, &redactor);
                    strategy.run(&job, &mut sink, cancel).await?
                };
                (exit_code, buffer.into_lines())
            }
            None => {
                let exit_code = strategy.run(&job, &mut DiscardOutput, cancel).await?;
                (exit_code, Vec::new())
            }
        };

        Ok(ExecutionResult {
            output,
            command,
            exit_code,
        })
    }
}
