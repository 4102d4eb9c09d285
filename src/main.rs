//! fninvoke runtime binary.
//!
//! Registers a few sample functions and interceptors, then serves the
//! function selected by `FUNCTION_TARGET` as described by `FUNC_CONTEXT`.

use chrono::Utc;
use fninvoke::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Greets the caller named by the `x-name` header.
#[function(id = "hello", kind = "http")]
async fn hello(ctx: &mut InvocationContext) -> Result<(), FunctionError> {
    let name = ctx
        .http_request()
        .and_then(|r| r.get_header("x-name").cloned())
        .unwrap_or_else(|| "World".to_string());

    let body = serde_json::json!({
        "message": format!("Hello, {}!", name),
        "function": ctx.function_name(),
    });
    if let Some(response) = ctx.http_response_mut() {
        response.set_header("content-type", "application/json");
        response.write(body.to_string());
    }
    Ok(())
}

/// Echoes the payload back.
#[function(id = "echo", kind = "open")]
async fn echo(_ctx: &mut InvocationContext, payload: &str) -> Result<Option<Out>, FunctionError> {
    Ok(Some(Out::ok(payload.to_string())))
}

/// Sends the payload to every declared output.
#[function(id = "forward", kind = "open")]
async fn forward(ctx: &mut InvocationContext, payload: &str) -> Result<Option<Out>, FunctionError> {
    let outputs: Vec<String> = ctx.outputs().keys().cloned().collect();
    for output in outputs {
        ctx.send(&output, payload.to_string())
            .await
            .map_err(|e| FunctionError::new(e.to_string()))?;
        info!("Forwarded payload to '{}'", output);
    }
    Ok(None)
}

/// Logs the event subject and type of each structured event.
#[function(id = "audit", kind = "cloudevent")]
async fn audit(_ctx: &mut InvocationContext, event: &CloudEvent) -> Result<(), FunctionError> {
    info!("Event {} of type {} from {}", event.id, event.event_type, event.source);
    Ok(())
}

/// Measures how long the function body takes.
struct Timer;

#[async_trait]
impl Interceptor for Timer {
    fn name(&self) -> &str {
        "timer"
    }

    async fn execute(&self, phase: Phase, ctx: &mut InvocationContext) -> Result<(), FunctionError> {
        match phase {
            Phase::Pre => ctx.set_field("startedAt", Utc::now().timestamp_millis().into()),
            Phase::Post => {
                let started = ctx
                    .field("startedAt")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| FunctionError::new("pre hook did not run"))?;
                info!(
                    "Function '{}' finished in {} ms",
                    ctx.function_name(),
                    Utc::now().timestamp_millis() - started
                );
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut interceptors = InterceptorRegistry::new();
    interceptors.register_per_invocation("timer", || Timer)?;

    let runtime = Runtime::new(RuntimeConfig::from_env()?).interceptors(interceptors);
    runtime.register_function(HelloFunction::ID, HelloFunction.into_function()).await?;
    runtime.register_function(EchoFunction::ID, EchoFunction.into_function()).await?;
    runtime.register_function(ForwardFunction::ID, ForwardFunction.into_function()).await?;
    runtime.register_function(AuditFunction::ID, AuditFunction.into_function()).await?;

    info!(
        "Registered functions: {:?}",
        runtime.functions().list().await
    );

    runtime.run().await?;
    Ok(())
}
