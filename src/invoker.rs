//! Runs one invocation: pre phase, function body, post phase.

use crate::context::{InvocationContext, Out};
use crate::function::{Function, FunctionError};
use crate::interceptor::Phase;
use crate::telemetry::{Parent, SpanKind, SpanSpec};
use tracing::debug;

/// Name of the span wrapping the function body alone.
pub const BODY_SPAN: &str = "function";

/// Run `function` against `ctx` and hand the finished context back.
///
/// The whole invocation runs in one span, child of whatever span `ctx`
/// carries on entry. Interceptor failures never stop the body. For the
/// event variants the result is normalized after the body and again
/// after the post phase, so post interceptors see the final `Out`.
pub async fn invoke(function: &Function, mut ctx: InvocationContext) -> InvocationContext {
    let runtime = ctx.runtime().clone();
    let gateway = runtime.gateway();
    let outer = ctx.active_span().cloned();

    let kind = if ctx.inbound().is_http() {
        SpanKind::Server
    } else if runtime.has_inputs() {
        SpanKind::Consumer
    } else {
        SpanKind::Producer
    };
    let spec = SpanSpec::new(ctx.function_name(), kind)
        .tag("function", ctx.function_name())
        .tag("function.variant", function.variant());
    let invocation_span = gateway.start_span(spec, Parent::from_active(outer.as_ref()));
    let invocation_context = invocation_span.as_ref().map(|s| s.context().clone());
    if invocation_context.is_some() {
        ctx.set_active_span(invocation_context.clone());
    }

    runtime.pipeline().run(Phase::Pre, gateway, &mut ctx).await;

    let body_span = gateway.start_span(
        SpanSpec::new(BODY_SPAN, SpanKind::Internal),
        Parent::from_active(ctx.active_span()),
    );
    if let Some(span) = &body_span {
        ctx.set_active_span(Some(span.context().clone()));
    }
    let failure = run_body(function, &mut ctx).await;
    if let Some(span) = body_span {
        span.finish(failure.as_deref());
    }
    ctx.set_active_span(invocation_context);

    let raw_http = matches!(function, Function::Http(_));
    if !raw_http {
        let out = Out::normalize(ctx.take_out());
        ctx.set_out(out);
    }

    runtime.pipeline().run(Phase::Post, gateway, &mut ctx).await;

    if !raw_http {
        let out = Out::normalize(ctx.take_out());
        ctx.set_out(out);
    }

    if let Some(span) = invocation_span {
        let error = ctx
            .out()
            .and_then(|out| out.error.as_ref())
            .map(|err| err.message.clone())
            .or(failure);
        span.finish(error.as_deref());
    }
    ctx.set_active_span(outer);

    debug!(
        "Invocation of '{}' finished with status {}",
        ctx.function_name(),
        ctx.out().map(Out::status).unwrap_or(200)
    );
    ctx
}

/// Run the body; returns the failure message, if any.
async fn run_body(function: &Function, ctx: &mut InvocationContext) -> Option<String> {
    match function {
        Function::Http(f) => {
            let result = f.service(ctx).await;
            if let Err(err) = &result {
                if let Some(response) = ctx.http_response_mut() {
                    *response = err.clone().into();
                }
            }
            let status = ctx.http_response().map(|r| r.status.0).unwrap_or(200);
            if ctx.out().is_none() {
                ctx.set_out(Out::new().with_code(status));
            }
            result.err().map(|err| err.message)
        }
        Function::CloudEvent(f) => {
            let Some(event) = ctx.cloud_event().cloned() else {
                let err = FunctionError::bad_request("invocation carries no structured event");
                ctx.set_out(Out::error(err.clone()));
                return Some(err.message);
            };
            match f.accept(ctx, &event).await {
                Ok(()) => None,
                Err(err) => {
                    let message = err.message.clone();
                    ctx.set_out(Out::error(err));
                    Some(message)
                }
            }
        }
        Function::Open(f) => {
            let payload = ctx.payload();
            match f.accept(ctx, &payload).await {
                Ok(Some(out)) => {
                    let message = out.error.as_ref().map(|e| e.message.clone());
                    ctx.set_out(out);
                    message
                }
                Ok(None) => ctx.out().and_then(|o| o.error.as_ref()).map(|e| e.message.clone()),
                Err(err) => {
                    let message = err.message.clone();
                    ctx.set_out(Out::error(err));
                    Some(message)
                }
            }
        }
    }
}
