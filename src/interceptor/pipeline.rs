use super::{span_spec, Interceptor, InterceptorRegistry, Phase};
use crate::context::InvocationContext;
use crate::telemetry::{Parent, TracingGateway};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The ordered pre and post interceptor chains of one function.
///
/// Entries run strictly in declaration order. A failing entry is logged
/// and skipped over: neither the rest of its phase nor the function body
/// is affected.
#[derive(Clone, Default)]
pub struct Pipeline {
    registry: InterceptorRegistry,
    pre: Vec<String>,
    post: Vec<String>,
}

impl Pipeline {
    /// Resolve declared identifiers against the registry. Unknown
    /// identifiers are logged and dropped.
    pub fn new(registry: InterceptorRegistry, pre: &[String], post: &[String]) -> Self {
        let known = |phase: Phase, ids: &[String]| -> Vec<String> {
            ids.iter()
                .filter(|id| {
                    let found = registry.contains(id);
                    if !found {
                        warn!("Unknown {} interceptor '{}', skipping it", phase, id);
                    }
                    found
                })
                .cloned()
                .collect()
        };
        let pre = known(Phase::Pre, pre);
        let post = known(Phase::Post, post);
        Self {
            registry,
            pre,
            post,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Pre => &self.pre,
            Phase::Post => &self.post,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Run every entry of `phase` against `ctx`.
    pub async fn run(&self, phase: Phase, gateway: &TracingGateway, ctx: &mut InvocationContext) {
        for id in self.ids(phase) {
            let interceptor = match self.registry.init(id) {
                Ok(interceptor) => interceptor,
                Err(err) => {
                    error!("Cannot initialize interceptor '{}': {}", id, err);
                    continue;
                }
            };
            run_one(phase, gateway, interceptor, ctx).await;
        }
    }
}

async fn run_one(
    phase: Phase,
    gateway: &TracingGateway,
    interceptor: Arc<dyn Interceptor>,
    ctx: &mut InvocationContext,
) {
    let span = if interceptor.needs_tracing() {
        gateway.start_span(
            span_spec(interceptor.as_ref()),
            Parent::from_active(ctx.active_span()),
        )
    } else {
        None
    };

    let outer = ctx.active_span().cloned();
    if let Some(span) = &span {
        ctx.set_active_span(Some(span.context().clone()));
    }

    let result = AssertUnwindSafe(interceptor.execute(phase, ctx))
        .catch_unwind()
        .await;
    ctx.set_active_span(outer);

    let failure = match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.message),
        Err(_) => Some("interceptor panicked".to_string()),
    };

    match &failure {
        Some(message) => error!(
            phase = %phase,
            "Execute {} {}:{} error: {}",
            interceptor.kind().as_str().to_lowercase(),
            interceptor.name(),
            interceptor.version(),
            message
        ),
        None => debug!(phase = %phase, "Executed {}:{}", interceptor.name(), interceptor.version()),
    }

    if let Some(span) = span {
        span.finish(failure.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionError;
    use crate::interceptor::InterceptorKind;
    use crate::telemetry::recording::RecordingProvider;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    struct Push {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Interceptor for Push {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> InterceptorKind {
            InterceptorKind::Plugin
        }

        async fn execute(&self, phase: Phase, ctx: &mut InvocationContext) -> Result<(), FunctionError> {
            let mut seen = ctx
                .field("seen")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            seen.push(format!("{}:{}", phase, self.name).into());
            ctx.set_field("seen", seen.into());
            if self.fail {
                return Err(FunctionError::new(format!("{} failed", self.name)));
            }
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl Interceptor for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        async fn execute(&self, _phase: Phase, _ctx: &mut InvocationContext) -> Result<(), FunctionError> {
            panic!("bad interceptor");
        }
    }

    fn registry() -> InterceptorRegistry {
        let mut registry = InterceptorRegistry::new();
        registry.register("a", Push { name: "a", fail: false }).unwrap();
        registry.register("b", Push { name: "b", fail: true }).unwrap();
        registry.register("c", Push { name: "c", fail: false }).unwrap();
        registry.register("panics", Panics).unwrap();
        registry
    }

    fn seen(ctx: &InvocationContext) -> Vec<String> {
        ctx.field("seen")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    #[traced_test]
    #[tokio::test]
    async fn test_failure_does_not_stop_phase() {
        let ids = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let pipeline = Pipeline::new(registry(), &ids(&["a", "b", "panics", "c"]), &ids(&["c", "a"]));
        let gateway = TracingGateway::disabled("f");
        let mut ctx = InvocationContext::for_test("f");

        pipeline.run(Phase::Pre, &gateway, &mut ctx).await;
        pipeline.run(Phase::Post, &gateway, &mut ctx).await;

        assert_eq!(seen(&ctx), ["pre:a", "pre:b", "pre:c", "post:c", "post:a"]);
        assert!(logs_contain("Execute plugin b:v1 error: b failed"));
        assert!(logs_contain("Execute hook panics:v1 error: interceptor panicked"));
    }

    #[traced_test]
    #[test]
    fn test_unknown_ids_are_skipped() {
        let pipeline = Pipeline::new(registry(), &["a".to_string(), "ghost".to_string()], &[]);
        assert_eq!(pipeline.ids(Phase::Pre), ["a".to_string()]);
        assert!(logs_contain("Unknown pre interceptor 'ghost'"));
    }

    #[tokio::test]
    async fn test_each_entry_gets_its_own_span() {
        let provider = RecordingProvider::default();
        let gateway = TracingGateway::new("f", Arc::new(provider.clone()));
        let pipeline = Pipeline::new(registry(), &["a".to_string(), "b".to_string()], &[]);
        let mut ctx = InvocationContext::for_test("f");

        pipeline.run(Phase::Pre, &gateway, &mut ctx).await;

        let spans = provider.finished();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "a");
        assert!(spans[0].attributes.contains(&("kind".to_string(), "Plugin".to_string())));
        assert_eq!(spans[0].error, None);
        assert_eq!(spans[1].error.as_deref(), Some("b failed"));
        assert!(spans.iter().all(|s| s.end_count == 1));
        assert_eq!(ctx.active_span(), None);
    }
}
