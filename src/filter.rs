//! Query pipeline adapter.
//!
//! [`RedirectQueryFilter`] is a [`SearchComponent`] meant to run first in a
//! search pipeline. It normalizes the raw query, asks the
//! [`RedirectManager`] for a matching rule and, on a hit, writes the target
//! into the response and marks the pipeline done so the expensive stages are
//! skipped. Ordering of components is the embedder's concern.

use log::debug;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::manager::RedirectManager;
use crate::matching::normalize_query;

/// Response field carrying the redirect target.
pub const DEFAULT_RESPONSE_FIELD: &str = "redirectUrl";
/// Request parameter holding the raw query text.
pub const DEFAULT_QUERY_PARAM: &str = "q";

/// Where a request is in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Start,
    ExecuteQuery,
    GetFields,
    Done,
}

/// Per-request state shared by the components of a pipeline.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Original request parameters
    pub params: HashMap<String, String>,
    /// Response values written by components
    pub response: Map<String, Value>,
    pub stage: PipelineStage,
}

impl QueryContext {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self {
            params,
            response: Map::new(),
            stage: PipelineStage::Start,
        }
    }

    /// Context for a single query parameter.
    pub fn for_query(param: &str, query: impl Into<String>) -> Self {
        let mut params = HashMap::new();
        params.insert(param.to_string(), query.into());
        Self::new(params)
    }

    pub fn is_done(&self) -> bool {
        self.stage == PipelineStage::Done
    }
}

/// One stage of a search pipeline.
pub trait SearchComponent: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before any component's `process`.
    fn prepare(&self, ctx: &mut QueryContext);

    fn process(&self, _ctx: &mut QueryContext) {}

    /// Called per stage in distributed execution; may move the stage forward.
    fn distributed_process(&self, _ctx: &mut QueryContext) {}
}

/// Ordered list of components.
///
/// Runs `prepare` on every component, then `distributed_process` and
/// `process` on each in order, stopping as soon as the stage reaches
/// [`PipelineStage::Done`].
#[derive(Default)]
pub struct QueryPipeline {
    components: Vec<Arc<dyn SearchComponent>>,
}

impl QueryPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component(mut self, component: Arc<dyn SearchComponent>) -> Self {
        self.components.push(component);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn execute(&self, ctx: &mut QueryContext) {
        for component in &self.components {
            component.prepare(ctx);
        }

        for component in &self.components {
            if ctx.is_done() {
                debug!("Pipeline short-circuited before {}", component.name());
                return;
            }
            component.distributed_process(ctx);
            if ctx.is_done() {
                return;
            }
            component.process(ctx);
        }
        ctx.stage = PipelineStage::Done;
    }
}

/// Outcome of evaluating one raw query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterOutcome {
    pub redirect_target: Option<String>,
    /// True when later pipeline stages should not run
    pub short_circuit: bool,
}

/// Attaches redirect targets to responses for matching queries.
pub struct RedirectQueryFilter {
    manager: Arc<RedirectManager>,
    query_param: String,
    response_field: String,
}

impl RedirectQueryFilter {
    pub fn new(manager: Arc<RedirectManager>) -> Self {
        Self::with_fields(manager, DEFAULT_QUERY_PARAM, DEFAULT_RESPONSE_FIELD)
    }

    pub fn with_fields(
        manager: Arc<RedirectManager>,
        query_param: impl Into<String>,
        response_field: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            query_param: query_param.into(),
            response_field: response_field.into(),
        }
    }

    pub fn response_field(&self) -> &str {
        &self.response_field
    }

    /// Evaluates a raw query. An absent query passes through untouched.
    pub fn evaluate(&self, raw_query: Option<&str>) -> FilterOutcome {
        let raw_query = match raw_query {
            Some(q) => q,
            None => return FilterOutcome::default(),
        };

        let query = normalize_query(raw_query);
        match self.manager.lookup(&query) {
            Some(rule) => {
                debug!("Query '{}' matched {}", query, rule);
                FilterOutcome {
                    redirect_target: rule.redirect_target().map(str::to_string),
                    short_circuit: true,
                }
            }
            None => FilterOutcome::default(),
        }
    }
}

impl SearchComponent for RedirectQueryFilter {
    fn name(&self) -> &str {
        "redirect"
    }

    fn prepare(&self, ctx: &mut QueryContext) {
        let outcome = self.evaluate(ctx.params.get(&self.query_param).map(String::as_str));
        if let Some(target) = outcome.redirect_target {
            ctx.response
                .insert(self.response_field.clone(), Value::String(target));
        }
    }

    fn distributed_process(&self, ctx: &mut QueryContext) {
        if ctx.response.contains_key(&self.response_field) {
            ctx.stage = PipelineStage::Done;
        }
    }
}
