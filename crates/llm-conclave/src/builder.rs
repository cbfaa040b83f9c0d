//! Message builders for nested pipeline steps and the opening message.
//!
//! A [`MessageBuilder`] is a pure function of the previous output and a
//! static [`BuilderContext`]. Templates are rendered with `minijinja`; the
//! previous output is available as `content`.

use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const CRITIQUE_TEMPLATE: &str =
    "Reflect and provide critique on the following writing. \n\n {{ content }}";
pub const REFINE_TEMPLATE: &str =
    "Please refine the following content based on the feedback provided. \n\n {{ content }}";
pub const FACT_CHECK_TEMPLATE: &str =
    "Please fact-check the following content and ensure its accuracy. \n\n {{ content }}";
pub const SUMMARIZE_TEMPLATE: &str =
    "Please summarize the following content in a concise manner. \n\n {{ content }}";

/// Layout of the coordinator's first message.
pub const INITIAL_MESSAGE_TEMPLATE: &str =
    "{{ preamble }}\nUser Request: {{ user_request }}\nDocuments:\n{{ documents }}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("template error: {0}")]
    Template(String),
    #[error("{0}")]
    Custom(String),
}

impl From<minijinja::Error> for BuilderError {
    fn from(err: minijinja::Error) -> Self {
        BuilderError::Template(err.to_string())
    }
}

/// Static values available to every builder in a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuilderContext {
    /// The request the run was started with.
    pub user_request: String,
    /// Agent whose turn triggered the pipeline.
    pub trigger: String,
    /// Helper the built message is addressed to.
    pub helper: String,
    /// Zero-based step index within the pipeline.
    pub step: usize,
}

impl BuilderContext {
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            ..Default::default()
        }
    }

    pub(crate) fn for_step(&self, trigger: &str, helper: &str, step: usize) -> Self {
        Self {
            user_request: self.user_request.clone(),
            trigger: trigger.to_string(),
            helper: helper.to_string(),
            step,
        }
    }
}

type BuildFn = dyn Fn(&str, &BuilderContext) -> Result<String, BuilderError> + Send + Sync;

#[derive(Clone)]
enum BuilderKind {
    Template(String),
    Function(Arc<BuildFn>),
}

/// Built-in step templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Critique,
    Refine,
    FactCheck,
    Summarize,
}

impl Preset {
    pub fn template(self) -> &'static str {
        match self {
            Preset::Critique => CRITIQUE_TEMPLATE,
            Preset::Refine => REFINE_TEMPLATE,
            Preset::FactCheck => FACT_CHECK_TEMPLATE,
            Preset::Summarize => SUMMARIZE_TEMPLATE,
        }
    }
}

/// Produces the next message from the previous output.
#[derive(Clone)]
pub struct MessageBuilder {
    kind: BuilderKind,
}

impl MessageBuilder {
    /// Compiles `source` once to reject syntax errors up front.
    pub fn template(source: impl Into<String>) -> Result<Self, BuilderError> {
        let source = source.into();
        Environment::new().template_from_str(&source)?;
        Ok(Self {
            kind: BuilderKind::Template(source),
        })
    }

    pub fn from_fn<F>(build: F) -> Self
    where
        F: Fn(&str, &BuilderContext) -> Result<String, BuilderError> + Send + Sync + 'static,
    {
        Self {
            kind: BuilderKind::Function(Arc::new(build)),
        }
    }

    /// Passes the previous output through unchanged.
    pub fn identity() -> Self {
        Self::from_fn(|content, _| Ok(content.to_string()))
    }

    pub fn preset(preset: Preset) -> Self {
        Self {
            kind: BuilderKind::Template(preset.template().to_string()),
        }
    }

    pub fn critique() -> Self {
        Self::preset(Preset::Critique)
    }

    pub fn refine() -> Self {
        Self::preset(Preset::Refine)
    }

    pub fn fact_check() -> Self {
        Self::preset(Preset::FactCheck)
    }

    pub fn summarize() -> Self {
        Self::preset(Preset::Summarize)
    }

    pub fn build(&self, content: &str, ctx: &BuilderContext) -> Result<String, BuilderError> {
        match &self.kind {
            BuilderKind::Template(source) => Ok(Environment::new().render_str(
                source,
                context! {
                    content => content,
                    user_request => &ctx.user_request,
                    trigger => &ctx.trigger,
                    helper => &ctx.helper,
                    step => ctx.step,
                },
            )?),
            BuilderKind::Function(build) => build(content, ctx),
        }
    }
}

impl fmt::Debug for MessageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BuilderKind::Template(source) => f.debug_tuple("Template").field(source).finish(),
            BuilderKind::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Renders the coordinator's opening message.
pub fn initial_message(
    preamble: &str,
    user_request: &str,
    documents: &str,
) -> Result<String, BuilderError> {
    Ok(Environment::new().render_str(
        INITIAL_MESSAGE_TEMPLATE,
        context! {
            preamble => preamble,
            user_request => user_request,
            documents => documents,
        },
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_render_content() {
        let ctx = BuilderContext::new("write a poem");
        let built = MessageBuilder::critique().build("Roses are red", &ctx).unwrap();
        assert_eq!(
            built,
            "Reflect and provide critique on the following writing. \n\n Roses are red"
        );

        let built = MessageBuilder::summarize().build("long text", &ctx).unwrap();
        assert!(built.starts_with("Please summarize the following content"));
        assert!(built.ends_with("long text"));
    }

    #[test]
    fn test_all_presets_compile() {
        for preset in [Preset::Critique, Preset::Refine, Preset::FactCheck, Preset::Summarize] {
            assert!(MessageBuilder::template(preset.template()).is_ok());
        }
    }

    #[test]
    fn test_template_sees_context() {
        let builder =
            MessageBuilder::template("{{ helper }} (step {{ step }}) on {{ user_request }}: {{ content }}")
                .unwrap();
        let ctx = BuilderContext::new("topic").for_step("Writer", "Critic", 1);

        assert_eq!(builder.build("draft", &ctx).unwrap(), "Critic (step 1) on topic: draft");
    }

    #[test]
    fn test_content_is_not_reinterpreted() {
        let ctx = BuilderContext::default();
        let built = MessageBuilder::template("{{ content }}")
            .unwrap()
            .build("{{ not_a_var }}", &ctx)
            .unwrap();
        assert_eq!(built, "{{ not_a_var }}");
    }

    #[test]
    fn test_invalid_template_rejected() {
        let err = MessageBuilder::template("{{ content ").unwrap_err();
        assert!(matches!(err, BuilderError::Template(_)));
    }

    #[test]
    fn test_function_builder() {
        let builder = MessageBuilder::from_fn(|content, ctx| {
            if content.is_empty() {
                Err(BuilderError::Custom(format!("nothing for {}", ctx.helper)))
            } else {
                Ok(content.to_uppercase())
            }
        });
        let ctx = BuilderContext::default().for_step("Writer", "Critic", 0);

        assert_eq!(builder.build("abc", &ctx).unwrap(), "ABC");
        assert_eq!(
            builder.build("", &ctx).unwrap_err(),
            BuilderError::Custom("nothing for Critic".into())
        );
        assert_eq!(MessageBuilder::identity().build("same", &ctx).unwrap(), "same");
    }

    #[test]
    fn test_initial_message_layout() {
        let message = initial_message("Be brief.", "Explain borrowing", "doc one\ndoc two").unwrap();
        assert_eq!(
            message,
            "Be brief.\nUser Request: Explain borrowing\nDocuments:\ndoc one\ndoc two"
        );
    }

    #[test]
    fn test_preset_deserializes() {
        let preset: Preset = serde_json::from_str(r#""fact_check""#).unwrap();
        assert_eq!(preset, Preset::FactCheck);
    }
}
