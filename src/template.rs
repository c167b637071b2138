//! Renders `{{ var }}` placeholders against a host's [Context].
//!
//! Rendering is strict: a placeholder that names a variable missing from the context is an error,
//! never an empty string. Rendering is also recursive. A variable's value may itself be a template
//! that references other variables, so the text is rendered repeatedly until it stops changing.
//!
//! ```
//! # use mindeploy::core::Context;
//! # use mindeploy::template;
//! # use serde_json::json;
//! let context = Context::from([
//!     ("user".into(), json!("web")),
//!     ("home".into(), json!("/home/{{ user }}")),
//! ]);
//! assert_eq!("/home/web/logs", template::render("{{ home }}/logs", &context).unwrap());
//! ```

use crate::core::Context;
use crate::error::{ActionError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tera::Tera;

/// The most rendering passes a template gets before it counts as unstable, e.g. because a
/// variable keeps expanding into a longer reference to itself.
pub const MAX_PASSES: usize = 100;

/// A template renderer bound to one variable context.
///
/// Build one per host and reuse it for every string that host needs rendered.
pub struct Renderer {
    tera: Tera,
    context: tera::Context,
}

impl Renderer {
    pub fn new(context: &Context) -> Self {
        let mut tera_context = tera::Context::new();
        for (key, value) in context {
            tera_context.insert(key.as_str(), value);
        }
        // Command lines are not HTML.
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        Renderer {
            tera,
            context: tera_context,
        }
    }

    /// Renders `template` until it reaches a fixed point.
    ///
    /// # Errors
    ///
    /// [ActionError::UndefinedVariable] if any pass references a missing variable,
    /// [ActionError::UnstableTemplate] if the text is still changing after [MAX_PASSES] passes,
    /// and [ActionError::Template] for any other template error.
    pub fn render(&mut self, template: &str) -> Result<String> {
        let mut previous = template.to_owned();
        for _ in 0..MAX_PASSES {
            if !has_markup(&previous) {
                return Ok(previous);
            }
            let current = self
                .tera
                .render_str(&previous, &self.context)
                .map_err(|e| template_error(&e, &previous))?;
            if current == previous {
                return Ok(current);
            }
            previous = current;
        }
        Err(ActionError::UnstableTemplate {
            passes: MAX_PASSES,
            template: template.to_owned(),
        })
    }
}

/// Renders `template` against `context`. See [Renderer::render].
pub fn render(template: &str, context: &Context) -> Result<String> {
    Renderer::new(context).render(template)
}

// Text without any template delimiters renders to itself.
fn has_markup(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

// Walks the error's source chain and classifies it.
fn template_error(e: &tera::Error, template: &str) -> ActionError {
    use std::error::Error;

    static UNDEFINED: OnceLock<Regex> = OnceLock::new();
    let undefined = UNDEFINED.get_or_init(|| {
        Regex::new(r"Variable `([^`]+)` not found in context").expect("static regex is valid")
    });

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    match undefined.captures(&full_error) {
        Some(captures) => ActionError::UndefinedVariable {
            name: captures[1].to_owned(),
            template: template.to_owned(),
        },
        None => ActionError::Template(full_error),
    }
}
