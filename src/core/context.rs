//! The variable mapping that templates are rendered against.

use indexmap::IndexMap;
use serde_json::Value;

/// Per-host template variables. Values may be scalars or nested structures.
///
/// Order is preserved from the source file but is typically unimportant.
pub type Context = IndexMap<String, Value>;

/// Merges two variable mappings. On a key collision, `host` overrides `global`.
///
/// ```
/// # use mindeploy::core::context::{merge, Context};
/// # use serde_json::json;
/// let global = Context::from([("a".into(), json!(1)), ("b".into(), json!(2))]);
/// let host = Context::from([("c".into(), json!(3)), ("a".into(), json!(100))]);
///
/// let merged = merge(&global, &host);
/// assert_eq!(json!(100), merged["a"]);
/// assert_eq!(json!(2), merged["b"]);
/// assert_eq!(json!(3), merged["c"]);
/// ```
pub fn merge(global: &Context, host: &Context) -> Context {
    let mut merged = global.clone();
    for (key, value) in host {
        let _ = merged.insert(key.clone(), value.clone());
    }
    merged
}
