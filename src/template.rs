//! One-shot template rendering with `${...}` variable syntax.
//!
//! Flag and hostname templates routinely contain literal braces
//! (`FLAG{...}`), so the default `{{...}}` delimiters are swapped for
//! `${...}`. Undefined variables are hard errors, as are syntax errors;
//! callers must never receive a partially-rendered string.

use crate::error::Result;
use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior, Value};

pub fn render(template: &str, ctx: Value) -> Result<String> {
    let syntax = SyntaxConfig::builder()
        .variable_delimiters("${", "}")
        .block_delimiters("{%", "%}")
        .comment_delimiters("{#", "#}")
        .build()?;

    let mut env = Environment::new();
    env.set_syntax(syntax);
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    Ok(env.render_str(template, ctx)?)
}
