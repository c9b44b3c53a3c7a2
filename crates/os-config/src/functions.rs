//! Functions available to config expressions.
//!
//! | Function | Result |
//! |----------|--------|
//! | `env(name[, default])` | variable value, `default`, or `""` |
//! | `env_list(name[, default])` | value split by `CFG_ITEM_SEPARATOR` (newline by default), empty items dropped |
//! | `explode(sep, s)` | `s` split by `sep`; `[]` for an empty string |
//! | `implode(sep, list)` | list items joined by `sep` |
//! | `lower(s)` / `upper(s)` | case conversion |

use crate::env::lookup;
use hcl::eval::{Context, FuncArgs, FuncDef, ParamType};
use hcl::Value;

/// Environment variable that overrides the `env_list` separator.
pub const ITEM_SEPARATOR_VAR: &str = "CFG_ITEM_SEPARATOR";

const DEFAULT_ITEM_SEPARATOR: &str = "\n";

/// Declare every config function on `ctx`.
pub fn declare_all(ctx: &mut Context<'_>) {
    ctx.declare_func(
        "env",
        FuncDef::builder()
            .param(ParamType::String)
            .variadic_param(ParamType::String)
            .build(env),
    );
    ctx.declare_func(
        "env_list",
        FuncDef::builder()
            .param(ParamType::String)
            .variadic_param(ParamType::String)
            .build(env_list),
    );
    ctx.declare_func(
        "explode",
        FuncDef::builder()
            .param(ParamType::String)
            .param(ParamType::String)
            .build(explode),
    );
    ctx.declare_func(
        "implode",
        FuncDef::builder()
            .param(ParamType::String)
            .param(ParamType::Any)
            .build(implode),
    );
    ctx.declare_func(
        "lower",
        FuncDef::builder().param(ParamType::String).build(lower),
    );
    ctx.declare_func(
        "upper",
        FuncDef::builder().param(ParamType::String).build(upper),
    );
}

fn string_arg(args: &FuncArgs, index: usize) -> Result<&str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {} must be a string", index + 1))
}

fn optional_default(args: &FuncArgs) -> Result<Option<&str>, String> {
    match args.len() {
        1 => Ok(None),
        2 => string_arg(args, 1).map(Some),
        n => Err(format!("expected at most 2 arguments, got {n}")),
    }
}

fn env(args: FuncArgs) -> Result<Value, String> {
    let name = string_arg(&args, 0)?;
    let default = optional_default(&args)?;
    let value = lookup(name)
        .or_else(|| default.map(str::to_string))
        .unwrap_or_default();
    Ok(Value::String(value))
}

fn env_list(args: FuncArgs) -> Result<Value, String> {
    let name = string_arg(&args, 0)?;
    let default = optional_default(&args)?;
    let separator =
        lookup(ITEM_SEPARATOR_VAR).unwrap_or_else(|| DEFAULT_ITEM_SEPARATOR.to_string());
    let raw = lookup(name)
        .or_else(|| default.map(str::to_string))
        .unwrap_or_default();
    Ok(Value::Array(
        split_items(&raw, &separator)
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect(),
    ))
}

fn split_items<'a>(raw: &'a str, separator: &'a str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
    if raw.is_empty() {
        Box::new(std::iter::empty())
    } else if separator.is_empty() {
        Box::new(std::iter::once(raw))
    } else {
        Box::new(raw.split(separator))
    }
}

fn explode(args: FuncArgs) -> Result<Value, String> {
    let separator = string_arg(&args, 0)?;
    let input = string_arg(&args, 1)?;
    Ok(Value::Array(
        split_items(input, separator)
            .map(|item| Value::String(item.to_string()))
            .collect(),
    ))
}

fn implode(args: FuncArgs) -> Result<Value, String> {
    let separator = string_arg(&args, 0)?;
    let items = args
        .get(1)
        .and_then(Value::as_array)
        .ok_or_else(|| "argument 2 must be a list".to_string())?;
    let parts = items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(format!("cannot implode {other:?}")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(separator)))
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::String(string_arg(&args, 0)?.to_lowercase()))
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::String(string_arg(&args, 0)?.to_uppercase()))
}
