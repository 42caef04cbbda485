//! Helpers every CLI render can use.

use std::rc::Rc;

use vesper::runtime::{FunctionHelper, HelperDefinition, RegistryError};
use vesper::{Registry, UserError, Value};

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(HelperDefinition::new(
        "upper",
        FunctionHelper::new(|positional, _| Ok(Value::from(text(positional).to_uppercase()))),
    ))?;
    registry.register(HelperDefinition::new(
        "lower",
        FunctionHelper::new(|positional, _| Ok(Value::from(text(positional).to_lowercase()))),
    ))?;
    registry.register(HelperDefinition::new(
        "join",
        FunctionHelper::new(join),
    ))?;
    registry.register(HelperDefinition::new(
        "len",
        FunctionHelper::new(|positional, _| len(positional)),
    ))?;
    // Output is inserted as markup.
    registry.register(HelperDefinition::new(
        "html",
        FunctionHelper::trusted(|positional, _| Ok(Value::from(text(positional)))),
    ))?;
    Ok(())
}

fn text(positional: &[Value]) -> String {
    positional.first().map(Value::to_display_string).unwrap_or_default()
}

/// `(join list ", ")` or `(join list separator=", ")`.
fn join(positional: &[Value], named: &[(Rc<str>, Value)]) -> Result<Value, UserError> {
    let Some(first) = positional.first() else {
        return Ok(Value::from(""));
    };
    if first.is_nullish() {
        return Ok(Value::from(""));
    }
    let items = first
        .as_list()
        .ok_or_else(|| UserError::new("join expects a list"))?;
    let separator = named
        .iter()
        .find(|(name, _)| &**name == "separator")
        .map(|(_, value)| value)
        .or_else(|| positional.get(1))
        .map(Value::to_display_string)
        .unwrap_or_else(|| ", ".to_string());
    let joined = items
        .iter()
        .map(Value::to_display_string)
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Value::from(joined))
}

fn len(positional: &[Value]) -> Result<Value, UserError> {
    let count = match positional.first() {
        None | Some(Value::Undefined | Value::Null) => 0,
        Some(Value::List(items)) => items.len(),
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Object(object)) => object.entries().len(),
        Some(other) => return Err(UserError::new(format!("len expects a list or a string, got {other:?}"))),
    };
    Ok(Value::from(count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_takes_a_positional_or_named_separator() {
        let list = Value::list(vec![Value::from("a"), Value::from(2.0), Value::from(true)]);
        assert_eq!(join(&[list.clone()], &[]).unwrap(), Value::from("a, 2, true"));
        assert_eq!(join(&[list.clone(), Value::from("-")], &[]).unwrap(), Value::from("a-2-true"));
        let named = [(Rc::from("separator"), Value::from("/"))];
        assert_eq!(join(&[list], &named).unwrap(), Value::from("a/2/true"));
        assert_eq!(join(&[Value::Null], &[]).unwrap(), Value::from(""));
        assert!(join(&[Value::from("nope")], &[]).is_err());
    }

    #[test]
    fn len_counts_lists_and_characters() {
        let list = Value::list(vec![Value::Null, Value::Null]);
        assert_eq!(len(&[list]).unwrap(), Value::from(2.0));
        assert_eq!(len(&[Value::from("héllo")]).unwrap(), Value::from(5.0));
        assert_eq!(len(&[]).unwrap(), Value::from(0.0));
        assert!(len(&[Value::from(3.0)]).is_err());
    }

    #[test]
    fn text_of_nothing_is_empty() {
        assert_eq!(text(&[]), "");
        assert_eq!(text(&[Value::Null]), "");
        assert_eq!(text(&[Value::from(1.5)]), "1.5");
    }
}
