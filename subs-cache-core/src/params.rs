//! Argument getters over a named parameter source.
//!
//! Route parameters, query strings and similar are exposed to slots
//! through a source closure `Fn(&str) -> Value`. If the source reads
//! signals, the getters built here are reactive: a driving computation
//! that evaluates them restarts its subscription when a parameter changes.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::slot::Getter;

/// `[source(a), source(b), ...]`.
pub fn from_array_to_array<S>(names: &[&str], source: S) -> Getter
where
    S: Fn(&str) -> Value + 'static,
{
    let names: Vec<String> = names.iter().map(|n| (*n).to_owned()).collect();
    Rc::new(move |_| Value::Array(names.iter().map(|name| source(name)).collect()))
}

/// `{ a: source(a), b: source(b), ... }`.
pub fn from_array_to_obj<S>(names: &[&str], source: S) -> Getter
where
    S: Fn(&str) -> Value + 'static,
{
    let names: Vec<String> = names.iter().map(|n| (*n).to_owned()).collect();
    Rc::new(move |_| {
        let object: Map<String, Value> = names
            .iter()
            .map(|name| (name.clone(), source(name)))
            .collect();
        Value::Object(object)
    })
}

/// `{ key: source(param), ... }` for each `(key, param)` pair.
pub fn from_obj_to_obj<S>(mapping: &[(&str, &str)], source: S) -> Getter
where
    S: Fn(&str) -> Value + 'static,
{
    let mapping: Vec<(String, String)> = mapping
        .iter()
        .map(|(key, param)| ((*key).to_owned(), (*param).to_owned()))
        .collect();
    Rc::new(move |_| {
        let object: Map<String, Value> = mapping
            .iter()
            .map(|(key, param)| (key.clone(), source(param)))
            .collect();
        Value::Object(object)
    })
}

/// `source(name)`.
pub fn from_name<S>(name: &str, source: S) -> Getter
where
    S: Fn(&str) -> Value + 'static,
{
    let name = name.to_owned();
    Rc::new(move |_| source(&name))
}
