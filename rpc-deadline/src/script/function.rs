/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Script function schemas, argument binding and the per-worker registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ScriptContext, ScriptError, Tensor, Value};

// ── ScriptFunctionRef ─────────────────────────────────────────────────────────

/// Opaque handle naming a compiled function on the remote worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptFunctionRef {
    qualified_name: String,
}

impl ScriptFunctionRef {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.qualified_name
    }
}

impl fmt::Display for ScriptFunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// One declared parameter.  Parameters with a default may be omitted by the
/// caller.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Arguments after binding against a schema: one value per parameter, in
/// declaration order.
#[derive(Debug, Clone)]
pub struct BoundArgs {
    values: Vec<(String, Value)>,
}

impl BoundArgs {
    pub fn get(&self, name: &str) -> Result<&Value, ScriptError> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| ScriptError::UnboundArgument(name.to_string()))
    }

    pub fn tensor(&self, name: &str) -> Result<&Tensor, ScriptError> {
        self.get(name)?.as_tensor()
    }

    pub fn str(&self, name: &str) -> Result<&str, ScriptError> {
        self.get(name)?.as_str()
    }

    pub fn float(&self, name: &str) -> Result<f64, ScriptError> {
        self.get(name)?.as_float()
    }

    pub fn tuple(&self, name: &str) -> Result<&[Value], ScriptError> {
        self.get(name)?.as_tuple()
    }

    pub fn dict(&self, name: &str) -> Result<&BTreeMap<String, Value>, ScriptError> {
        self.get(name)?.as_dict()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type ScriptBody = dyn Fn(&ScriptContext, BoundArgs) -> Result<Value, ScriptError> + Send + Sync;

/// A compiled function: a fixed parameter schema plus its body.
pub struct ScriptFunction {
    name: String,
    params: Vec<Param>,
    body: Arc<ScriptBody>,
}

impl ScriptFunction {
    pub fn new<F>(name: impl Into<String>, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&ScriptContext, BoundArgs) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn to_ref(&self) -> ScriptFunctionRef {
        ScriptFunctionRef::new(self.name.clone())
    }

    /// Match positional and keyword arguments against the schema.
    ///
    /// Positionals fill parameters in order; keywords fill by name; any
    /// parameter still unset takes its default.
    ///
    /// # Errors
    /// Too many positionals, an unknown keyword, a parameter given both
    /// positionally and by keyword, or a required parameter left unset.
    pub fn bind(
        &self,
        args: Vec<Value>,
        mut kwargs: BTreeMap<String, Value>,
    ) -> Result<BoundArgs, ScriptError> {
        if args.len() > self.params.len() {
            return Err(ScriptError::TooManyArguments {
                function: self.name.clone(),
                expected: self.params.len(),
                given: args.len(),
            });
        }
        if let Some(keyword) = kwargs
            .keys()
            .find(|k| !self.params.iter().any(|p| &p.name == *k))
        {
            return Err(ScriptError::UnexpectedKeyword {
                function: self.name.clone(),
                keyword: keyword.clone(),
            });
        }

        let mut positional = args.into_iter();
        let mut values = Vec::with_capacity(self.params.len());

        for param in &self.params {
            let value = match (positional.next(), kwargs.remove(&param.name)) {
                (Some(_), Some(_)) => {
                    return Err(ScriptError::DuplicateArgument {
                        function: self.name.clone(),
                        param: param.name.clone(),
                    })
                }
                (Some(v), None) | (None, Some(v)) => v,
                (None, None) => {
                    param
                        .default
                        .clone()
                        .ok_or_else(|| ScriptError::MissingArgument {
                            function: self.name.clone(),
                            param: param.name.clone(),
                        })?
                }
            };
            values.push((param.name.clone(), value));
        }

        Ok(BoundArgs { values })
    }

    /// Bind the arguments and run the body.
    pub fn call(
        &self,
        ctx: &ScriptContext,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value, ScriptError> {
        let bound = self.bind(args, kwargs)?;
        (self.body)(ctx, bound)
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ── FunctionRegistry ──────────────────────────────────────────────────────────

/// Functions a worker can execute on behalf of remote callers.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<ScriptFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with [`builtins`](super::builtins).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtins::register_builtins(&mut registry);
        registry
    }

    /// Add `function`, replacing any previous function of the same name.
    pub fn register(&mut self, function: ScriptFunction) -> ScriptFunctionRef {
        let handle = function.to_ref();
        if self
            .functions
            .insert(function.name.clone(), Arc::new(function))
            .is_some()
        {
            warn!(function = %handle, "Replacing previously registered script function");
        } else {
            debug!(function = %handle, "Registered script function");
        }
        handle
    }

    pub fn get(&self, function: &ScriptFunctionRef) -> Option<Arc<ScriptFunction>> {
        self.functions.get(function.name()).cloned()
    }

    pub fn contains(&self, function: &ScriptFunctionRef) -> bool {
        self.functions.contains_key(function.name())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Look up `function` and call it.
    ///
    /// # Errors
    /// [`ScriptError::UnknownFunction`], or whatever binding / the body
    /// reports.
    pub fn invoke(
        &self,
        ctx: &ScriptContext,
        function: &ScriptFunctionRef,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value, ScriptError> {
        let target = self
            .get(function)
            .ok_or_else(|| ScriptError::UnknownFunction(function.name().to_string()))?;
        target.call(ctx, args, kwargs)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// `f(a, b=10)` returning `a + b` as an int.
    fn add_fn() -> ScriptFunction {
        ScriptFunction::new(
            "add",
            vec![Param::required("a"), Param::with_default("b", 10_i64)],
            |_, args| {
                let a = args.float("a")? as i64;
                let b = args.float("b")? as i64;
                Ok(Value::Int(a + b))
            },
        )
    }

    fn kw(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn positional_and_default_binding() {
        let f = add_fn();
        let out = f
            .call(&ScriptContext::detached(), vec![Value::Int(1)], BTreeMap::new())
            .unwrap();
        assert_eq!(out, Value::Int(11));
    }

    #[test]
    fn keyword_overrides_default() {
        let f = add_fn();
        let out = f
            .call(
                &ScriptContext::detached(),
                vec![Value::Int(1)],
                kw(&[("b", Value::Int(2))]),
            )
            .unwrap();
        assert_eq!(out, Value::Int(3));
    }

    #[test]
    fn too_many_positionals_are_rejected() {
        let err = add_fn()
            .bind(vec![Value::Int(1), Value::Int(2), Value::Int(3)], BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptError::TooManyArguments {
                expected: 2,
                given: 3,
                ..
            }
        ));
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        let err = add_fn()
            .bind(vec![Value::Int(1)], kw(&[("c", Value::Int(2))]))
            .unwrap_err();
        assert!(matches!(err, ScriptError::UnexpectedKeyword { keyword, .. } if keyword == "c"));
    }

    #[test]
    fn duplicate_argument_is_rejected() {
        let err = add_fn()
            .bind(vec![Value::Int(1)], kw(&[("a", Value::Int(2))]))
            .unwrap_err();
        assert!(matches!(err, ScriptError::DuplicateArgument { param, .. } if param == "a"));
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let err = add_fn().bind(vec![], BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ScriptError::MissingArgument { param, .. } if param == "a"));
    }

    #[test]
    fn registry_invokes_by_reference() {
        let mut reg = FunctionRegistry::new();
        let handle = reg.register(add_fn());
        assert!(reg.contains(&handle));
        assert_eq!(reg.len(), 1);

        let out = reg
            .invoke(
                &ScriptContext::detached(),
                &handle,
                vec![Value::Int(5)],
                BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(out, Value::Int(15));
    }

    #[test]
    fn registry_reports_unknown_function() {
        let reg = FunctionRegistry::new();
        let err = reg
            .invoke(
                &ScriptContext::detached(),
                &ScriptFunctionRef::new("missing"),
                vec![],
                BTreeMap::new(),
            )
            .unwrap_err();
        assert_eq!(err, ScriptError::UnknownFunction("missing".into()));
    }

    #[test]
    fn registering_same_name_replaces() {
        let mut reg = FunctionRegistry::new();
        reg.register(add_fn());
        reg.register(ScriptFunction::new("add", vec![], |_, _| Ok(Value::None)));
        assert_eq!(reg.len(), 1);
        let out = reg
            .invoke(
                &ScriptContext::detached(),
                &ScriptFunctionRef::new("add"),
                vec![],
                BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(out, Value::None);
    }
}
