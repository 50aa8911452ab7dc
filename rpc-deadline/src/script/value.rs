/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Typed payloads exchanged with compiled script functions.

use std::collections::BTreeMap;
use std::fmt;

use super::ScriptError;
use crate::future::RpcFuture;

// ── Tensor ────────────────────────────────────────────────────────────────────

/// Dense one-dimensional integer tensor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tensor {
    data: Vec<i64>,
}

impl Tensor {
    pub fn new(data: Vec<i64>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[i64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element-wise sum.
    ///
    /// # Errors
    /// [`ScriptError::ShapeMismatch`] if the lengths differ.
    pub fn checked_add(&self, other: &Tensor) -> Result<Tensor, ScriptError> {
        if self.len() != other.len() {
            return Err(ScriptError::ShapeMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a.wrapping_add(*b))
            .collect();
        Ok(Tensor { data })
    }
}

impl From<Vec<i64>> for Tensor {
    fn from(data: Vec<i64>) -> Self {
        Tensor::new(data)
    }
}

impl<const N: usize> From<[i64; N]> for Tensor {
    fn from(data: [i64; N]) -> Self {
        Tensor::new(data.to_vec())
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor({:?})", self.data)
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// An argument or return value of a script function.
///
/// The RPC core treats these as opaque; only script function bodies look
/// inside.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tensor(Tensor),
    Tuple(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    /// A pending RPC result returned out of a script function.
    Future(RpcFuture),
}

impl Value {
    /// Script-level type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tensor(_) => "Tensor",
            Value::Tuple(_) => "Tuple",
            Value::Dict(_) => "Dict",
            Value::Future(_) => "Future",
        }
    }

    pub fn as_tensor(&self) -> Result<&Tensor, ScriptError> {
        match self {
            Value::Tensor(t) => Ok(t),
            other => Err(ScriptError::type_mismatch("Tensor", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, ScriptError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ScriptError::type_mismatch("str", other)),
        }
    }

    /// Numeric value as `f64`; integers are widened.
    pub fn as_float(&self) -> Result<f64, ScriptError> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(ScriptError::type_mismatch("float", other)),
        }
    }

    pub fn as_tuple(&self) -> Result<&[Value], ScriptError> {
        match self {
            Value::Tuple(items) => Ok(items),
            other => Err(ScriptError::type_mismatch("Tuple", other)),
        }
    }

    pub fn as_dict(&self) -> Result<&BTreeMap<String, Value>, ScriptError> {
        match self {
            Value::Dict(entries) => Ok(entries),
            other => Err(ScriptError::type_mismatch("Dict", other)),
        }
    }

    pub fn into_tensor(self) -> Result<Tensor, ScriptError> {
        match self {
            Value::Tensor(t) => Ok(t),
            other => Err(ScriptError::type_mismatch("Tensor", &other)),
        }
    }

    pub fn into_future(self) -> Result<RpcFuture, ScriptError> {
        match self {
            Value::Future(fut) => Ok(fut),
            other => Err(ScriptError::type_mismatch("Future", &other)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tensor(a), Value::Tensor(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            // futures compare by identity
            (Value::Future(a), Value::Future(b)) => a.same_call(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Tensor(t) => write!(f, "{t}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Dict(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Future(fut) => write!(f, "Future(call {})", fut.id()),
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<RpcFuture> for Value {
    fn from(fut: RpcFuture) -> Self {
        Value::Future(fut)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_script_repr() {
        assert_eq!(Value::Tensor(Tensor::from([8, 8])).to_string(), "tensor([8, 8])");
        let tuple = Value::Tuple(vec![Value::from("worker1"), Value::Int(2)]);
        assert_eq!(tuple.to_string(), "(\"worker1\", 2)");
    }

    #[test]
    fn tensor_addition_is_element_wise() {
        let sum = Tensor::from([1, 1]).checked_add(&Tensor::from([2, 2])).unwrap();
        assert_eq!(sum, Tensor::from([3, 3]));
    }

    #[test]
    fn tensor_addition_rejects_shape_mismatch() {
        let err = Tensor::from([1, 1])
            .checked_add(&Tensor::from([1, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, ScriptError::ShapeMismatch { left: 2, right: 3 }));
    }

    #[test]
    fn tensor_displays_like_a_script_tensor() {
        assert_eq!(Tensor::from([8, 8]).to_string(), "tensor([8, 8])");
    }

    #[test]
    fn as_float_widens_integers() {
        assert_eq!(Value::Int(0).as_float().unwrap(), 0.0);
        assert_eq!(Value::Float(0.5).as_float().unwrap(), 0.5);
        assert!(Value::from("0.5").as_float().is_err());
    }

    #[test]
    fn type_mismatch_names_both_types() {
        let err = Value::Int(1).as_tensor().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Tensor") && msg.contains("int"), "got: {msg}");
    }
}
