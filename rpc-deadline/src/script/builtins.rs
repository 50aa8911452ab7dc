/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Functions registered on every worker.
//!
//! | Function | Body |
//! |---|---|
//! | `two_args_two_kwargs` | sum of four tensors (two keywords with defaults) |
//! | `rpc_async_call_remote_script` | `rpc_async(..)` with the default timeout, waits in place |
//! | `rpc_async_call_with_timeout` | `rpc_async(.., timeout)`, waits in place |
//! | `rpc_async_call_future_ret` | `rpc_async(..)`, returns the future |
//! | `rpc_async_call_with_timeout_future_ret` | `rpc_async(.., timeout)`, returns the future |
//!
//! The last four are the "compiled caller" side: they issue an RPC from
//! inside a script function and either block on it there or hand the future
//! back to whoever invoked them.

use std::collections::BTreeMap;

use super::{
    BoundArgs, FunctionRegistry, Param, ScriptContext, ScriptError, ScriptFunction,
    ScriptFunctionRef, Tensor, Value,
};
use crate::future::RpcFuture;

pub const TWO_ARGS_TWO_KWARGS: &str = "two_args_two_kwargs";
pub const RPC_ASYNC_CALL_REMOTE_SCRIPT: &str = "rpc_async_call_remote_script";
pub const RPC_ASYNC_CALL_WITH_TIMEOUT: &str = "rpc_async_call_with_timeout";
pub const RPC_ASYNC_CALL_FUTURE_RET: &str = "rpc_async_call_future_ret";
pub const RPC_ASYNC_CALL_WITH_TIMEOUT_FUTURE_RET: &str = "rpc_async_call_with_timeout_future_ret";

/// Register every builtin into `registry`.
pub fn register_builtins(registry: &mut FunctionRegistry) {
    registry.register(two_args_two_kwargs());
    registry.register(rpc_wrapper(RPC_ASYNC_CALL_REMOTE_SCRIPT, false, true));
    registry.register(rpc_wrapper(RPC_ASYNC_CALL_WITH_TIMEOUT, true, true));
    registry.register(rpc_wrapper(RPC_ASYNC_CALL_FUTURE_RET, false, false));
    registry.register(rpc_wrapper(RPC_ASYNC_CALL_WITH_TIMEOUT_FUTURE_RET, true, false));
}

/// `first_arg + second_arg + first_kwarg + second_kwarg`, with the keywords
/// defaulting to `[3, 3]` and `[4, 4]`.
pub fn two_args_two_kwargs() -> ScriptFunction {
    ScriptFunction::new(
        TWO_ARGS_TWO_KWARGS,
        vec![
            Param::required("first_arg"),
            Param::required("second_arg"),
            Param::with_default("first_kwarg", Tensor::from([3, 3])),
            Param::with_default("second_kwarg", Tensor::from([4, 4])),
        ],
        |_, args| {
            let sum = args
                .tensor("first_arg")?
                .checked_add(args.tensor("second_arg")?)?
                .checked_add(args.tensor("first_kwarg")?)?
                .checked_add(args.tensor("second_kwarg")?)?;
            Ok(Value::Tensor(sum))
        },
    )
}

/// Build a compiled caller that targets `two_args_two_kwargs` on
/// `dst_worker_name`.
fn rpc_wrapper(name: &str, takes_timeout: bool, wait_in_place: bool) -> ScriptFunction {
    let mut params = vec![
        Param::required("dst_worker_name"),
        Param::required("args"),
        Param::required("kwargs"),
    ];
    if takes_timeout {
        params.push(Param::required("timeout"));
    }

    ScriptFunction::new(name, params, move |ctx, args| {
        let timeout = if takes_timeout {
            Some(args.float("timeout")?)
        } else {
            None
        };
        let fut = dispatch_sum(ctx, &args, timeout)?;
        if wait_in_place {
            Ok(fut.wait_blocking()?)
        } else {
            Ok(Value::Future(fut))
        }
    })
}

fn dispatch_sum(
    ctx: &ScriptContext,
    args: &BoundArgs,
    timeout: Option<f64>,
) -> Result<RpcFuture, ScriptError> {
    let agent = ctx.agent()?;
    let dst = args.str("dst_worker_name")?;
    let positional = args.tuple("args")?.to_vec();
    let keywords: BTreeMap<String, Value> = args.dict("kwargs")?.clone();

    let fut = agent.rpc_async(
        dst,
        &ScriptFunctionRef::new(TWO_ARGS_TWO_KWARGS),
        positional,
        keywords,
        timeout,
    )?;
    Ok(fut)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn kwargs(first: [i64; 2], second: [i64; 2]) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("first_kwarg".to_string(), Value::from(Tensor::from(first))),
            ("second_kwarg".to_string(), Value::from(Tensor::from(second))),
        ])
    }

    #[test]
    fn sum_of_four_operands() {
        let out = two_args_two_kwargs()
            .call(
                &ScriptContext::detached(),
                vec![Tensor::from([1, 1]).into(), Tensor::from([2, 2]).into()],
                kwargs([2, 2], [3, 3]),
            )
            .unwrap();
        assert_eq!(out, Value::Tensor(Tensor::from([8, 8])));
    }

    #[test]
    fn keyword_defaults_are_applied() {
        let out = two_args_two_kwargs()
            .call(
                &ScriptContext::detached(),
                vec![Tensor::from([1, 1]).into(), Tensor::from([2, 2]).into()],
                BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(out, Value::Tensor(Tensor::from([10, 10])));
    }

    #[test]
    fn non_tensor_argument_is_a_type_error() {
        let err = two_args_two_kwargs()
            .call(
                &ScriptContext::detached(),
                vec![Value::Int(1), Tensor::from([2, 2]).into()],
                BTreeMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { expected: "Tensor", found: "int" }));
    }

    #[test]
    fn rpc_wrappers_need_an_agent() {
        let reg = FunctionRegistry::with_builtins();
        let err = reg
            .invoke(
                &ScriptContext::detached(),
                &ScriptFunctionRef::new(RPC_ASYNC_CALL_FUTURE_RET),
                vec![
                    Value::from("worker1"),
                    Value::Tuple(vec![]),
                    Value::Dict(BTreeMap::new()),
                ],
                BTreeMap::new(),
            )
            .unwrap_err();
        assert_eq!(err, ScriptError::NoAgent);
    }

    #[test]
    fn builtins_are_all_registered() {
        let reg = FunctionRegistry::with_builtins();
        for name in [
            TWO_ARGS_TWO_KWARGS,
            RPC_ASYNC_CALL_REMOTE_SCRIPT,
            RPC_ASYNC_CALL_WITH_TIMEOUT,
            RPC_ASYNC_CALL_FUTURE_RET,
            RPC_ASYNC_CALL_WITH_TIMEOUT_FUTURE_RET,
        ] {
            assert!(reg.contains(&ScriptFunctionRef::new(name)), "{name} missing");
        }
    }
}
