//! 解释器级的全局函数：`collectgarbage` 和 `loadstring`

use std::mem::MaybeUninit;
use std::rc::Rc;

use rquickjs::{qjs, Array, Ctx, Value};

use crate::bridge::{Args, Bridge};
use crate::core::error::BridgeError;
use crate::modules::ChunkName;

/// `loadstring` 没有给出代码块名时使用
pub const DEFAULT_CHUNK: &str = "=loadstring";

/// `collectgarbage(option = "collect")`
///
/// - `"collect"` 立即做一次完整回收，返回 `undefined`
/// - `"count"` 返回解释器当前占用的内存，单位 KB
pub fn global_collectgarbage<'js>(_bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    let ctx = args.ctx();
    match args.opt_string(0, "collect")?.as_str() {
        "collect" => {
            run_gc(ctx);
            tracing::trace!(target: "lou::bridge", "garbage collected on request");
            Ok(Value::new_undefined(ctx.clone()))
        }
        "count" => Ok(Value::new_number(ctx.clone(), (memory_used(ctx) / 1024) as f64)),
        _ => Err(BridgeError::Native("collectgarbage must be called with 'count' or 'collect'".into()).throw(ctx)),
    }
}

/// `loadstring(source, chunkname = "=loadstring")`
///
/// 只编译不执行，结果总是两个元素：成功为 `[fn, undefined]`，失败为
/// `[undefined, message]`。`@<路径>` 代码块可以 `require`，其余名称按临时代码处理。
pub fn global_loadstring<'js>(bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    let ctx = args.ctx();
    let source = args.string(0)?;
    let name = args.opt_string(1, DEFAULT_CHUNK)?;
    let chunk = ChunkName::parse(&name).unwrap_or_else(|| ChunkName::Transient(name.clone()));

    let result = Array::new(ctx.clone())?;
    match bridge.loader().load_string(bridge, ctx, &chunk, &source) {
        Ok(function) => {
            result.set(0, function)?;
            result.set(1, Value::new_undefined(ctx.clone()))?;
        }
        Err(err) => {
            tracing::debug!(target: "lou::modules", %chunk, error = %err, "loadstring failed");
            result.set(0, Value::new_undefined(ctx.clone()))?;
            result.set(1, err.to_string())?;
        }
    }
    Ok(result.into_value())
}

fn runtime_ptr(ctx: &Ctx<'_>) -> *mut qjs::JSRuntime {
    // SAFETY: `ctx` 存活期间上下文指针有效，运行时比上下文活得久
    unsafe { qjs::JS_GetRuntime(ctx.as_raw().as_ptr()) }
}

fn run_gc(ctx: &Ctx<'_>) {
    // SAFETY: 原生函数执行时已持有运行时锁，QuickJS 允许在原生函数中触发回收
    unsafe { qjs::JS_RunGC(runtime_ptr(ctx)) }
}

fn memory_used(ctx: &Ctx<'_>) -> i64 {
    let mut usage = MaybeUninit::<qjs::JSMemoryUsage>::zeroed();
    // SAFETY: 同上；JS_ComputeMemoryUsage 填写整个结构体
    unsafe {
        qjs::JS_ComputeMemoryUsage(runtime_ptr(ctx), usage.as_mut_ptr());
        usage.assume_init().memory_used_size
    }
}
