//! 全局环境锁定
//!
//! 宿主安装完全局名之后、任何脚本运行之前调用一次 [`lockdown`]：
//!
//! - 深度冻结所有内置对象（命名空间对象、构造器、`prototype`、原型链，
//!   以及只能通过实例取到的隐藏内置原型）
//! - 冻结宿主安装的全局函数
//! - 最后冻结 `globalThis` 本身
//!
//! 锁定之后模块无法修改导入方可见的任何全局状态。
//!
//! 冻结原型会让普通对象上的同名赋值失败（例如 `err.name = ...`、
//! `obj.toString = ...`），所以这些常被覆盖的属性先改成访问器：
//! 在原型本身上赋值仍然报错，在派生对象上赋值会定义为它自己的属性。

use rquickjs::{Ctx, Function};

const LOCKDOWN: &str = r#"(function (skip) {
    "use strict";
    const { freeze, getOwnPropertyDescriptor, getPrototypeOf, defineProperty } = Object;
    const ownKeys = Reflect.ownKeys;
    const seen = new Set();
    const tamed = [];

    const tame = (target, key) => {
        const desc = getOwnPropertyDescriptor(target, key);
        if (desc === undefined || !("value" in desc) || !desc.writable || !desc.configurable) {
            return;
        }
        const value = desc.value;
        tamed.push(value);
        defineProperty(target, key, {
            get() {
                return value;
            },
            set(next) {
                if (this === target) {
                    throw new TypeError(`Cannot assign to read only property '${String(key)}'`);
                }
                defineProperty(this, key, { value: next, writable: true, enumerable: true, configurable: true });
            },
            enumerable: desc.enumerable,
            configurable: false,
        });
    };

    const errors = [Error, EvalError, RangeError, ReferenceError, SyntaxError, TypeError, URIError];
    if (typeof AggregateError === "function") {
        errors.push(AggregateError);
    }
    for (const key of ["constructor", "toString", "valueOf", "toLocaleString", "hasOwnProperty", "isPrototypeOf", "propertyIsEnumerable"]) {
        tame(Object.prototype, key);
    }
    for (const key of ["constructor", "toString"]) {
        tame(Function.prototype, key);
        tame(Array.prototype, key);
    }
    tame(Promise.prototype, "constructor");
    for (const error of errors) {
        for (const key of ["constructor", "message", "name", "toString"]) {
            tame(error.prototype, key);
        }
    }

    const harden = (value) => {
        if (value === null || value === globalThis || (typeof value !== "object" && typeof value !== "function")) {
            return;
        }
        if (seen.has(value)) {
            return;
        }
        seen.add(value);
        freeze(value);
        for (const key of ownKeys(value)) {
            const desc = getOwnPropertyDescriptor(value, key);
            if (desc === undefined) {
                continue;
            }
            if ("value" in desc) {
                harden(desc.value);
            } else {
                harden(desc.get);
                harden(desc.set);
            }
        }
        harden(getPrototypeOf(value));
    };

    const hidden = [
        getPrototypeOf(function* () {}),
        getPrototypeOf(async function () {}),
        getPrototypeOf(async function* () {}),
        getPrototypeOf([][Symbol.iterator]()),
        getPrototypeOf(new Map()[Symbol.iterator]()),
        getPrototypeOf(new Set()[Symbol.iterator]()),
        getPrototypeOf(""[Symbol.iterator]()),
        getPrototypeOf(/x/[Symbol.matchAll]("")),
        getPrototypeOf(Int8Array),
    ];
    for (const value of hidden.concat(tamed)) {
        harden(value);
    }
    for (const key of ownKeys(globalThis)) {
        const desc = getOwnPropertyDescriptor(globalThis, key);
        if (skip.includes(key)) {
            harden(getPrototypeOf(desc.value));
            continue;
        }
        if ("value" in desc) {
            harden(desc.value);
        } else {
            harden(desc.get);
            harden(desc.set);
        }
    }
    harden(getPrototypeOf(globalThis));
    freeze(globalThis);
    return seen.size;
})"#;

/// 锁定全局环境，返回被冻结的对象数量
///
/// `skip` 列出的全局名只冻结其原型（句柄代理，写入由分派表控制），
/// 绑定本身仍随 `globalThis` 一起变为只读。
pub fn lockdown(ctx: &Ctx<'_>, skip: &[&str]) -> rquickjs::Result<u32> {
    let lockdown: Function = ctx.eval(LOCKDOWN)?;
    let skip: Vec<String> = skip.iter().map(|name| name.to_string()).collect();
    let frozen: u32 = lockdown.call((skip,))?;
    tracing::debug!(target: "lou::modules", frozen, "global environment locked");
    Ok(frozen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn with_locked<F: FnOnce(Ctx<'_>)>(f: F) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            assert!(lockdown(&ctx, &[]).unwrap() > 100);
            f(ctx);
        });
    }

    #[test]
    fn test_builtins_are_deeply_frozen() {
        with_locked(|ctx| {
            let frozen: bool = ctx
                .eval(
                    r#"[
                        Math, JSON, Array.prototype, Object.prototype, String.prototype,
                        Math.floor, Object.getPrototypeOf(function* () {}).prototype,
                        Object.getPrototypeOf([][Symbol.iterator]()), globalThis,
                    ].every(Object.isFrozen)"#,
                )
                .unwrap();
            assert!(frozen);

            let result: String = ctx
                .eval(
                    r#"(function () {
                        "use strict";
                        try { Math.floor = () => 42; } catch (e) { return e.constructor.name; }
                        return "assigned";
                    })()"#,
                )
                .unwrap();
            assert_eq!(result, "TypeError");
        });
    }

    #[test]
    fn test_overriding_inherited_names_still_works() {
        with_locked(|ctx| {
            let result: String = ctx
                .eval(
                    r#"(function () {
                        "use strict";
                        const err = new Error("x");
                        err.name = "Custom";
                        const obj = {};
                        obj.toString = () => "mine";
                        return `${err.name} ${String(obj)} ${Error.prototype.name}`;
                    })()"#,
                )
                .unwrap();
            assert_eq!(result, "Custom mine Error");

            let failed: bool = ctx
                .eval(r#"(function () { "use strict"; try { Error.prototype.name = "x"; return false; } catch (e) { return true; } })()"#)
                .unwrap();
            assert!(failed);
        });
    }

    #[test]
    fn test_native_exceptions_keep_their_message() {
        with_locked(|ctx| {
            let err = rquickjs::Exception::throw_message(&ctx, "still works");
            let text = crate::core::error::describe_caught(&ctx, err);
            assert!(text.starts_with("Error: still works"), "{text}");
        });
    }
}
