//! 模块加载器
//!
//! 解析导入路径、编译源码、在隔离的函数作用域中执行并按绝对路径缓存结果。
//!
//! 模块体被编译成一个普通的严格模式函数 `function (require) { ... }`：
//! 不是 async 也不是 generator，因此模块无法挂起，必须同步执行完毕。
//! 模块通过 `return` 交出自己的值，该值必须是函数或对象。

pub mod chunk;
pub mod sandbox;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rquickjs::convert::Coerced;
use rquickjs::function::This;
use rquickjs::{Ctx, Function, Persistent, Value};

pub use chunk::{ChunkName, STDIN_LABEL};

use crate::bridge::dispatch::upgrade;
use crate::bridge::handle::describe_value;
use crate::bridge::Bridge;
use crate::core::error::{describe_caught, ModuleError, ModuleResult, OrThrow};

/// 模块缓存与路径解析
pub struct ModuleLoader {
    root: RefCell<PathBuf>,
    extension: String,
    cache: RefCell<HashMap<PathBuf, Persistent<Value<'static>>>>,
    loading: RefCell<Vec<PathBuf>>,
}

impl ModuleLoader {
    /// `root` 是入口脚本所在目录，裸模块名相对它解析
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: RefCell::new(root.into()),
            extension: extension.into(),
            cache: RefCell::new(HashMap::new()),
            loading: RefCell::new(Vec::new()),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.root.borrow().clone()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// 已缓存模块数量
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache.borrow().contains_key(path)
    }

    /// 释放缓存中的解释器值
    pub fn clear(&self) {
        let cache = std::mem::take(&mut *self.cache.borrow_mut());
        drop(cache);
    }

    /// 计算导入的规范绝对路径
    ///
    /// - `./`、`../` 相对请求者所在目录
    /// - 绝对路径原样使用
    /// - 裸模块名只允许入口脚本（或标准输入）使用，相对入口目录
    ///
    /// 没有扩展名时依次尝试 `<p>.<ext>` 和 `<p>/init.<ext>`。
    pub fn resolve_import(&self, requester: &ChunkName, specifier: &str) -> ModuleResult<PathBuf> {
        if !requester.may_require() {
            return Err(ModuleError::NotAllowed {
                chunk: requester.to_string(),
            });
        }
        let root = self.root();
        let base = requester
            .path()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());

        let candidate = if specifier.starts_with("./") || specifier.starts_with("../") {
            base.join(specifier)
        } else if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else if requester.is_entry() || requester.is_stdin() {
            root.join(specifier)
        } else {
            return Err(ModuleError::BareSpecifier {
                specifier: specifier.to_string(),
            });
        };

        let candidates = if candidate.extension().is_some() {
            vec![candidate]
        } else {
            vec![
                candidate.with_extension(&self.extension),
                candidate.join(format!("init.{}", self.extension)),
            ]
        };
        for path in candidates {
            if path.is_file() {
                return fs::canonicalize(&path).map_err(|source| ModuleError::Io { path, source });
            }
        }
        Err(ModuleError::NotFound {
            specifier: specifier.to_string(),
            requester: requester.to_string(),
        })
    }

    /// 加载模块；命中缓存时直接返回同一个值，不重新编译也不重新执行
    pub fn load<'js>(&self, bridge: &Rc<Bridge>, ctx: &Ctx<'js>, path: &Path) -> ModuleResult<Value<'js>> {
        let chunk = ChunkName::File(path.to_path_buf());
        let cached = self.cache.borrow().get(path).cloned();
        if let Some(saved) = cached {
            tracing::trace!(target: "lou::modules", %chunk, "module cache hit");
            return saved.restore(ctx).map_err(|err| ModuleError::Runtime {
                chunk: chunk.to_string(),
                message: err.to_string(),
            });
        }
        if self.loading.borrow().iter().any(|loading| loading == path) {
            return Err(ModuleError::Cycle {
                path: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path).map_err(|source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(target: "lou::modules", %chunk, "loading module");

        self.loading.borrow_mut().push(path.to_path_buf());
        let result = self
            .run(bridge, ctx, &chunk, &source)
            .and_then(|value| check_return(&chunk, value));
        self.loading.borrow_mut().pop();

        let value = result?;
        self.cache
            .borrow_mut()
            .insert(path.to_path_buf(), Persistent::save(ctx, value.clone()));
        Ok(value)
    }

    /// `require(specifier)` 的实现
    pub fn require<'js>(
        &self,
        bridge: &Rc<Bridge>,
        ctx: &Ctx<'js>,
        requester: &ChunkName,
        specifier: &str,
    ) -> ModuleResult<Value<'js>> {
        let path = self.resolve_import(requester, specifier)?;
        self.load(bridge, ctx, &path)
    }

    /// 运行入口脚本，入口所在目录成为裸模块名的根
    pub fn run_entry<'js>(&self, bridge: &Rc<Bridge>, ctx: &Ctx<'js>, path: &Path) -> ModuleResult<Value<'js>> {
        let path = fs::canonicalize(path).map_err(|_| ModuleError::NotFound {
            specifier: path.display().to_string(),
            requester: "host".to_string(),
        })?;
        if let Some(parent) = path.parent() {
            *self.root.borrow_mut() = parent.to_path_buf();
        }
        let source = fs::read_to_string(&path).map_err(|source| ModuleError::Io {
            path: path.clone(),
            source,
        })?;
        let chunk = ChunkName::Entry(path);
        tracing::info!(target: "lou::modules", %chunk, "running entry script");
        self.run(bridge, ctx, &chunk, &source)
    }

    /// 运行一段临时代码
    pub fn run_transient<'js>(
        &self,
        bridge: &Rc<Bridge>,
        ctx: &Ctx<'js>,
        label: &str,
        source: &str,
    ) -> ModuleResult<Value<'js>> {
        let chunk = ChunkName::Transient(label.to_string());
        self.run(bridge, ctx, &chunk, source)
    }

    /// 只编译不执行，返回已绑定该代码块 `require` 的函数
    pub fn load_string<'js>(
        &self,
        bridge: &Rc<Bridge>,
        ctx: &Ctx<'js>,
        chunk: &ChunkName,
        source: &str,
    ) -> ModuleResult<Function<'js>> {
        let body = compile(ctx, chunk, source)?;
        let runtime_error = |err: rquickjs::Error| ModuleError::Runtime {
            chunk: chunk.to_string(),
            message: describe_caught(ctx, err),
        };
        let require = require_function(bridge, ctx, chunk.clone()).map_err(runtime_error)?;
        let bind: Function = body.get("bind").map_err(runtime_error)?;
        bind.call((This(body.clone()), Value::new_undefined(ctx.clone()), require))
            .map_err(runtime_error)
    }

    fn run<'js>(&self, bridge: &Rc<Bridge>, ctx: &Ctx<'js>, chunk: &ChunkName, source: &str) -> ModuleResult<Value<'js>> {
        let body = compile(ctx, chunk, source)?;
        let require = require_function(bridge, ctx, chunk.clone()).map_err(|err| ModuleError::Runtime {
            chunk: chunk.to_string(),
            message: describe_caught(ctx, err),
        })?;
        body.call((require,)).map_err(|err| ModuleError::Runtime {
            chunk: chunk.to_string(),
            message: describe_caught(ctx, err),
        })
    }
}

/// 把源码编译成不可挂起的模块函数
///
/// 源码若提前闭合了包装函数，求值结果不再是包装函数本身，按编译错误处理。
pub fn compile<'js>(ctx: &Ctx<'js>, chunk: &ChunkName, source: &str) -> ModuleResult<Function<'js>> {
    // 包装写在同一行，诊断信息中的行号与源文件一致
    let wrapped = format!("(function (require) {{ \"use strict\"; {source}\n}})");
    let compile_error = |message: String| ModuleError::Compile {
        chunk: chunk.to_string(),
        message,
    };
    let body = ctx
        .eval::<Function, _>(wrapped.as_str())
        .map_err(|err| compile_error(describe_caught(ctx, err)))?;
    let text = body
        .clone()
        .into_value()
        .get::<Coerced<String>>()
        .map_err(|err| compile_error(describe_caught(ctx, err)))?
        .0;
    if text != wrapped[1..wrapped.len() - 1] {
        return Err(compile_error("module body closes its function wrapper".to_string()));
    }
    Ok(body)
}

fn check_return<'js>(chunk: &ChunkName, value: Value<'js>) -> ModuleResult<Value<'js>> {
    if value.is_undefined() {
        return Err(ModuleError::NoReturn {
            chunk: chunk.to_string(),
        });
    }
    if value.is_function() {
        return Ok(value);
    }
    let Some(object) = value.as_object() else {
        return Err(ModuleError::BadReturn {
            chunk: chunk.to_string(),
            actual: describe_value(&value),
        });
    };
    let then: Value = object.get("then").map_err(|err| ModuleError::Runtime {
        chunk: chunk.to_string(),
        message: err.to_string(),
    })?;
    if then.is_function() {
        return Err(ModuleError::Suspended {
            chunk: chunk.to_string(),
        });
    }
    Ok(value)
}

fn require_function<'js>(bridge: &Rc<Bridge>, ctx: &Ctx<'js>, chunk: ChunkName) -> rquickjs::Result<Function<'js>> {
    let weak = bridge.weak();
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, specifier: String| -> rquickjs::Result<Value<'js>> {
            let bridge = upgrade(&ctx, &weak)?;
            bridge.loader().require(&bridge, &ctx, &chunk, &specifier).or_throw(&ctx)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{DispatchTable, Store};
    use rquickjs::{Context, Runtime};
    use std::fs;
    use tempfile::TempDir;

    fn bridge(root: &Path) -> Rc<Bridge> {
        Bridge::new(Rc::new(Store::new()), DispatchTable::new, ModuleLoader::new(root, "js"))
    }

    fn write(dir: &Path, name: &str, source: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, source).unwrap();
        path
    }

    fn with_loader(dir: &Path, f: impl FnOnce(&Rc<Bridge>, &Ctx<'_>)) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let bridge = bridge(dir);
        context.with(|ctx| f(&bridge, &ctx));
        bridge.shutdown();
    }

    #[test]
    fn test_resolve_import_rules() {
        let dir = TempDir::new().unwrap();
        let entry = write(dir.path(), "init.js", "");
        let util = write(dir.path(), "lib/util.js", "");
        let pkg = write(dir.path(), "lib/pkg/init.js", "");
        let loader = ModuleLoader::new(dir.path(), "js");
        let entry_chunk = ChunkName::Entry(fs::canonicalize(&entry).unwrap());
        let util_chunk = ChunkName::File(fs::canonicalize(&util).unwrap());

        assert_eq!(
            loader.resolve_import(&entry_chunk, "./lib/util").unwrap(),
            fs::canonicalize(&util).unwrap()
        );
        assert_eq!(
            loader.resolve_import(&util_chunk, "./pkg").unwrap(),
            fs::canonicalize(&pkg).unwrap()
        );
        assert_eq!(
            loader.resolve_import(&util_chunk, "../init.js").unwrap(),
            fs::canonicalize(&entry).unwrap()
        );
        assert!(loader.resolve_import(&entry_chunk, "lib/util").is_ok());
        assert!(matches!(
            loader.resolve_import(&util_chunk, "lib/util"),
            Err(ModuleError::BareSpecifier { .. })
        ));
        assert!(matches!(
            loader.resolve_import(&ChunkName::Transient("repl".into()), "./lib/util"),
            Err(ModuleError::NotAllowed { .. })
        ));
        assert!(matches!(
            loader.resolve_import(&entry_chunk, "./missing"),
            Err(ModuleError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_runs_once_and_returns_same_value() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "counter.js",
            "globalThis.runs = (globalThis.runs || 0) + 1; return { n: 1 };",
        );
        let path = fs::canonicalize(path).unwrap();
        with_loader(dir.path(), |bridge, ctx| {
            let first = bridge.loader().load(bridge, ctx, &path).unwrap();
            let second = bridge.loader().load(bridge, ctx, &path).unwrap();
            ctx.globals().set("first", first).unwrap();
            ctx.globals().set("second", second).unwrap();
            assert!(ctx.eval::<bool, _>("first === second").unwrap());
            assert_eq!(ctx.eval::<i32, _>("runs").unwrap(), 1);
            assert!(bridge.loader().is_cached(&path));
        });
    }

    #[test]
    fn test_compile_error_carries_diagnostic() {
        let dir = TempDir::new().unwrap();
        let path = fs::canonicalize(write(dir.path(), "broken.js", "return {;")).unwrap();
        with_loader(dir.path(), |bridge, ctx| {
            let err = bridge.loader().load(bridge, ctx, &path).unwrap_err();
            let text = err.to_string();
            assert!(matches!(err, ModuleError::Compile { .. }));
            assert!(text.contains("SyntaxError"), "{text}");
            assert!(text.contains("broken.js"), "{text}");
            assert!(!bridge.loader().is_cached(&path));
        });
    }

    #[test]
    fn test_return_value_rules() {
        let dir = TempDir::new().unwrap();
        let none = fs::canonicalize(write(dir.path(), "none.js", "let x = 1;")).unwrap();
        let number = fs::canonicalize(write(dir.path(), "number.js", "return 5;")).unwrap();
        let thenable = fs::canonicalize(write(dir.path(), "later.js", "return Promise.resolve(1);")).unwrap();
        let function = fs::canonicalize(write(dir.path(), "fn.js", "return () => 1;")).unwrap();
        with_loader(dir.path(), |bridge, ctx| {
            let loader = bridge.loader();
            assert!(matches!(loader.load(bridge, ctx, &none), Err(ModuleError::NoReturn { .. })));
            assert!(matches!(
                loader.load(bridge, ctx, &number),
                Err(ModuleError::BadReturn { actual, .. }) if actual == "number"
            ));
            assert!(matches!(loader.load(bridge, ctx, &thenable), Err(ModuleError::Suspended { .. })));
            assert!(loader.load(bridge, ctx, &function).unwrap().is_function());
        });
    }

    #[test]
    fn test_await_is_rejected_at_compile_time() {
        let dir = TempDir::new().unwrap();
        let path = fs::canonicalize(write(dir.path(), "wait.js", "await 1; return {};")).unwrap();
        with_loader(dir.path(), |bridge, ctx| {
            let err = bridge.loader().load(bridge, ctx, &path).unwrap_err();
            assert!(matches!(err, ModuleError::Compile { .. }), "{err}");
        });
    }

    #[test]
    fn test_body_cannot_close_its_wrapper() {
        let dir = TempDir::new().unwrap();
        let path = fs::canonicalize(write(
            dir.path(),
            "escape.js",
            "return {}; }), (async function (require) { await 1; return {};",
        ))
        .unwrap();
        with_loader(dir.path(), |bridge, ctx| {
            let err = bridge.loader().load(bridge, ctx, &path).unwrap_err();
            assert!(matches!(err, ModuleError::Compile { .. }), "{err}");
            assert!(err.to_string().contains("closes its function wrapper"), "{err}");
            assert!(!bridge.loader().is_cached(&path));
        });
    }

    #[test]
    fn test_load_string_binds_chunk_require() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.js", "return { value: 7 };");
        let file = ChunkName::File(fs::canonicalize(dir.path()).unwrap().join("snippet.js"));
        let label = ChunkName::Transient("snippet".into());
        with_loader(dir.path(), |bridge, ctx| {
            let loader = bridge.loader();
            let from_file = loader
                .load_string(bridge, ctx, &file, "return require('./b').value;")
                .unwrap();
            assert_eq!(from_file.call::<_, i32>(()).unwrap(), 7);
            assert_eq!(loader.cached(), 1);

            let transient = loader
                .load_string(bridge, ctx, &label, "return require('./b');")
                .unwrap();
            let err = transient.call::<_, Value>(()).unwrap_err();
            let text = describe_caught(ctx, err);
            assert!(text.contains("require is not allowed from =snippet"), "{text}");

            assert!(matches!(
                loader.load_string(bridge, ctx, &file, "return {;"),
                Err(ModuleError::Compile { .. })
            ));
        });
    }

    #[test]
    fn test_nested_require_and_cycles() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.js", "const b = require('./b'); return { b };");
        write(dir.path(), "b.js", "return { value: 2 };");
        write(dir.path(), "c.js", "return require('./d');");
        write(dir.path(), "d.js", "return require('./c');");
        let entry = write(
            dir.path(),
            "init.js",
            "globalThis.value = require('./a').b.value; globalThis.cycle = (() => { try { require('./c'); } catch (e) { return String(e.message); } })(); return 0;",
        );
        with_loader(dir.path(), |bridge, ctx| {
            bridge.loader().run_entry(bridge, ctx, &entry).unwrap();
            assert_eq!(ctx.eval::<i32, _>("value").unwrap(), 2);
            let cycle: String = ctx.eval("cycle").unwrap();
            assert!(cycle.contains("cyclic require"), "{cycle}");
            assert_eq!(bridge.loader().cached(), 2);
        });
    }

    #[test]
    fn test_transient_chunks_cannot_require() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.js", "return {};");
        with_loader(dir.path(), |bridge, ctx| {
            let err = bridge
                .loader()
                .run_transient(bridge, ctx, "repl", "return require('./b');")
                .unwrap_err();
            assert!(err.to_string().contains("require is not allowed from =repl"), "{err}");
            let ok = bridge
                .loader()
                .run_transient(bridge, ctx, STDIN_LABEL, "return require('./b');");
            assert!(ok.is_ok());
        });
    }
}
