//! 分派表
//!
//! 每个标签一张表（字段读、字段写、方法调用、字符串化、算术），首次使用时创建并在
//! 解释器实例的生命周期内缓存。脚本对句柄的所有访问都经过 Proxy 的 `get`/`set`
//! 陷阱进入这里：
//!
//! 1. 名称先驻留成 [`Atom`]
//! 2. 字段读取交给表的 `index`
//! 3. 其余已知名称返回按 (标签, 原子) 缓存的原生方法函数，调用时对原子做 `match`
//! 4. 未知名称走慢路径，调用时报告 `no such method for <Type> -> <name>`

use std::borrow::Cow;
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Exception, Function, IntoJs, Object, Persistent, Value};

use super::atom::{self, Atom};
use super::handle::{cell_handle, describe_value, Handle, HANDLE_KEY};
use super::store::{Native, TypedKey};
use super::tag::{Tag, Tagged};
use super::Bridge;
use crate::core::error::{BridgeError, OrThrow};

/// 字段读取：不是字段时返回 `Ok(None)`，由方法查找接手
pub type IndexFn = for<'js> fn(&Call<'js>, Atom) -> rquickjs::Result<Option<Value<'js>>>;
/// 字段写入
pub type NewIndexFn = for<'js> fn(&Call<'js>, Atom, Value<'js>) -> rquickjs::Result<()>;
/// 方法调用，按驻留整数分派
pub type NamecallFn = for<'js> fn(&Call<'js>, Atom) -> rquickjs::Result<Value<'js>>;
pub type ToStringFn = for<'js> fn(&Call<'js>) -> rquickjs::Result<String>;
pub type ArithFn = for<'js> fn(&Call<'js>, ArithOp) -> rquickjs::Result<Value<'js>>;

/// 按标签提供分派表
pub type TableProvider = fn(Tag) -> DispatchTable;

/// 脚本读取时总是得到 `undefined` 的探测名称（Promise 解析、JSON 序列化等）
const PROBE_KEYS: &[&str] = &["then", "toJSON", "valueOf", "constructor", "inspect"];

/// 算术运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
}

impl ArithOp {
    pub fn from_atom(atom: Atom) -> Option<Self> {
        match atom {
            Atom::Add => Some(ArithOp::Add),
            Atom::Sub => Some(ArithOp::Sub),
            Atom::Mul => Some(ArithOp::Mul),
            Atom::Div => Some(ArithOp::Div),
            Atom::Neg => Some(ArithOp::Neg),
            _ => None,
        }
    }
}

/// 一个类型的行为表
#[derive(Clone, Copy)]
pub struct DispatchTable {
    pub tag: Tag,
    pub index: Option<IndexFn>,
    pub newindex: Option<NewIndexFn>,
    pub namecall: Option<NamecallFn>,
    pub tostring: Option<ToStringFn>,
    pub arith: Option<ArithFn>,
}

impl DispatchTable {
    pub const fn new(tag: Tag) -> Self {
        Self {
            tag,
            index: None,
            newindex: None,
            namecall: None,
            tostring: None,
            arith: None,
        }
    }

    pub const fn index(mut self, f: IndexFn) -> Self {
        self.index = Some(f);
        self
    }

    pub const fn newindex(mut self, f: NewIndexFn) -> Self {
        self.newindex = Some(f);
        self
    }

    pub const fn namecall(mut self, f: NamecallFn) -> Self {
        self.namecall = Some(f);
        self
    }

    pub const fn tostring(mut self, f: ToStringFn) -> Self {
        self.tostring = Some(f);
        self
    }

    pub const fn arith(mut self, f: ArithFn) -> Self {
        self.arith = Some(f);
        self
    }

    /// 该名称是否可能是一个方法
    fn callable(&self, atom: Atom) -> bool {
        self.namecall.is_some() || (self.arith.is_some() && ArithOp::from_atom(atom).is_some())
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("tag", &self.tag)
            .field("index", &self.index.is_some())
            .field("newindex", &self.newindex.is_some())
            .field("namecall", &self.namecall.is_some())
            .field("tostring", &self.tostring.is_some())
            .field("arith", &self.arith.is_some())
            .finish()
    }
}

/// 参数错误里使用的调用名
#[derive(Debug, Clone, Copy)]
pub enum CallName {
    Method(Tag, Atom),
    Field(Tag, Atom),
    Function(&'static str),
}

impl fmt::Display for CallName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallName::Method(tag, atom) | CallName::Field(tag, atom) => {
                write!(f, "{}.{}", tag.name(), atom.name())
            }
            CallName::Function(name) => f.write_str(name),
        }
    }
}

/// 原生函数收到的参数列表
///
/// 位置从 0 开始取，错误信息中按 1 开始报告。
pub struct Args<'js> {
    ctx: Ctx<'js>,
    values: Vec<Value<'js>>,
    name: CallName,
}

impl<'js> Args<'js> {
    pub fn new(ctx: Ctx<'js>, values: Vec<Value<'js>>, name: CallName) -> Self {
        Self { ctx, values, name }
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    pub fn name(&self) -> CallName {
        self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value<'js>] {
        &self.values
    }

    /// 缺省参数视为 `undefined`
    pub fn get(&self, index: usize) -> Value<'js> {
        self.values
            .get(index)
            .cloned()
            .unwrap_or_else(|| Value::new_undefined(self.ctx.clone()))
    }

    fn is_missing(&self, index: usize) -> bool {
        self.values
            .get(index)
            .map_or(true, |value| value.is_undefined() || value.is_null())
    }

    pub fn error(&self, index: usize, message: impl Into<Cow<'static, str>>) -> rquickjs::Error {
        BridgeError::argument(index + 1, self.name.to_string(), message.into()).throw(&self.ctx)
    }

    /// 参数解析得到的桥接错误，带上位置和调用名
    pub fn reject(&self, index: usize, err: BridgeError) -> rquickjs::Error {
        BridgeError::bad_argument(index + 1, self.name.to_string(), err).throw(&self.ctx)
    }

    fn expected(&self, index: usize, what: &str) -> rquickjs::Error {
        let actual = describe_value(&self.get(index));
        self.error(index, format!("{what} expected, got {actual}"))
    }

    pub fn number(&self, index: usize) -> rquickjs::Result<f64> {
        self.get(index)
            .as_number()
            .ok_or_else(|| self.expected(index, "number"))
    }

    pub fn opt_number(&self, index: usize, default: f64) -> rquickjs::Result<f64> {
        if self.is_missing(index) {
            return Ok(default);
        }
        self.number(index)
    }

    /// 取闭区间内的整数
    pub fn integer_in(&self, index: usize, min: i64, max: i64) -> rquickjs::Result<i64> {
        let number = self.number(index)?;
        if number.fract() != 0.0 || number < min as f64 || number > max as f64 {
            return Err(self.error(index, format!("integer in {min}..={max} expected, got {number}")));
        }
        Ok(number as i64)
    }

    pub fn opt_integer_in(&self, index: usize, min: i64, max: i64, default: i64) -> rquickjs::Result<i64> {
        if self.is_missing(index) {
            return Ok(default);
        }
        self.integer_in(index, min, max)
    }

    pub fn string(&self, index: usize) -> rquickjs::Result<String> {
        match self.get(index).as_string() {
            Some(string) => string.to_string(),
            None => Err(self.expected(index, "string")),
        }
    }

    pub fn opt_string(&self, index: usize, default: &str) -> rquickjs::Result<String> {
        if self.is_missing(index) {
            return Ok(default.to_string());
        }
        self.string(index)
    }

    pub fn boolean(&self, index: usize) -> rquickjs::Result<bool> {
        self.get(index)
            .as_bool()
            .ok_or_else(|| self.expected(index, "boolean"))
    }

    pub fn opt_boolean(&self, index: usize, default: bool) -> rquickjs::Result<bool> {
        if self.is_missing(index) {
            return Ok(default);
        }
        self.boolean(index)
    }

    pub fn function(&self, index: usize) -> rquickjs::Result<Function<'js>> {
        self.get(index)
            .as_function()
            .cloned()
            .ok_or_else(|| self.expected(index, "function"))
    }
}

/// 一次分派调用的上下文
pub struct Call<'js> {
    pub ctx: Ctx<'js>,
    pub bridge: Rc<Bridge>,
    pub handle: Handle,
    pub args: Args<'js>,
}

impl<'js> Call<'js> {
    pub fn new(ctx: Ctx<'js>, bridge: Rc<Bridge>, handle: Handle, args: Vec<Value<'js>>, name: CallName) -> Self {
        let args = Args::new(ctx.clone(), args, name);
        Self {
            ctx,
            bridge,
            handle,
            args,
        }
    }

    pub fn tag(&self) -> Tag {
        self.handle.tag()
    }

    /// 解析被调用的句柄本身
    pub fn this<T: Tagged>(&self) -> rquickjs::Result<Native<T>> {
        self.bridge.store().resolve::<T>(self.handle).or_throw(&self.ctx)
    }

    /// 解析第 `index` 个参数
    pub fn native<T: Tagged>(&self, index: usize) -> rquickjs::Result<Native<T>> {
        let value = self.args.get(index);
        self.bridge
            .store()
            .resolve_value::<T>(&value)
            .map_err(|err| self.args.reject(index, err))
    }

    /// 可选类型参数：缺省或类型不符时为 `None`
    pub fn opt_native<T: Tagged>(&self, index: usize) -> Option<Native<T>> {
        let value = self.args.get(index);
        super::handle::handle_of(&value).and_then(|handle| self.bridge.store().resolve_optional::<T>(handle))
    }

    pub fn owning<T: Tagged>(&self, value: T) -> rquickjs::Result<Value<'js>> {
        self.bridge.create_owning(&self.ctx, value)
    }

    pub fn reference<T: Tagged>(&self, key: TypedKey<T>) -> rquickjs::Result<Value<'js>> {
        self.bridge.create_reference(&self.ctx, key)
    }

    pub fn undefined(&self) -> Value<'js> {
        Value::new_undefined(self.ctx.clone())
    }

    pub fn value<V: IntoJs<'js>>(&self, value: V) -> rquickjs::Result<Value<'js>> {
        value.into_js(&self.ctx)
    }

    pub fn fail(&self, err: BridgeError) -> rquickjs::Error {
        err.throw(&self.ctx)
    }

    /// 外部协作方失败，携带其消息
    pub fn check<T, E: fmt::Display>(&self, result: Result<T, E>) -> rquickjs::Result<T> {
        result.map_err(|err| self.fail(BridgeError::Native(err.to_string())))
    }

    pub fn invalid_method(&self, atom: Atom) -> rquickjs::Error {
        self.fail(BridgeError::InvalidMethod {
            type_name: self.tag().name(),
            method: atom.name().to_string(),
        })
    }

    pub fn invalid_field(&self, atom: Atom) -> rquickjs::Error {
        self.fail(BridgeError::InvalidField {
            type_name: self.tag().name(),
            field: atom.name().to_string(),
        })
    }

    pub fn readonly(&self, atom: Atom) -> rquickjs::Error {
        self.fail(BridgeError::ReadOnlyField {
            type_name: self.tag().name(),
            field: atom.name(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Method(Atom),
    ToString,
}

struct ProxyParts {
    make: Persistent<Function<'static>>,
    handler: Persistent<Object<'static>>,
}

/// 每个解释器实例一份的分派表注册表
pub struct Registry {
    provider: TableProvider,
    tables: [OnceCell<DispatchTable>; Tag::COUNT],
    installed: Cell<bool>,
    methods: RefCell<HashMap<(Tag, Slot), Persistent<Function<'static>>>>,
    proxy: RefCell<Option<ProxyParts>>,
}

impl Registry {
    pub fn new(provider: TableProvider) -> Self {
        Self {
            provider,
            tables: std::array::from_fn(|_| OnceCell::new()),
            installed: Cell::new(false),
            methods: RefCell::new(HashMap::new()),
            proxy: RefCell::new(None),
        }
    }

    /// 取（必要时创建）某个标签的表
    pub fn table(&self, tag: Tag) -> DispatchTable {
        *self.tables[tag.index()].get_or_init(|| {
            tracing::trace!(target: "lou::bridge", %tag, "dispatch table created");
            (self.provider)(tag)
        })
    }

    pub fn is_installed(&self) -> bool {
        self.installed.get()
    }

    /// 已创建的表数量
    pub fn created(&self) -> usize {
        self.tables.iter().filter(|cell| cell.get().is_some()).count()
    }

    /// 注册所有表并安装代理陷阱；重复调用返回 `Ok(false)`
    pub fn install<'js>(&self, ctx: &Ctx<'js>, bridge: Weak<Bridge>) -> rquickjs::Result<bool> {
        if self.installed.get() {
            return Ok(false);
        }
        for tag in Tag::ALL.into_iter().skip(1) {
            self.table(tag);
        }

        let make: Function = ctx.eval("(target, handler) => new Proxy(target, handler)")?;
        let handler = Object::new(ctx.clone())?;

        let weak = bridge.clone();
        handler.set(
            "get",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, target: Value<'js>, key: Value<'js>| -> rquickjs::Result<Value<'js>> {
                    let bridge = upgrade(&ctx, &weak)?;
                    trap_get(&bridge, &ctx, target, key)
                },
            )?,
        )?;

        let weak = bridge;
        handler.set(
            "set",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, target: Value<'js>, key: Value<'js>, value: Value<'js>| -> rquickjs::Result<bool> {
                    let bridge = upgrade(&ctx, &weak)?;
                    trap_set(&bridge, &ctx, target, key, value)?;
                    Ok(true)
                },
            )?,
        )?;

        *self.proxy.borrow_mut() = Some(ProxyParts {
            make: Persistent::save(ctx, make),
            handler: Persistent::save(ctx, handler),
        });
        self.installed.set(true);
        tracing::debug!(target: "lou::bridge", tables = self.created(), "dispatch tables registered");
        Ok(true)
    }

    /// 用代理包装一个句柄实例
    pub(crate) fn wrap<'js>(&self, ctx: &Ctx<'js>, cell: Value<'js>) -> rquickjs::Result<Value<'js>> {
        let (make, handler) = {
            let proxy = self.proxy.borrow();
            let parts = proxy
                .as_ref()
                .ok_or_else(|| Exception::throw_internal(ctx, "dispatch tables are not registered"))?;
            (parts.make.clone(), parts.handler.clone())
        };
        let make = make.restore(ctx)?;
        let handler = handler.restore(ctx)?;
        make.call((cell, handler))
    }

    fn cached<'js>(
        &self,
        ctx: &Ctx<'js>,
        tag: Tag,
        slot: Slot,
        build: impl FnOnce() -> rquickjs::Result<Function<'js>>,
    ) -> rquickjs::Result<Value<'js>> {
        let saved = self.methods.borrow().get(&(tag, slot)).cloned();
        if let Some(saved) = saved {
            return Ok(saved.restore(ctx)?.into_value());
        }
        let function = build()?;
        self.methods
            .borrow_mut()
            .insert((tag, slot), Persistent::save(ctx, function.clone()));
        Ok(function.into_value())
    }

    /// 已缓存的方法函数数量
    pub fn cached_methods(&self) -> usize {
        self.methods.borrow().len()
    }

    /// 释放所有持久化的解释器值，必须在运行时销毁前调用
    pub fn clear(&self) {
        self.methods.borrow_mut().clear();
        self.proxy.borrow_mut().take();
        self.installed.set(false);
    }
}

pub(crate) fn upgrade(ctx: &Ctx<'_>, bridge: &Weak<Bridge>) -> rquickjs::Result<Rc<Bridge>> {
    bridge
        .upgrade()
        .ok_or_else(|| Exception::throw_internal(ctx, "script bridge has been shut down"))
}

fn target_handle(ctx: &Ctx<'_>, target: &Value<'_>) -> rquickjs::Result<Handle> {
    cell_handle(target).ok_or_else(|| Exception::throw_internal(ctx, "proxy target is not a native handle"))
}

fn trap_get<'js>(
    bridge: &Rc<Bridge>,
    ctx: &Ctx<'js>,
    target: Value<'js>,
    key: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let Some(name) = key.as_string() else {
        return Ok(Value::new_undefined(ctx.clone()));
    };
    let name = name.to_string()?;
    let handle = target_handle(ctx, &target)?;
    if name == HANDLE_KEY {
        return Ok(target);
    }
    let tag = handle.tag();
    let registry = bridge.registry();
    if name == "toString" {
        return registry.cached(ctx, tag, Slot::ToString, || tostring_function(ctx, bridge, tag));
    }
    let table = registry.table(tag);

    match atom::intern(&name) {
        Some(atom) => {
            if let Some(index) = table.index {
                let call = Call::new(ctx.clone(), Rc::clone(bridge), handle, Vec::new(), CallName::Field(tag, atom));
                if let Some(value) = index(&call, atom)? {
                    return Ok(value);
                }
            }
            if table.callable(atom) {
                return registry.cached(ctx, tag, Slot::Method(atom), || method_function(ctx, bridge, tag, atom));
            }
            Err(BridgeError::InvalidField {
                type_name: tag.name(),
                field: name,
            }
            .throw(ctx))
        }
        None if PROBE_KEYS.contains(&name.as_str()) => Ok(Value::new_undefined(ctx.clone())),
        None if table.namecall.is_some() => Ok(slow_path_function(ctx, tag, name)?.into_value()),
        None => Err(BridgeError::InvalidField {
            type_name: tag.name(),
            field: name,
        }
        .throw(ctx)),
    }
}

fn trap_set<'js>(
    bridge: &Rc<Bridge>,
    ctx: &Ctx<'js>,
    target: Value<'js>,
    key: Value<'js>,
    value: Value<'js>,
) -> rquickjs::Result<()> {
    let handle = target_handle(ctx, &target)?;
    let tag = handle.tag();
    let name = match key.as_string() {
        Some(name) => name.to_string()?,
        None => "<symbol>".to_string(),
    };
    let table = bridge.registry().table(tag);
    match (atom::intern(&name), table.newindex) {
        (Some(atom), Some(newindex)) => {
            let call = Call::new(ctx.clone(), Rc::clone(bridge), handle, Vec::new(), CallName::Field(tag, atom));
            newindex(&call, atom, value)
        }
        _ => Err(BridgeError::InvalidField {
            type_name: tag.name(),
            field: name,
        }
        .throw(ctx)),
    }
}

/// 分派一次方法调用
fn invoke<'js>(
    bridge: Rc<Bridge>,
    ctx: &Ctx<'js>,
    tag: Tag,
    atom: Atom,
    this: Value<'js>,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let handle = match super::handle::handle_of(&this) {
        Some(handle) if handle.raw().accepts(tag) => handle,
        _ => {
            return Err(BridgeError::TypeMismatch {
                expected: tag.name(),
                actual: describe_value(&this),
            }
            .throw(ctx))
        }
    };
    let table = bridge.registry().table(tag);
    tracing::trace!(target: "lou::bridge", %tag, %atom, "namecall");
    let call = Call::new(ctx.clone(), bridge, handle, args, CallName::Method(tag, atom));
    if let (Some(op), Some(arith)) = (ArithOp::from_atom(atom), table.arith) {
        return arith(&call, op);
    }
    match table.namecall {
        Some(namecall) => namecall(&call, atom),
        None => Err(call.invalid_method(atom)),
    }
}

fn method_function<'js>(ctx: &Ctx<'js>, bridge: &Rc<Bridge>, tag: Tag, atom: Atom) -> rquickjs::Result<Function<'js>> {
    let weak = Rc::downgrade(bridge);
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let bridge = upgrade(&ctx, &weak)?;
            invoke(bridge, &ctx, tag, atom, this.0, args.0)
        },
    )
}

fn tostring_function<'js>(ctx: &Ctx<'js>, bridge: &Rc<Bridge>, tag: Tag) -> rquickjs::Result<Function<'js>> {
    let weak = Rc::downgrade(bridge);
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>| -> rquickjs::Result<String> {
            let bridge = upgrade(&ctx, &weak)?;
            let Some(handle) = super::handle::handle_of(&this.0) else {
                return Ok(format!("<{}>", tag.name()));
            };
            match bridge.registry().table(handle.tag()).tostring {
                Some(tostring) => {
                    let call = Call::new(ctx.clone(), Rc::clone(&bridge), handle, Vec::new(), CallName::Function("toString"));
                    tostring(&call)
                }
                None => Ok(format!("<{}>", handle.tag().name())),
            }
        },
    )
}

fn slow_path_function<'js>(ctx: &Ctx<'js>, tag: Tag, name: String) -> rquickjs::Result<Function<'js>> {
    tracing::trace!(target: "lou::bridge", %tag, name = %name, "unknown method name");
    Function::new(ctx.clone(), move |ctx: Ctx<'js>| -> rquickjs::Result<()> {
        Err(BridgeError::InvalidMethod {
            type_name: tag.name(),
            method: name.clone(),
        }
        .throw(&ctx))
    })
}
