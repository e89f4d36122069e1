//! 脚本桥接层
//!
//! - `tag` - 类型标签注册表
//! - `atom` - 方法名驻留
//! - `store` - 带代数检查的原生对象存储
//! - `handle` - 拥有型/引用型句柄
//! - `dispatch` - 分派表与代理陷阱

pub mod atom;
pub mod dispatch;
pub mod handle;
pub mod store;
pub mod tag;

use std::cell::Cell;
use std::rc::{Rc, Weak};

use rquickjs::function::Rest;
use rquickjs::{Class, Ctx, Function, IntoJs, Value};

pub use atom::{intern, Atom};
pub use dispatch::{Args, ArithOp, Call, CallName, DispatchTable, Registry, TableProvider};
pub use handle::{handle_of, Handle, HandleCell};
pub use store::{Key, Native, Store, TypedKey};
pub use tag::{HandleKind, RawTag, Tag, Tagged, TAG_LIMIT};

use crate::modules::ModuleLoader;
use crate::natives::Roots;

/// 全局原生函数（构造器、`print` 等）
pub type GlobalFn<'js> = fn(&Rc<Bridge>, &Args<'js>) -> rquickjs::Result<Value<'js>>;

/// 一个解释器实例的桥接状态
///
/// 持有原生对象存储、分派表注册表和模块加载器。原生闭包只保存它的弱引用。
pub struct Bridge {
    store: Rc<Store>,
    registry: Registry,
    loader: ModuleLoader,
    roots: Cell<Option<Roots>>,
    weak: Weak<Bridge>,
}

impl Bridge {
    pub fn new(store: Rc<Store>, provider: TableProvider, loader: ModuleLoader) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            store,
            registry: Registry::new(provider),
            loader,
            roots: Cell::new(None),
            weak: weak.clone(),
        })
    }

    pub fn store(&self) -> &Rc<Store> {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn weak(&self) -> Weak<Bridge> {
        self.weak.clone()
    }

    pub fn roots(&self) -> Option<Roots> {
        self.roots.get()
    }

    pub(crate) fn set_roots(&self, roots: Roots) {
        self.roots.set(Some(roots));
    }

    /// 注册分派表（按实例守卫，重复调用无副作用）
    pub fn install(&self, ctx: &Ctx<'_>) -> rquickjs::Result<bool> {
        self.registry.install(ctx, self.weak())
    }

    fn wrap<'js>(&self, ctx: &Ctx<'js>, handle: Handle) -> rquickjs::Result<Value<'js>> {
        if !self.registry.is_installed() {
            self.install(ctx)?;
        }
        let cell = Class::instance(ctx.clone(), HandleCell::new(handle, Rc::downgrade(&self.store)))?;
        let cell = cell.into_js(ctx)?;
        self.registry.wrap(ctx, cell)
    }

    /// 创建拥有型句柄：对象放进存储，句柄被回收时释放
    pub fn create_owning<'js, T: Tagged>(&self, ctx: &Ctx<'js>, value: T) -> rquickjs::Result<Value<'js>> {
        let key = self.store.insert(value);
        let handle = Handle::owning(T::TAG, key.key());
        match self.wrap(ctx, handle) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.store.remove(key.key());
                Err(err)
            }
        }
    }

    /// 创建引用型句柄：对象由别处拥有
    pub fn create_reference<'js, T: Tagged>(&self, ctx: &Ctx<'js>, key: TypedKey<T>) -> rquickjs::Result<Value<'js>> {
        self.wrap(ctx, Handle::reference(T::TAG, key.key()))
    }

    /// 创建一个以全局名暴露的原生函数
    pub fn global_function<'js>(
        &self,
        ctx: &Ctx<'js>,
        name: &'static str,
        body: GlobalFn<'js>,
    ) -> rquickjs::Result<Function<'js>> {
        let weak = self.weak();
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let bridge = dispatch::upgrade(&ctx, &weak)?;
                let args = Args::new(ctx.clone(), args.0, CallName::Function(name));
                body(&bridge, &args)
            },
        )
    }

    /// 释放所有持久化的解释器值
    pub fn shutdown(&self) {
        self.registry.clear();
        self.loader.clear();
    }
}
