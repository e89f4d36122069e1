//! 方法名驻留
//!
//! 桥接层用到的每个方法名和字段名都在这里声明一次，启动时构建成
//! 名称到整数的封闭映射。分派函数只对整数做 `match`，错误信息再通过
//! 同一张表把整数还原成可读名称。

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

macro_rules! atoms {
    ($($variant:ident => $name:literal,)*) => {
        /// 驻留后的方法/字段名
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Atom {
            $($variant,)*
        }

        impl Atom {
            /// 声明顺序即整数值
            pub const ALL: &'static [Atom] = &[$(Atom::$variant,)*];

            const NAMES: &'static [&'static str] = &[$($name,)*];
        }
    };
}

atoms! {
    // 订阅
    Unbind => "unbind",
    Destroy => "destroy",
    Active => "active",
    OnUpdate => "on_update",
    OnRender => "on_render",
    Quit => "quit",
    Pressed => "pressed",
    Released => "released",
    Moved => "moved",
    IsPressed => "is_pressed",
    IsDown => "is_down",

    // 根对象字段
    Console => "console",
    Keyboard => "keyboard",
    Mouse => "mouse",
    Window => "window",
    Renderer => "renderer",
    Texture => "texture",

    // 控制台
    Print => "print",
    Comment => "comment",
    Warn => "warn",
    Error => "error",
    Clear => "clear",

    // 几何值
    X => "x",
    Y => "y",
    W => "w",
    H => "h",
    R => "r",
    G => "g",
    B => "b",
    A => "a",
    Dot => "dot",
    Length => "length",
    SquaredLength => "squared_length",
    Normalized => "normalized",
    AsTuple => "as_tuple",
    Add => "add",
    Sub => "sub",
    Mul => "mul",
    Div => "div",
    Neg => "neg",

    // 窗口
    Position => "position",
    Size => "size",
    SizeInPixels => "size_in_pixels",
    AspectRatio => "aspect_ratio",
    Resize => "resize",
    Reposition => "reposition",
    Title => "title",
    SetTitle => "set_title",
    Opacity => "opacity",
    SetOpacity => "set_opacity",
    Maximize => "maximize",
    Minimize => "minimize",
    Restore => "restore",
    EnableFullscreen => "enable_fullscreen",
    Resizable => "resizable",
    SetResizable => "set_resizable",

    // 渲染器
    SetDrawColor => "set_draw_color",
    GetDrawColor => "get_draw_color",
    SetBlendMode => "set_blend_mode",
    GetBlendMode => "get_blend_mode",
    DrawRect => "draw_rect",
    FillRect => "fill_rect",
    DrawPoint => "draw_point",
    DrawLine => "draw_line",
    RenderTexture => "render_texture",

    // 纹理
    Color => "color",
    LoadImage => "load_image",
    FromText => "from_text",
    Render => "render",
    RenderRotated => "render_rotated",
}

impl Atom {
    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn from_id(id: u16) -> Option<Atom> {
        Atom::ALL.get(id as usize).copied()
    }

    /// 从驻留表还原可读名称
    pub fn name(self) -> &'static str {
        Atom::NAMES[self as usize]
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn table() -> &'static HashMap<&'static str, Atom> {
    static TABLE: OnceLock<HashMap<&'static str, Atom>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let table: HashMap<_, _> = Atom::ALL.iter().map(|atom| (atom.name(), *atom)).collect();
        tracing::debug!(target: "lou::bridge", atoms = table.len(), "method names interned");
        table
    })
}

/// 构建驻留表（每个进程只执行一次，重复调用无副作用）
pub fn install() -> usize {
    table().len()
}

/// 查找调用点名称对应的整数；不在封闭集合内的名称返回 `None`
pub fn intern(name: &str) -> Option<Atom> {
    table().get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_table_is_collision_free() {
        assert_eq!(Atom::ALL.len(), Atom::NAMES.len());
        assert_eq!(install(), Atom::ALL.len());
        for (index, atom) in Atom::ALL.iter().enumerate() {
            assert_eq!(atom.id() as usize, index);
            assert_eq!(Atom::from_id(atom.id()), Some(*atom));
        }
    }

    #[test]
    fn test_known_and_unknown_names() {
        assert_eq!(intern("draw_rect"), Some(Atom::DrawRect));
        assert_eq!(intern("on_update"), Some(Atom::OnUpdate));
        assert_eq!(intern("drawRect"), None);
        assert_eq!(intern(""), None);
    }

    proptest! {
        #[test]
        fn test_interning_is_stable(index in 0..Atom::ALL.len()) {
            let atom = Atom::ALL[index];
            let first = intern(atom.name());
            let second = intern(atom.name());
            prop_assert_eq!(first, Some(atom));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_unregistered_names_stay_unknown(name in "[A-Z][a-zA-Z]{0,12}|_[a-z_]{1,12}") {
            prop_assert_eq!(intern(&name), None);
            prop_assert_eq!(intern(&name), None);
        }
    }
}
