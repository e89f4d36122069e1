//! 类型标签注册表
//!
//! 每个可暴露给脚本的原生类型对应一个从 0 开始的紧凑整数标签。
//! 同一标签有两个互不相交的取值：
//! - 拥有型句柄使用 `tag` 本身
//! - 引用型句柄使用 `TAG_LIMIT - tag`
//!
//! 类型到标签的反向映射由 [`Tagged`] trait 提供，没有任何运行时状态。

use std::any::Any;
use std::fmt;

/// 标签上限，引用型标签由它镜像得到
pub const TAG_LIMIT: u16 = 128;

/// 可暴露给脚本的原生类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    /// 未知类型，从不用于句柄
    Unknown = 0,
    State,
    Console,
    Rect,
    Vec2,
    Color,
    Texture,
    Font,
    Window,
    Renderer,
    Keyboard,
    Mouse,
    TextureFactory,
    Subscription,
}

// 两个范围必须不相交
const _: () = assert!((Tag::COUNT as u16) * 2 <= TAG_LIMIT);

impl Tag {
    pub const COUNT: usize = 14;

    pub const ALL: [Tag; Tag::COUNT] = [
        Tag::Unknown,
        Tag::State,
        Tag::Console,
        Tag::Rect,
        Tag::Vec2,
        Tag::Color,
        Tag::Texture,
        Tag::Font,
        Tag::Window,
        Tag::Renderer,
        Tag::Keyboard,
        Tag::Mouse,
        Tag::TextureFactory,
        Tag::Subscription,
    ];

    /// 显式的静态名称表，用于错误信息和字符串化
    pub const fn name(self) -> &'static str {
        match self {
            Tag::Unknown => "Unknown",
            Tag::State => "State",
            Tag::Console => "Console",
            Tag::Rect => "Rect",
            Tag::Vec2 => "Vec2",
            Tag::Color => "Color",
            Tag::Texture => "Texture",
            Tag::Font => "Font",
            Tag::Window => "Window",
            Tag::Renderer => "Renderer",
            Tag::Keyboard => "Keyboard",
            Tag::Mouse => "Mouse",
            Tag::TextureFactory => "TextureFactory",
            Tag::Subscription => "Subscription",
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Tag> {
        Tag::ALL.get(index).copied()
    }

    /// 拥有型句柄的原始标签
    pub const fn owning(self) -> RawTag {
        RawTag(self as u16)
    }

    /// 引用型句柄的原始标签
    pub const fn reference(self) -> RawTag {
        RawTag(TAG_LIMIT - self as u16)
    }

    pub const fn raw(self, kind: HandleKind) -> RawTag {
        match kind {
            HandleKind::Owning => self.owning(),
            HandleKind::Reference => self.reference(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 句柄种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// 句柄生命周期决定原生对象生命周期
    Owning,
    /// 指向别处拥有的对象，回收时不析构
    Reference,
}

/// 句柄上实际携带的整数标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTag(u16);

impl RawTag {
    pub const fn value(self) -> u16 {
        self.0
    }

    /// 将原始标签还原为 (类型, 种类)
    ///
    /// 两个范围不相交，所以每个合法取值只对应唯一的一对。
    pub fn decode(self) -> Option<(Tag, HandleKind)> {
        let value = self.0 as usize;
        if value < Tag::COUNT {
            return Tag::from_index(value).map(|tag| (tag, HandleKind::Owning));
        }
        let mirrored = (TAG_LIMIT as usize).checked_sub(value)?;
        Tag::from_index(mirrored).map(|tag| (tag, HandleKind::Reference))
    }

    pub fn tag(self) -> Option<Tag> {
        self.decode().map(|(tag, _)| tag)
    }

    /// 是否为 `tag` 的两个可接受取值之一
    pub fn accepts(self, tag: Tag) -> bool {
        self == tag.owning() || self == tag.reference()
    }
}

/// 类型到标签的反向映射
///
/// 只有实现了该 trait 的类型才能放进句柄存储。
pub trait Tagged: Any {
    const TAG: Tag;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ranges_are_disjoint() {
        let owning: HashSet<u16> = Tag::ALL.iter().map(|t| t.owning().value()).collect();
        let reference: HashSet<u16> = Tag::ALL.iter().map(|t| t.reference().value()).collect();
        assert_eq!(owning.len(), Tag::COUNT);
        assert_eq!(reference.len(), Tag::COUNT);
        assert!(owning.is_disjoint(&reference));
    }

    #[test]
    fn test_decode_maps_back_to_one_type() {
        for tag in Tag::ALL {
            assert_eq!(tag.owning().decode(), Some((tag, HandleKind::Owning)));
            assert_eq!(tag.reference().decode(), Some((tag, HandleKind::Reference)));
        }
        assert_eq!(RawTag(Tag::COUNT as u16).decode(), None);
        assert_eq!(RawTag(TAG_LIMIT + 1).decode(), None);
    }

    #[test]
    fn test_accepts_exactly_two_values() {
        let accepted: Vec<u16> = (0..=TAG_LIMIT + 2)
            .filter(|v| RawTag(*v).accepts(Tag::Window))
            .collect();
        assert_eq!(
            accepted,
            vec![Tag::Window as u16, TAG_LIMIT - Tag::Window as u16]
        );
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = Tag::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), Tag::COUNT);
        assert_eq!(Tag::TextureFactory.to_string(), "TextureFactory");
    }
}
