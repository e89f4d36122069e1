//! 配置结构体共用的宏

/// 按字段列表实现 `Default`
///
/// ```rust
/// struct Section {
///     width: u32,
///     title: String,
/// }
///
/// lou::impl_default!(Section {
///     width: 800,
///     title: "lou".to_string(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    struct Section {
        capacity: usize,
        label: String,
    }

    impl_default!(Section {
        capacity: 16,
        label: "console".to_string(),
    });

    #[test]
    fn test_impl_default() {
        let section = Section::default();
        assert_eq!(section.capacity, 16);
        assert_eq!(section.label, "console");
    }
}
