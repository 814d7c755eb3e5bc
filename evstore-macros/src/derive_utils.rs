use syn::punctuated::Punctuated;
use syn::{Attribute, Path, Token};

/// 比较 derive 时使用的名称：只看最后一段，`serde::Serialize` 与 `Serialize` 视为同一个
fn derive_name(path: &Path) -> String {
    path.segments
        .last()
        .map(|segment| segment.ident.to_string())
        .unwrap_or_default()
}

/// 把 enum 上已有的 `#[derive(..)]` 合并为一个，并补齐事件家族必需的派生
///
/// 必需派生排在最前；用户派生按原顺序追加，重复的被去掉。其余属性保持原位。
pub(crate) fn ensure_derives(attrs: &mut Vec<Attribute>, required: &[Path]) {
    let mut derives: Vec<Path> = required.to_vec();
    let mut others = Vec::with_capacity(attrs.len());

    for attr in attrs.drain(..) {
        if !attr.path().is_ident("derive") {
            others.push(attr);
            continue;
        }
        let Ok(list) = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated) else {
            others.push(attr);
            continue;
        };
        for path in list {
            let name = derive_name(&path);
            if !derives.iter().any(|known| derive_name(known) == name) {
                derives.push(path);
            }
        }
    }

    attrs.push(syn::parse_quote!(#[derive(#(#derives),*)]));
    attrs.extend(others);
}
