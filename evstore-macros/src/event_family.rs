use crate::derive_utils::ensure_derives;
use proc_macro::TokenStream;
use quote::quote;
use std::collections::HashSet;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Expr, Ident, Item, Result, Token, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[event_family] 宏实现
/// - 仅支持单字段元组变体：`Variant(Payload)`
/// - 生成 `::evstore_domain::domain_event::EventFamily` 实现（TYPE_NAMES/type_name/to_payload/from_payload）
/// - 为每个载荷类型生成 `FamilyMember` 与 `From` 实现
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as FamilyAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let enum_item = match &mut input {
        Item::Enum(e) => e,
        other => {
            return syn::Error::new(other.span(), "#[event_family] can only be used on enum types")
                .to_compile_error()
                .into();
        }
    };

    if !enum_item.generics.params.is_empty() {
        return syn::Error::new(
            enum_item.generics.span(),
            "#[event_family] does not support generic enums",
        )
        .to_compile_error()
        .into();
    }

    if enum_item.variants.is_empty() {
        return syn::Error::new(
            enum_item.ident.span(),
            "#[event_family] requires at least one variant",
        )
        .to_compile_error()
        .into();
    }

    // 合并/追加默认派生：Debug, Clone, PartialEq
    let required: [syn::Path; 3] = [
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(PartialEq),
    ];
    ensure_derives(&mut enum_item.attrs, &required);

    let prefix = cfg
        .prefix
        .map(|lit| lit.value())
        .unwrap_or_else(|| enum_item.ident.to_string());

    let mut members: Vec<(Ident, syn::Type, syn::LitStr)> = Vec::new();
    let mut seen_names = HashSet::new();
    let mut seen_types = HashSet::new();

    for v in &mut enum_item.variants {
        let payload_ty = match &v.fields {
            syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                fields.unnamed[0].ty.clone()
            }
            _ => {
                return syn::Error::new(
                    v.span(),
                    "#[event_family] supports only single-field tuple variants, e.g., Variant(Payload)",
                )
                .to_compile_error()
                .into();
            }
        };

        let mut retained_attrs = Vec::new();
        let mut type_lit: Option<syn::LitStr> = None;

        for attr in v.attrs.iter() {
            if attr.path().is_ident("event") {
                match parse_variant_event_attr(attr) {
                    Ok(lit) => {
                        if type_lit.is_some() {
                            return syn::Error::new(
                                attr.span(),
                                "duplicate 'event_type' specified for this variant",
                            )
                            .to_compile_error()
                            .into();
                        }
                        type_lit = Some(lit);
                    }
                    Err(err) => return err.to_compile_error().into(),
                }
            } else {
                retained_attrs.push(attr.clone());
            }
        }
        v.attrs = retained_attrs;

        let name = type_lit.unwrap_or_else(|| {
            syn::LitStr::new(&format!("{}.{}", prefix, v.ident), v.ident.span())
        });

        if !seen_names.insert(name.value()) {
            return syn::Error::new(name.span(), "duplicate event type name in family")
                .to_compile_error()
                .into();
        }

        let ty_key = quote!(#payload_ty).to_string();
        if !seen_types.insert(ty_key) {
            return syn::Error::new(
                payload_ty.span(),
                "each payload type may appear in only one variant",
            )
            .to_compile_error()
            .into();
        }

        members.push((v.ident.clone(), payload_ty, name));
    }

    let enum_ident = &enum_item.ident;
    let names: Vec<&syn::LitStr> = members.iter().map(|(_, _, n)| n).collect();

    let type_name_arms = members.iter().map(|(v, _, n)| quote! { Self::#v(..) => #n });

    let encode_arms = members.iter().map(|(v, _, _)| {
        quote! { Self::#v(inner) => ::evstore_domain::domain_event::encode_member(inner) }
    });

    let decode_arms = members.iter().map(|(v, ty, n)| {
        quote! {
            #n => ::std::option::Option::Some(
                ::evstore_domain::domain_event::decode_member::<#ty>(payload).map(Self::#v)
            )
        }
    });

    let member_impls = members.iter().map(|(v, ty, n)| {
        quote! {
            impl ::evstore_domain::domain_event::FamilyMember<#enum_ident> for #ty {
                const TYPE_NAME: &'static str = #n;

                fn select(event: &#enum_ident) -> ::std::option::Option<&Self> {
                    match event {
                        #enum_ident::#v(inner) => ::std::option::Option::Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => ::std::option::Option::None,
                    }
                }
            }

            impl ::std::convert::From<#ty> for #enum_ident {
                fn from(value: #ty) -> Self {
                    #enum_ident::#v(value)
                }
            }
        }
    });

    let out = quote! {
        #enum_item

        impl ::evstore_domain::domain_event::EventFamily for #enum_ident {
            const TYPE_NAMES: &'static [&'static str] = &[#( #names ),*];

            fn type_name(&self) -> &'static str {
                match self { #( #type_name_arms, )* }
            }

            fn to_payload(
                &self,
            ) -> ::evstore_domain::__private::serde_json::Result<::evstore_domain::__private::serde_json::Value> {
                match self { #( #encode_arms, )* }
            }

            fn from_payload(
                type_name: &str,
                payload: &::evstore_domain::__private::serde_json::Value,
            ) -> ::std::option::Option<::evstore_domain::__private::serde_json::Result<Self>> {
                match type_name {
                    #( #decode_arms, )*
                    _ => ::std::option::Option::None,
                }
            }
        }

        #( #member_impls )*
    };

    TokenStream::from(out)
}

// -------- utils & parsing --------

fn parse_variant_event_attr(attr: &syn::Attribute) -> Result<syn::LitStr> {
    match &attr.meta {
        syn::Meta::List(_) => {
            let mut ty: Option<syn::LitStr> = None;
            let pairs: Punctuated<VariantEventAttrKv, Token![,]> = attr
                .parse_args_with(Punctuated::<VariantEventAttrKv, Token![,]>::parse_terminated)?;

            for kv in pairs {
                match kv.key.to_string().as_str() {
                    "event_type" => {
                        if ty.is_some() {
                            return Err(syn::Error::new(
                                kv.key.span(),
                                "duplicate key 'event_type' in attribute",
                            ));
                        }
                        let lit = match kv.value {
                            Expr::Lit(syn::ExprLit {
                                lit: syn::Lit::Str(lit),
                                ..
                            }) => lit,
                            other => {
                                return Err(syn::Error::new(
                                    other.span(),
                                    "expected string literal for 'event_type'",
                                ));
                            }
                        };
                        ty = Some(lit);
                    }
                    _ => {
                        return Err(syn::Error::new(
                            kv.key.span(),
                            "unknown key; expected 'event_type'",
                        ));
                    }
                }
            }

            ty.ok_or_else(|| syn::Error::new(attr.span(), "expected #[event(event_type = \"...\")]"))
        }
        other => Err(syn::Error::new(other.span(), "expected #[event(...)]")),
    }
}

struct VariantEventAttrKv {
    key: Ident,
    #[allow(dead_code)]
    eq: Token![=],
    value: Expr,
}

impl Parse for VariantEventAttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Self {
            key: input.parse()?,
            eq: input.parse()?,
            value: input.parse()?,
        })
    }
}

// 枚举级配置：类型名称前缀
struct FamilyAttrConfig {
    prefix: Option<syn::LitStr>,
}

impl Parse for FamilyAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut prefix: Option<syn::LitStr> = None;

        if input.is_empty() {
            return Ok(Self { prefix });
        }

        let pairs: Punctuated<VariantEventAttrKv, Token![,]> =
            Punctuated::<VariantEventAttrKv, Token![,]>::parse_terminated(input)?;

        for kv in pairs {
            match kv.key.to_string().as_str() {
                "prefix" => {
                    if prefix.is_some() {
                        return Err(syn::Error::new(
                            kv.key.span(),
                            "duplicate key 'prefix' in attribute",
                        ));
                    }
                    let lit = match kv.value {
                        Expr::Lit(syn::ExprLit {
                            lit: syn::Lit::Str(lit),
                            ..
                        }) => lit,
                        other => {
                            return Err(syn::Error::new(
                                other.span(),
                                "expected string literal for 'prefix'",
                            ));
                        }
                    };
                    prefix = Some(lit);
                }
                _ => {
                    return Err(syn::Error::new(kv.key.span(), "unknown key; expected 'prefix'"));
                }
            }
        }

        Ok(Self { prefix })
    }
}
